//! # Timer Source
//!
//! The periodic-callback primitive the coordinator uses to enforce the bundle
//! age threshold, plus the processing-time clock it measures age against.
//!
//! [`TokioTimerSource`] runs each registration as its own tokio task. The task
//! awaits every callback before waiting for the next tick and skips missed
//! ticks, so a slow callback never causes queued-up invocations.

use futures::future::BoxFuture;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{BundleError, BundleResult};

/// Callback invoked on every timer tick
pub type TimerCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Source of periodic callbacks and processing time
pub trait TimerSource: Send + Sync + 'static {
    /// Invoke `callback` every `period`, first after one full period has elapsed
    fn schedule_at_fixed_rate(
        &self,
        period: Duration,
        callback: TimerCallback,
    ) -> BundleResult<Box<dyn TimerRegistration>>;

    /// Current processing time in milliseconds
    fn current_time_millis(&self) -> i64;
}

/// Handle to an active periodic registration
pub trait TimerRegistration: Send + Sync {
    /// Stop future invocations. An invocation already running completes.
    fn cancel(&mut self) -> BundleResult<()>;

    fn is_active(&self) -> bool;
}

/// Timer source backed by the ambient tokio runtime
pub struct TokioTimerSource {
    origin: Instant,
}

impl TokioTimerSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioTimerSource {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TokioTimerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioTimerSource")
            .field("elapsed_millis", &self.current_time_millis())
            .finish()
    }
}

impl TimerSource for TokioTimerSource {
    fn schedule_at_fixed_rate(
        &self,
        period: Duration,
        callback: TimerCallback,
    ) -> BundleResult<Box<dyn TimerRegistration>> {
        if period.is_zero() {
            return Err(BundleError::Timer(
                "Timer period must be greater than zero".to_string(),
            ));
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| BundleError::Timer(format!("No tokio runtime available: {e}")))?;

        let registration_id = Uuid::new_v4();
        let active = Arc::new(AtomicBool::new(true));
        let shutdown_notify = Arc::new(Notify::new());

        let task_active = Arc::clone(&active);
        let task_notify = Arc::clone(&shutdown_notify);
        let handle = runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {},
                    _ = task_notify.notified() => {
                        debug!(registration_id = %registration_id, "Timer cancellation received");
                        break;
                    }
                }

                if !task_active.load(Ordering::Acquire) {
                    break;
                }

                (callback)().await;
            }

            task_active.store(false, Ordering::Release);
            debug!(registration_id = %registration_id, "Timer task ended");
        });

        info!(
            registration_id = %registration_id,
            period_ms = period.as_millis() as u64,
            "⏱️ Periodic timer scheduled"
        );

        Ok(Box::new(TokioTimerRegistration {
            registration_id,
            active,
            shutdown_notify,
            handle,
        }))
    }

    fn current_time_millis(&self) -> i64 {
        self.origin.elapsed().as_millis() as i64
    }
}

struct TokioTimerRegistration {
    registration_id: Uuid,
    active: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl TokioTimerRegistration {
    fn stop_task(&self) -> bool {
        if self.active.swap(false, Ordering::AcqRel) {
            // notify_one stores a permit, so a task busy in its callback still sees it
            self.shutdown_notify.notify_one();
            return true;
        }
        false
    }
}

impl TimerRegistration for TokioTimerRegistration {
    fn cancel(&mut self) -> BundleResult<()> {
        if self.stop_task() {
            debug!(registration_id = %self.registration_id, "Timer cancelled");
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire) && !self.handle.is_finished()
    }
}

impl Drop for TokioTimerRegistration {
    fn drop(&mut self) {
        if self.stop_task() {
            debug!(registration_id = %self.registration_id, "🧹 Timer registration dropped, stopping task");
        }
    }
}
