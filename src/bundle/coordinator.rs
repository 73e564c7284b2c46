//! # Bundling Coordinator
//!
//! Groups a stream of items into bundles for an [`ExecutionUnit`] and keeps
//! watermarks and checkpoint barriers ordered behind the results of the bundle
//! they arrived in.
//!
//! Two contexts drive a coordinator: the ingestion path (items, watermarks,
//! barriers, end of input) and the timer task that enforces the age threshold.
//! Both funnel every bundle close through [`BundlingCoordinator::finish_bundle`],
//! which is idempotent: the open flag in [`BundleState`] is flipped by
//! compare-and-set, so whichever trigger wins performs the one and only
//! `finish_bundle` call on the execution unit. The execution unit and sink sit
//! behind a single async mutex that every bundle operation holds, so the
//! unit never sees concurrent calls and a held watermark cannot slip past a
//! close that is already running.

use futures::FutureExt;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use super::metrics::{BundleMetrics, BundleMetricsSnapshot};
use super::state::BundleState;
use super::traits::{DownstreamSink, ExecutionUnit};
use super::types::{CloseTrigger, CoordinatorPhase, Watermark};
use crate::config::{BundleConfig, ThresholdPolicy, ThresholdWarning};
use crate::error::{BundleError, BundleResult};
use crate::logging::{log_bundle_operation, log_error};
use crate::timer::{TimerCallback, TimerRegistration, TimerSource};

/// Everything the coordinator calls into, guarded together
struct Collaborators<U, S> {
    /// `None` once released by shutdown
    unit: Option<U>,
    sink: S,
}

pub struct BundlingCoordinator<U, S> {
    id: Uuid,
    policy: ThresholdPolicy,
    threshold_warnings: Vec<ThresholdWarning>,
    state: BundleState,
    phase: AtomicU8,
    collaborators: Mutex<Collaborators<U, S>>,
    timer: Arc<dyn TimerSource>,
    registration: parking_lot::Mutex<Option<Box<dyn TimerRegistration>>>,
    /// First failure raised on the timer task, reported to the next ingestion call
    fatal_error: parking_lot::Mutex<Option<BundleError>>,
    metrics: BundleMetrics,
}

impl<U, S> BundlingCoordinator<U, S>
where
    U: ExecutionUnit,
    S: DownstreamSink<U::Output>,
{
    /// Create a coordinator with an already validated policy
    pub fn new(policy: ThresholdPolicy, unit: U, sink: S, timer: Arc<dyn TimerSource>) -> Self {
        let id = Uuid::new_v4();
        let now = timer.current_time_millis();

        Self {
            id,
            policy,
            threshold_warnings: Vec::new(),
            state: BundleState::new(now),
            phase: AtomicU8::new(CoordinatorPhase::Created as u8),
            collaborators: Mutex::new(Collaborators {
                unit: Some(unit),
                sink,
            }),
            timer,
            registration: parking_lot::Mutex::new(None),
            fatal_error: parking_lot::Mutex::new(None),
            metrics: BundleMetrics::new(id),
        }
    }

    /// Create a coordinator from raw configuration.
    ///
    /// Invalid thresholds fall back to defaults; the fallbacks taken are kept
    /// and available from [`Self::threshold_warnings`].
    pub fn with_config(
        config: &BundleConfig,
        unit: U,
        sink: S,
        timer: Arc<dyn TimerSource>,
    ) -> Self {
        let validated = config.threshold_policy();
        let mut coordinator = Self::new(validated.policy, unit, sink, timer);
        coordinator.threshold_warnings = validated.warnings;
        coordinator
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> CoordinatorPhase {
        CoordinatorPhase::from(self.phase.load(Ordering::Acquire))
    }

    pub fn policy(&self) -> &ThresholdPolicy {
        &self.policy
    }

    pub fn threshold_warnings(&self) -> &[ThresholdWarning] {
        &self.threshold_warnings
    }

    pub fn is_bundle_open(&self) -> bool {
        self.state.is_open()
    }

    /// Items accepted into the currently open bundle
    pub fn item_count(&self) -> usize {
        self.state.item_count()
    }

    pub fn held_watermark(&self) -> Option<Watermark> {
        self.state.held_watermark()
    }

    pub fn is_timer_active(&self) -> bool {
        self.registration
            .lock()
            .as_ref()
            .map(|registration| registration.is_active())
            .unwrap_or(false)
    }

    pub fn metrics(&self) -> BundleMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Open the execution unit and begin enforcing the age threshold
    #[instrument(skip(self), fields(coordinator_id = %self.id))]
    pub async fn start(self: &Arc<Self>) -> BundleResult<()> {
        let mut guard = self.collaborators.lock().await;

        let phase = self.phase();
        if phase != CoordinatorPhase::Created {
            return Err(BundleError::InvalidState(format!(
                "Coordinator cannot start from phase {phase:?}"
            )));
        }

        let unit = guard.unit.as_mut().ok_or_else(|| {
            BundleError::InvalidState("Execution unit has already been released".to_string())
        })?;

        if let Err(e) = unit.open().await {
            log_error(
                "bundling_coordinator",
                "start",
                &e.to_string(),
                Some("execution unit failed to open"),
            );
            return Err(e);
        }

        self.state.reset(self.timer.current_time_millis());

        let period = self.policy.check_period();
        let registration = self
            .timer
            .schedule_at_fixed_rate(period, self.age_check_callback())?;
        *self.registration.lock() = Some(registration);

        self.phase
            .store(CoordinatorPhase::Running as u8, Ordering::Release);
        drop(guard);

        log_bundle_operation(
            "start",
            &self.id.to_string(),
            None,
            None,
            "running",
            Some(&format!(
                "max_items={} max_age_ms={} check_period_ms={}",
                self.policy.max_items(),
                self.policy.max_age_millis(),
                period.as_millis()
            )),
        );
        Ok(())
    }

    /// Timer callback holding only a weak reference, so a dropped coordinator ends its timer
    fn age_check_callback(self: &Arc<Self>) -> TimerCallback {
        let weak = Arc::downgrade(self);
        Arc::new(move || {
            let weak = weak.clone();
            async move {
                if let Some(coordinator) = weak.upgrade() {
                    coordinator.on_timer_tick().await;
                }
            }
            .boxed()
        })
    }

    async fn on_timer_tick(&self) {
        if let Err(e) = self.check_bundle_age().await {
            log_error(
                "bundling_coordinator",
                "check_bundle_age",
                &e.to_string(),
                Some("failure latched until next ingestion call"),
            );
            self.fatal_error.lock().get_or_insert(e);
        }
    }

    /// Close the open bundle if it has reached the maximum age.
    ///
    /// This is the periodic timer's entry point; it does nothing unless the
    /// coordinator is running.
    pub async fn check_bundle_age(&self) -> BundleResult<bool> {
        if self.phase() != CoordinatorPhase::Running || !self.state.is_open() {
            return Ok(false);
        }
        if !self.bundle_expired() {
            return Ok(false);
        }

        let mut guard = self.collaborators.lock().await;
        // The bundle we saw may have closed (and a fresh one opened) while waiting
        if self.phase() != CoordinatorPhase::Running || !self.bundle_expired() {
            return Ok(false);
        }
        self.close_locked(&mut guard, CloseTrigger::BundleAge).await
    }

    fn bundle_expired(&self) -> bool {
        let now = self.timer.current_time_millis();
        self.state.age_millis(now) >= self.policy.max_age_millis()
    }

    /// Hand one item to the execution unit, opening a bundle first if needed.
    ///
    /// May close the bundle before returning when the item count threshold is reached.
    pub async fn submit(&self, item: U::Input) -> BundleResult<()> {
        self.ensure_running("submit")?;

        let mut guard = self.collaborators.lock().await;
        // stop() may have begun while this call waited for the lock
        self.ensure_running("submit")?;
        let collaborators = &mut *guard;

        let unit = collaborators
            .unit
            .as_mut()
            .ok_or_else(|| Self::released_error("submit"))?;

        if self.state.try_open() {
            if let Err(e) = unit.start_bundle().await {
                self.state.try_begin_close();
                return Err(e);
            }
            self.metrics.record_bundle_started();
            debug!(coordinator_id = %self.id, "Bundle started");
        }

        unit.process(item).await?;
        self.metrics.record_item_processed();

        if self.state.record_item() >= self.policy.max_items() {
            self.close_locked(collaborators, CloseTrigger::ItemCount)
                .await?;
        }
        Ok(())
    }

    /// Forward or hold a watermark depending on whether a bundle is in flight
    pub async fn process_watermark(&self, watermark: Watermark) -> BundleResult<()> {
        self.ensure_running("process watermark")?;

        let mut guard = self.collaborators.lock().await;
        self.ensure_running("process watermark")?;
        let collaborators = &mut *guard;
        if collaborators.unit.is_none() {
            return Err(Self::released_error("process watermark"));
        }

        if watermark.is_terminal() {
            self.close_locked(collaborators, CloseTrigger::TerminalWatermark)
                .await?;
            return self.forward_watermark_locked(collaborators, watermark).await;
        }

        if !self.state.is_open() {
            return self.forward_watermark_locked(collaborators, watermark).await;
        }

        // Results of the open bundle could still be "on time" relative to this
        // watermark, so it waits for the close
        let superseded = self.state.hold_watermark(watermark);
        self.metrics.record_watermark_held(superseded.is_some());
        debug!(
            coordinator_id = %self.id,
            watermark = watermark.timestamp(),
            superseded = ?superseded.map(|w| w.timestamp()),
            "Watermark held until bundle finishes"
        );
        Ok(())
    }

    /// Drain the open bundle ahead of a checkpoint barrier
    pub async fn prepare_snapshot_pre_barrier(&self, checkpoint_id: u64) -> BundleResult<()> {
        self.ensure_healthy()?;
        let closed = self.finish_bundle(CloseTrigger::CheckpointBarrier).await?;
        debug!(
            coordinator_id = %self.id,
            checkpoint_id = checkpoint_id,
            closed_bundle = closed,
            "No bundle in flight for checkpoint"
        );
        Ok(())
    }

    /// Drain the open bundle because the input stream ended
    pub async fn end_input(&self) -> BundleResult<()> {
        self.ensure_healthy()?;
        self.finish_bundle(CloseTrigger::EndOfInput).await?;
        Ok(())
    }

    /// Close the open bundle, if any. Returns whether this call performed the close.
    pub async fn finish_bundle(&self, trigger: CloseTrigger) -> BundleResult<bool> {
        let mut guard = self.collaborators.lock().await;
        self.close_locked(&mut guard, trigger).await
    }

    async fn close_locked(
        &self,
        collaborators: &mut Collaborators<U, S>,
        trigger: CloseTrigger,
    ) -> BundleResult<bool> {
        let Some(unit) = collaborators.unit.as_mut() else {
            return Ok(false);
        };
        if !self.state.try_begin_close() {
            return Ok(false);
        }

        let started = Instant::now();
        let items = self.state.item_count();

        unit.finish_bundle().await?;
        let results = unit.drain_results().await?;
        let result_count = results.len();
        for result in results {
            collaborators.sink.emit(result).await?;
        }

        self.state.reset(self.timer.current_time_millis());
        self.metrics
            .record_bundle_finished(trigger, items, result_count);

        if trigger.is_forced() {
            log_bundle_operation(
                "finish_bundle",
                &self.id.to_string(),
                Some(trigger.name()),
                Some(items),
                "closed",
                Some(&format!("result_count={result_count}")),
            );
        } else {
            debug!(
                coordinator_id = %self.id,
                trigger = %trigger,
                item_count = items,
                result_count = result_count,
                duration_ms = started.elapsed().as_millis() as u64,
                "Bundle finished"
            );
        }

        // Only released after every result of the bundle has been emitted
        if let Some(watermark) = self.state.take_held_watermark() {
            self.forward_watermark_locked(collaborators, watermark)
                .await?;
        }
        Ok(true)
    }

    async fn forward_watermark_locked(
        &self,
        collaborators: &mut Collaborators<U, S>,
        watermark: Watermark,
    ) -> BundleResult<()> {
        collaborators.sink.forward_watermark(watermark).await?;
        self.metrics.record_watermark_forwarded();
        debug!(
            coordinator_id = %self.id,
            watermark = %watermark,
            "Watermark forwarded"
        );
        Ok(())
    }

    /// Drain the final bundle, then release the timer and execution unit.
    ///
    /// Release is attempted even when the final close fails; the close error
    /// is returned in that case. Calling `stop` again is a no-op.
    #[instrument(skip(self), fields(coordinator_id = %self.id))]
    pub async fn stop(&self) -> BundleResult<()> {
        if self.phase() == CoordinatorPhase::Stopped {
            return Ok(());
        }
        self.phase
            .store(CoordinatorPhase::Stopping as u8, Ordering::Release);

        let close_result = self.finish_bundle(CloseTrigger::Stop).await;
        if let Err(e) = &close_result {
            error!(
                coordinator_id = %self.id,
                error = %e,
                "Final bundle failed to finish, releasing resources anyway"
            );
        }

        let shutdown_result = self.shutdown().await;
        close_result?;
        shutdown_result
    }

    /// Cancel the timer and release the execution unit without draining.
    ///
    /// Both releases are attempted regardless of the other's outcome; every
    /// failure is reported in [`BundleError::ShutdownFailed`].
    #[instrument(skip(self), fields(coordinator_id = %self.id))]
    pub async fn shutdown(&self) -> BundleResult<()> {
        let previous = CoordinatorPhase::from(
            self.phase
                .swap(CoordinatorPhase::Stopped as u8, Ordering::AcqRel),
        );
        if previous == CoordinatorPhase::Stopped {
            return Ok(());
        }

        let mut failures = Vec::new();

        let registration = self.registration.lock().take();
        if let Some(mut registration) = registration {
            if let Err(e) = registration.cancel() {
                log_error("bundling_coordinator", "cancel_timer", &e.to_string(), None);
                failures.push(format!("timer: {e}"));
            }
        }

        {
            let mut guard = self.collaborators.lock().await;
            if let Some(mut unit) = guard.unit.take() {
                if let Err(e) = unit.close().await {
                    log_error(
                        "bundling_coordinator",
                        "close_execution_unit",
                        &e.to_string(),
                        None,
                    );
                    failures.push(format!("execution unit: {e}"));
                }
            }
        }

        if self.state.force_closed() {
            warn!(
                coordinator_id = %self.id,
                "Execution unit released with a bundle still open"
            );
        }

        if failures.is_empty() {
            log_bundle_operation(
                "shutdown",
                &self.id.to_string(),
                None,
                None,
                "stopped",
                Some(&format!("previous_phase={previous:?}")),
            );
            Ok(())
        } else {
            Err(BundleError::ShutdownFailed { failures })
        }
    }

    fn ensure_healthy(&self) -> BundleResult<()> {
        match self.fatal_error.lock().as_ref() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn ensure_running(&self, operation: &str) -> BundleResult<()> {
        self.ensure_healthy()?;
        match self.phase() {
            CoordinatorPhase::Running => Ok(()),
            phase => Err(BundleError::InvalidState(format!(
                "Cannot {operation} while coordinator is {phase:?}"
            ))),
        }
    }

    fn released_error(operation: &str) -> BundleError {
        BundleError::InvalidState(format!(
            "Cannot {operation}: execution unit has been released"
        ))
    }
}

impl<U, S> fmt::Debug for BundlingCoordinator<U, S>
where
    U: ExecutionUnit,
    S: DownstreamSink<U::Output>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundlingCoordinator")
            .field("id", &self.id)
            .field("phase", &self.phase())
            .field("policy", &self.policy)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        Journal, JournalEntry, ManualTimerSource, RecordingExecutionUnit, RecordingSink,
        UnitOperation,
    };

    type TestCoordinator = BundlingCoordinator<RecordingExecutionUnit<u32>, RecordingSink<u32>>;

    fn coordinator(
        max_items: i64,
        max_age_millis: i64,
    ) -> (Arc<TestCoordinator>, Journal<u32>, Arc<ManualTimerSource>) {
        let journal = Journal::new();
        let timer = Arc::new(ManualTimerSource::new());
        let coordinator = BundlingCoordinator::new(
            ThresholdPolicy::validate(max_items, max_age_millis).policy,
            RecordingExecutionUnit::new(journal.clone()),
            RecordingSink::new(journal.clone()),
            timer.clone(),
        );
        (Arc::new(coordinator), journal, timer)
    }

    #[tokio::test]
    async fn test_start_registers_timer_at_age_period() {
        let (coordinator, journal, timer) = coordinator(10, 250);
        coordinator.start().await.unwrap();

        assert_eq!(coordinator.phase(), CoordinatorPhase::Running);
        assert_eq!(journal.entries(), vec![JournalEntry::UnitOpened]);
        assert_eq!(
            timer.registered_periods(),
            vec![std::time::Duration::from_millis(250)]
        );
        assert!(coordinator.is_timer_active());
    }

    #[tokio::test]
    async fn test_double_start_error() {
        let (coordinator, _journal, _timer) = coordinator(10, 100);
        coordinator.start().await.unwrap();
        assert!(matches!(
            coordinator.start().await,
            Err(BundleError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_before_start_is_rejected() {
        let (coordinator, journal, _timer) = coordinator(10, 100);
        assert!(matches!(
            coordinator.submit(1).await,
            Err(BundleError::InvalidState(_))
        ));
        assert!(journal.entries().is_empty());
    }

    #[tokio::test]
    async fn test_count_threshold_closes_bundle() {
        let (coordinator, journal, _timer) = coordinator(2, 10_000);
        coordinator.start().await.unwrap();

        coordinator.submit(1).await.unwrap();
        assert!(coordinator.is_bundle_open());
        assert_eq!(coordinator.item_count(), 1);

        coordinator.submit(2).await.unwrap();
        assert!(!coordinator.is_bundle_open());
        assert_eq!(coordinator.item_count(), 0);

        assert_eq!(
            journal.entries(),
            vec![
                JournalEntry::UnitOpened,
                JournalEntry::BundleStarted,
                JournalEntry::Processed(1),
                JournalEntry::Processed(2),
                JournalEntry::BundleFinished,
                JournalEntry::Emitted(1),
                JournalEntry::Emitted(2),
            ]
        );
        assert_eq!(coordinator.metrics().closed_by_item_count, 1);
    }

    #[tokio::test]
    async fn test_finish_bundle_is_idempotent() {
        let (coordinator, journal, _timer) = coordinator(10, 10_000);
        coordinator.start().await.unwrap();
        coordinator.submit(7).await.unwrap();

        let (first, second) = tokio::join!(
            coordinator.finish_bundle(CloseTrigger::BundleAge),
            coordinator.finish_bundle(CloseTrigger::EndOfInput)
        );
        assert!(first.unwrap() ^ second.unwrap());
        assert_eq!(journal.count(&JournalEntry::BundleFinished), 1);
    }

    #[tokio::test]
    async fn test_age_check_closes_old_bundle() {
        let (coordinator, journal, timer) = coordinator(100, 50);
        coordinator.start().await.unwrap();
        coordinator.submit(1).await.unwrap();

        timer.advance_millis(20);
        assert!(!coordinator.check_bundle_age().await.unwrap());
        assert!(coordinator.is_bundle_open());

        timer.advance_millis(30);
        timer.fire().await;
        assert!(!coordinator.is_bundle_open());
        assert_eq!(journal.count(&JournalEntry::BundleFinished), 1);
        assert_eq!(coordinator.metrics().closed_by_bundle_age, 1);
    }

    #[tokio::test]
    async fn test_watermark_forwarded_immediately_without_open_bundle() {
        let (coordinator, journal, _timer) = coordinator(10, 10_000);
        coordinator.start().await.unwrap();

        coordinator
            .process_watermark(Watermark::new(5))
            .await
            .unwrap();
        assert_eq!(
            journal.entries(),
            vec![
                JournalEntry::UnitOpened,
                JournalEntry::WatermarkForwarded(Watermark::new(5)),
            ]
        );
    }

    #[tokio::test]
    async fn test_latest_held_watermark_wins() {
        let (coordinator, journal, _timer) = coordinator(10, 10_000);
        coordinator.start().await.unwrap();
        coordinator.submit(1).await.unwrap();

        coordinator
            .process_watermark(Watermark::new(3))
            .await
            .unwrap();
        coordinator
            .process_watermark(Watermark::new(8))
            .await
            .unwrap();
        assert_eq!(coordinator.held_watermark(), Some(Watermark::new(8)));

        coordinator.end_input().await.unwrap();
        assert_eq!(
            journal.watermarks(),
            vec![Watermark::new(8)],
            "only the most recent held watermark is forwarded"
        );
        assert_eq!(coordinator.metrics().watermarks_superseded, 1);
    }

    #[tokio::test]
    async fn test_open_failure_is_fatal_and_shutdown_still_safe() {
        let journal = Journal::<u32>::new();
        let timer = Arc::new(ManualTimerSource::new());
        let coordinator = Arc::new(BundlingCoordinator::new(
            ThresholdPolicy::default(),
            RecordingExecutionUnit::new(journal.clone()).failing_on(UnitOperation::Open),
            RecordingSink::new(journal.clone()),
            timer.clone(),
        ));

        let error = coordinator.start().await.unwrap_err();
        assert!(error.is_execution_unit_failure());
        assert_eq!(coordinator.phase(), CoordinatorPhase::Created);
        assert!(timer.registered_periods().is_empty());

        coordinator.stop().await.unwrap();
        assert_eq!(coordinator.phase(), CoordinatorPhase::Stopped);
        assert_eq!(journal.count(&JournalEntry::UnitClosed), 1);
    }

    #[tokio::test]
    async fn test_timer_failure_latched_for_next_call() {
        let journal = Journal::new();
        let timer = Arc::new(ManualTimerSource::new());
        let coordinator = Arc::new(BundlingCoordinator::new(
            ThresholdPolicy::validate(100, 10).policy,
            RecordingExecutionUnit::new(journal.clone())
                .failing_on(UnitOperation::FinishBundle),
            RecordingSink::new(journal.clone()),
            timer.clone(),
        ));
        coordinator.start().await.unwrap();
        coordinator.submit(1).await.unwrap();

        timer.advance_millis(10);
        timer.fire().await;

        let error = coordinator.submit(2).await.unwrap_err();
        assert!(error.is_execution_unit_failure());
        assert!(coordinator.end_input().await.is_err());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (coordinator, journal, _timer) = coordinator(10, 100);
        coordinator.start().await.unwrap();
        coordinator.submit(1).await.unwrap();

        coordinator.stop().await.unwrap();
        coordinator.stop().await.unwrap();
        coordinator.shutdown().await.unwrap();

        assert_eq!(journal.count(&JournalEntry::BundleFinished), 1);
        assert_eq!(journal.count(&JournalEntry::UnitClosed), 1);
        assert!(!coordinator.is_timer_active());
        assert_eq!(coordinator.metrics().closed_by_stop, 1);
    }

    #[tokio::test]
    async fn test_with_config_records_fallbacks() {
        let journal = Journal::new();
        let config = BundleConfig {
            max_bundle_size: 0,
            max_bundle_time_millis: 20,
        };
        let coordinator = Arc::new(BundlingCoordinator::with_config(
            &config,
            RecordingExecutionUnit::<u32>::new(journal.clone()),
            RecordingSink::new(journal.clone()),
            Arc::new(ManualTimerSource::new()),
        ));

        assert_eq!(coordinator.threshold_warnings().len(), 1);
        assert_eq!(
            coordinator.policy().max_items(),
            crate::constants::DEFAULT_MAX_BUNDLE_SIZE
        );
        coordinator.start().await.unwrap();
        assert_eq!(coordinator.phase(), CoordinatorPhase::Running);
    }
}
