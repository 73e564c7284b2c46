//! # Testing Collaborators
//!
//! Deterministic stand-ins for the coordinator's collaborators. The unit and
//! sink write every call they receive into one shared [`Journal`], so tests can
//! assert the exact interleaving of processing, emission and watermark
//! forwarding. [`ManualTimerSource`] replaces wall-clock time with a clock and
//! callbacks the test drives by hand.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::bundle::{DownstreamSink, ExecutionUnit, Watermark};
use crate::error::{BundleError, BundleResult};
use crate::timer::{TimerCallback, TimerRegistration, TimerSource};

/// One observed collaborator call
#[derive(Debug, Clone, PartialEq)]
pub enum JournalEntry<T> {
    UnitOpened,
    BundleStarted,
    Processed(T),
    BundleFinished,
    Emitted(T),
    WatermarkForwarded(Watermark),
    UnitClosed,
}

/// Shared, ordered record of collaborator calls
#[derive(Debug)]
pub struct Journal<T> {
    entries: Arc<Mutex<Vec<JournalEntry<T>>>>,
}

impl<T> Clone for Journal<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T> Default for Journal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Journal<T> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn record(&self, entry: JournalEntry<T>) {
        self.entries.lock().push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn watermarks(&self) -> Vec<Watermark> {
        self.entries
            .lock()
            .iter()
            .filter_map(|entry| match entry {
                JournalEntry::WatermarkForwarded(watermark) => Some(*watermark),
                _ => None,
            })
            .collect()
    }
}

impl<T: Clone> Journal<T> {
    pub fn entries(&self) -> Vec<JournalEntry<T>> {
        self.entries.lock().clone()
    }

    pub fn emitted(&self) -> Vec<T> {
        self.entries
            .lock()
            .iter()
            .filter_map(|entry| match entry {
                JournalEntry::Emitted(result) => Some(result.clone()),
                _ => None,
            })
            .collect()
    }

    /// Items processed per bundle, in bundle order
    pub fn bundles(&self) -> Vec<Vec<T>> {
        let mut bundles = Vec::new();
        let mut current: Option<Vec<T>> = None;
        for entry in self.entries.lock().iter() {
            match entry {
                JournalEntry::BundleStarted => current = Some(Vec::new()),
                JournalEntry::Processed(item) => {
                    if let Some(bundle) = current.as_mut() {
                        bundle.push(item.clone());
                    }
                }
                JournalEntry::BundleFinished => bundles.extend(current.take()),
                _ => {}
            }
        }
        bundles
    }
}

impl<T: PartialEq> Journal<T> {
    pub fn count(&self, entry: &JournalEntry<T>) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|recorded| *recorded == entry)
            .count()
    }
}

/// Execution unit operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitOperation {
    Open,
    StartBundle,
    Process,
    FinishBundle,
    DrainResults,
    Close,
}

impl UnitOperation {
    pub fn name(&self) -> &'static str {
        match self {
            UnitOperation::Open => "open",
            UnitOperation::StartBundle => "start_bundle",
            UnitOperation::Process => "process",
            UnitOperation::FinishBundle => "finish_bundle",
            UnitOperation::DrainResults => "drain_results",
            UnitOperation::Close => "close",
        }
    }
}

/// Identity execution unit: every processed item becomes one result
#[derive(Debug)]
pub struct RecordingExecutionUnit<T> {
    journal: Journal<T>,
    pending: Vec<T>,
    failures: HashSet<UnitOperation>,
    finish_delay: Option<Duration>,
}

impl<T> RecordingExecutionUnit<T> {
    pub fn new(journal: Journal<T>) -> Self {
        Self {
            journal,
            pending: Vec::new(),
            failures: HashSet::new(),
            finish_delay: None,
        }
    }

    /// Fail every call of `operation` with an execution unit error
    pub fn failing_on(mut self, operation: UnitOperation) -> Self {
        self.failures.insert(operation);
        self
    }

    /// Sleep inside `finish_bundle`, widening the window for racing close triggers
    pub fn with_finish_delay(mut self, delay: Duration) -> Self {
        self.finish_delay = Some(delay);
        self
    }

    fn check(&self, operation: UnitOperation) -> BundleResult<()> {
        if self.failures.contains(&operation) {
            return Err(BundleError::execution_unit(
                operation.name(),
                "injected failure",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl<T> ExecutionUnit for RecordingExecutionUnit<T>
where
    T: Clone + Send + 'static,
{
    type Input = T;
    type Output = T;

    async fn open(&mut self) -> BundleResult<()> {
        self.check(UnitOperation::Open)?;
        self.journal.record(JournalEntry::UnitOpened);
        Ok(())
    }

    async fn start_bundle(&mut self) -> BundleResult<()> {
        self.check(UnitOperation::StartBundle)?;
        self.journal.record(JournalEntry::BundleStarted);
        Ok(())
    }

    async fn process(&mut self, item: T) -> BundleResult<()> {
        self.check(UnitOperation::Process)?;
        self.journal.record(JournalEntry::Processed(item.clone()));
        self.pending.push(item);
        Ok(())
    }

    async fn finish_bundle(&mut self) -> BundleResult<()> {
        self.check(UnitOperation::FinishBundle)?;
        if let Some(delay) = self.finish_delay {
            tokio::time::sleep(delay).await;
        }
        self.journal.record(JournalEntry::BundleFinished);
        Ok(())
    }

    async fn drain_results(&mut self) -> BundleResult<Vec<T>> {
        self.check(UnitOperation::DrainResults)?;
        Ok(std::mem::take(&mut self.pending))
    }

    async fn close(&mut self) -> BundleResult<()> {
        self.check(UnitOperation::Close)?;
        self.journal.record(JournalEntry::UnitClosed);
        Ok(())
    }
}

/// Sink that journals results and watermarks
#[derive(Debug)]
pub struct RecordingSink<T> {
    journal: Journal<T>,
    fail_emit: bool,
    fail_watermark: bool,
}

impl<T> RecordingSink<T> {
    pub fn new(journal: Journal<T>) -> Self {
        Self {
            journal,
            fail_emit: false,
            fail_watermark: false,
        }
    }

    pub fn failing_on_emit(mut self) -> Self {
        self.fail_emit = true;
        self
    }

    pub fn failing_on_watermark(mut self) -> Self {
        self.fail_watermark = true;
        self
    }
}

#[async_trait]
impl<T> DownstreamSink<T> for RecordingSink<T>
where
    T: Send + 'static,
{
    async fn emit(&mut self, result: T) -> BundleResult<()> {
        if self.fail_emit {
            return Err(BundleError::Sink("injected emit failure".to_string()));
        }
        self.journal.record(JournalEntry::Emitted(result));
        Ok(())
    }

    async fn forward_watermark(&mut self, watermark: Watermark) -> BundleResult<()> {
        if self.fail_watermark {
            return Err(BundleError::Sink(
                "injected watermark failure".to_string(),
            ));
        }
        self.journal
            .record(JournalEntry::WatermarkForwarded(watermark));
        Ok(())
    }
}

struct ManualRegistrationSlot {
    period: Duration,
    callback: TimerCallback,
    active: Arc<AtomicBool>,
}

/// Timer whose clock and ticks are driven by the test
pub struct ManualTimerSource {
    now_millis: AtomicI64,
    registrations: Mutex<Vec<ManualRegistrationSlot>>,
    cancellations: Arc<AtomicUsize>,
    fail_cancel: bool,
}

impl ManualTimerSource {
    pub fn new() -> Self {
        Self {
            now_millis: AtomicI64::new(0),
            registrations: Mutex::new(Vec::new()),
            cancellations: Arc::new(AtomicUsize::new(0)),
            fail_cancel: false,
        }
    }

    /// Registrations handed out by this source refuse to cancel
    pub fn failing_cancel(mut self) -> Self {
        self.fail_cancel = true;
        self
    }

    pub fn advance_millis(&self, millis: i64) {
        self.now_millis.fetch_add(millis, Ordering::AcqRel);
    }

    pub fn set_time_millis(&self, millis: i64) {
        self.now_millis.store(millis, Ordering::Release);
    }

    /// Invoke every active callback once, awaiting each in registration order
    pub async fn fire(&self) {
        let callbacks: Vec<TimerCallback> = self
            .registrations
            .lock()
            .iter()
            .filter(|slot| slot.active.load(Ordering::Acquire))
            .map(|slot| Arc::clone(&slot.callback))
            .collect();

        for callback in callbacks {
            (callback)().await;
        }
    }

    /// Invoke every registered callback once, including cancelled ones
    pub async fn fire_including_cancelled(&self) {
        let callbacks: Vec<TimerCallback> = self
            .registrations
            .lock()
            .iter()
            .map(|slot| Arc::clone(&slot.callback))
            .collect();

        for callback in callbacks {
            (callback)().await;
        }
    }

    pub fn registered_periods(&self) -> Vec<Duration> {
        self.registrations
            .lock()
            .iter()
            .map(|slot| slot.period)
            .collect()
    }

    pub fn active_registrations(&self) -> usize {
        self.registrations
            .lock()
            .iter()
            .filter(|slot| slot.active.load(Ordering::Acquire))
            .count()
    }

    /// Successful cancellations so far
    pub fn cancellations(&self) -> usize {
        self.cancellations.load(Ordering::Acquire)
    }
}

impl Default for ManualTimerSource {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ManualTimerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualTimerSource")
            .field("now_millis", &self.current_time_millis())
            .field("registrations", &self.registrations.lock().len())
            .field("fail_cancel", &self.fail_cancel)
            .finish()
    }
}

impl TimerSource for ManualTimerSource {
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

        let active = Arc::new(AtomicBool::new(true));
        self.registrations.lock().push(ManualRegistrationSlot {
            period,
            callback,
            active: Arc::clone(&active),
        });

        Ok(Box::new(ManualRegistration {
            active,
            cancellations: Arc::clone(&self.cancellations),
            fail_cancel: self.fail_cancel,
        }))
    }

    fn current_time_millis(&self) -> i64 {
        self.now_millis.load(Ordering::Acquire)
    }
}

struct ManualRegistration {
    active: Arc<AtomicBool>,
    cancellations: Arc<AtomicUsize>,
    fail_cancel: bool,
}

impl TimerRegistration for ManualRegistration {
    fn cancel(&mut self) -> BundleResult<()> {
        if self.fail_cancel {
            return Err(BundleError::Timer("injected cancel failure".to_string()));
        }
        if self.active.swap(false, Ordering::AcqRel) {
            self.cancellations.fetch_add(1, Ordering::AcqRel);
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}
