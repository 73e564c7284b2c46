//! Coordinator harness wired to recording collaborators and a manual timer

use std::sync::Arc;

use bundler_core::bundle::BundlingCoordinator;
use bundler_core::config::ThresholdPolicy;
use bundler_core::testing::{
    Journal, ManualTimerSource, RecordingExecutionUnit, RecordingSink, UnitOperation,
};

pub type RecordingCoordinator<T> = BundlingCoordinator<RecordingExecutionUnit<T>, RecordingSink<T>>;

pub struct Harness<T> {
    pub coordinator: Arc<RecordingCoordinator<T>>,
    pub journal: Journal<T>,
    pub timer: Arc<ManualTimerSource>,
}

/// Builder for a coordinator with injected failures
pub struct HarnessBuilder {
    max_items: i64,
    max_age_millis: i64,
    unit_failures: Vec<UnitOperation>,
    fail_emit: bool,
    fail_watermark: bool,
    fail_cancel: bool,
}

impl HarnessBuilder {
    pub fn new(max_items: i64, max_age_millis: i64) -> Self {
        Self {
            max_items,
            max_age_millis,
            unit_failures: Vec::new(),
            fail_emit: false,
            fail_watermark: false,
            fail_cancel: false,
        }
    }

    pub fn unit_failing_on(mut self, operation: UnitOperation) -> Self {
        self.unit_failures.push(operation);
        self
    }

    pub fn sink_failing_on_emit(mut self) -> Self {
        self.fail_emit = true;
        self
    }

    pub fn sink_failing_on_watermark(mut self) -> Self {
        self.fail_watermark = true;
        self
    }

    pub fn timer_failing_cancel(mut self) -> Self {
        self.fail_cancel = true;
        self
    }

    pub fn build<T>(self) -> Harness<T>
    where
        T: Clone + Send + 'static,
    {
        let journal = Journal::new();

        let mut unit = RecordingExecutionUnit::new(journal.clone());
        for operation in self.unit_failures {
            unit = unit.failing_on(operation);
        }

        let mut sink = RecordingSink::new(journal.clone());
        if self.fail_emit {
            sink = sink.failing_on_emit();
        }
        if self.fail_watermark {
            sink = sink.failing_on_watermark();
        }

        let timer = if self.fail_cancel {
            ManualTimerSource::new().failing_cancel()
        } else {
            ManualTimerSource::new()
        };
        let timer = Arc::new(timer);

        let policy = ThresholdPolicy::validate(self.max_items, self.max_age_millis).policy;
        let coordinator = Arc::new(BundlingCoordinator::new(
            policy,
            unit,
            sink,
            timer.clone(),
        ));

        Harness {
            coordinator,
            journal,
            timer,
        }
    }
}

/// Started coordinator with no injected failures
pub async fn started_harness<T>(max_items: i64, max_age_millis: i64) -> Harness<T>
where
    T: Clone + Send + 'static,
{
    let harness = HarnessBuilder::new(max_items, max_age_millis).build();
    harness
        .coordinator
        .start()
        .await
        .expect("coordinator should start");
    harness
}
