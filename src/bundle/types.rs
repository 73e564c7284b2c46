//! Value types shared across the bundling coordinator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Event-time progress marker in milliseconds.
///
/// [`Watermark::MAX`] is terminal: it marks end of stream and forces every
/// open bundle to drain before it is forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Watermark(i64);

impl Watermark {
    /// The terminal watermark
    pub const MAX: Watermark = Watermark(i64::MAX);

    pub fn new(timestamp: i64) -> Self {
        Self(timestamp)
    }

    pub fn timestamp(&self) -> i64 {
        self.0
    }

    pub fn is_terminal(&self) -> bool {
        self.0 == i64::MAX
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_terminal() {
            write!(f, "Watermark(MAX)")
        } else {
            write!(f, "Watermark({})", self.0)
        }
    }
}

/// What caused a bundle to close
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseTrigger {
    /// The bundle reached the maximum item count
    ItemCount,
    /// The periodic age check found the bundle too old
    BundleAge,
    /// The input stream ended
    EndOfInput,
    /// A checkpoint barrier is about to be taken
    CheckpointBarrier,
    /// The terminal watermark arrived
    TerminalWatermark,
    /// The coordinator is stopping
    Stop,
}

impl CloseTrigger {
    pub fn name(&self) -> &'static str {
        match self {
            CloseTrigger::ItemCount => "item_count",
            CloseTrigger::BundleAge => "bundle_age",
            CloseTrigger::EndOfInput => "end_of_input",
            CloseTrigger::CheckpointBarrier => "checkpoint_barrier",
            CloseTrigger::TerminalWatermark => "terminal_watermark",
            CloseTrigger::Stop => "stop",
        }
    }

    /// Forced closes are requested by the surrounding engine rather than a threshold
    pub fn is_forced(&self) -> bool {
        !matches!(self, CloseTrigger::ItemCount | CloseTrigger::BundleAge)
    }
}

impl fmt::Display for CloseTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle phase of a coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoordinatorPhase {
    /// Constructed, execution unit not yet opened
    Created = 0,
    /// Accepting items and watermarks
    Running = 1,
    /// Final bundle is being drained
    Stopping = 2,
    /// Timer cancelled and execution unit released
    Stopped = 3,
}

impl From<u8> for CoordinatorPhase {
    fn from(value: u8) -> Self {
        match value {
            0 => CoordinatorPhase::Created,
            1 => CoordinatorPhase::Running,
            2 => CoordinatorPhase::Stopping,
            _ => CoordinatorPhase::Stopped,
        }
    }
}
