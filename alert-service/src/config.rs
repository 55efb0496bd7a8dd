use std::time::Duration;

use clap::ValueEnum;

/// What to do with a freshly set latch when the job that justified it could
/// not be published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LatchRecovery {
    /// Keep the latch. A redelivered event is skipped, so the alert may be lost.
    #[default]
    AcceptGap,
    /// Undo the latch so a redelivered event can fire again.
    ReleaseLatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub store: Duration,
    pub publish: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            store: Duration::from_millis(2000),
            publish: Duration::from_millis(5000),
        }
    }
}
