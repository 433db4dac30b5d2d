use std::time::Duration;

/// Bounded exponential retry delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    /// Delay before retrying a head that has failed `attempts` times
    pub fn delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(16);
        self.base.saturating_mul(1u32 << exponent).min(self.max)
    }
}

/// How the upload queue reacts to failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePolicy {
    /// Pause between consecutive successful deliveries
    pub pacing: Duration,
    /// Move a head to the dead-letter list after this many failed attempts.
    /// `None` keeps retrying forever and the head keeps blocking the queue.
    pub max_attempts: Option<u32>,
    /// Also retry a halted head on a timer, not only on eligibility changes
    /// and new enqueues.
    pub retry_backoff: Option<Backoff>,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            pacing: Duration::from_millis(500),
            max_attempts: None,
            retry_backoff: None,
        }
    }
}
