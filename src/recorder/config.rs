use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default rotation interval
pub const DEFAULT_CHUNK_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for the segment recorder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Duration of each segment before rotating
    /// Default: 30 seconds
    pub chunk_interval: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            chunk_interval: DEFAULT_CHUNK_INTERVAL,
        }
    }
}
