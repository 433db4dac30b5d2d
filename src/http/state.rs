use std::sync::Arc;

use crate::capture::SourceFactory;
use crate::network::NetworkMonitor;
use crate::recorder::SegmentRecorder;
use crate::upload::UploadQueue;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub recorder: SegmentRecorder,
    pub queue: UploadQueue,
    pub monitor: NetworkMonitor,
    /// Builds a capture source for each new session
    pub sources: Arc<dyn SourceFactory>,
}
