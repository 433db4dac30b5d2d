use anyhow::Result;
use tokio::sync::mpsc;

use crate::segment::CaptureMode;

/// Raw bytes pushed by a capture source
#[derive(Debug, Clone)]
pub struct CaptureChunk {
    /// Encoded media bytes (opaque to the recorder)
    pub data: Vec<u8>,
    /// Milliseconds since the source was started
    pub timestamp_ms: u64,
}

/// What a capture source can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureCapabilities {
    pub has_video: bool,
}

impl CaptureCapabilities {
    pub fn mode(self) -> CaptureMode {
        if self.has_video {
            CaptureMode::Screen
        } else {
            CaptureMode::Audio
        }
    }
}

impl From<CaptureMode> for CaptureCapabilities {
    fn from(mode: CaptureMode) -> Self {
        Self {
            has_video: mode.has_video(),
        }
    }
}

/// Capture source contract
///
/// The device side (microphone, system audio, screen) lives outside this
/// crate. A source pushes encoded bytes into the channel returned by
/// `start()` and closes it to signal end-of-stream. A close that was not
/// requested through `stop()` is treated as unexpected termination.
#[async_trait::async_trait]
pub trait CaptureSource: Send + Sync {
    /// Start capturing
    ///
    /// Returns a channel receiver that will receive captured chunks
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureChunk>>;

    /// Stop capturing and close the stream
    async fn stop(&mut self) -> Result<()>;

    /// Suspend capture without closing the stream
    async fn pause(&mut self) -> Result<()>;

    /// Continue after `pause()`
    async fn resume(&mut self) -> Result<()>;

    fn capabilities(&self) -> CaptureCapabilities;

    /// Check if source is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get source name for logging
    fn name(&self) -> &str;
}

/// Builds capture sources on demand (used by the control API)
pub trait SourceFactory: Send + Sync {
    fn create(&self, mode: CaptureMode) -> Result<Box<dyn CaptureSource>>;
}
