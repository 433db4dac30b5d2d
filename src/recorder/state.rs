use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::segment::CaptureMode;

/// Recorder lifecycle
///
/// ```text
/// Idle -> Recording <-> Paused -> Stopped
/// ```
///
/// `Stopped` ends a session; the next `start()` begins a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    Idle,
    Recording,
    Paused,
    Stopped,
}

impl RecordingState {
    /// A session exists and has not ended
    pub fn is_live(self) -> bool {
        matches!(self, RecordingState::Recording | RecordingState::Paused)
    }
}

/// Snapshot of the recorder for status queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderStatus {
    pub state: RecordingState,
    pub session_id: Option<Uuid>,
    pub mode: Option<CaptureMode>,
    pub started_at: Option<DateTime<Utc>>,
    /// Segments finalized so far in the current (or last) session
    pub chunk_sequence: u32,
    /// Bytes captured but not yet finalized
    pub buffered_bytes: usize,
}
