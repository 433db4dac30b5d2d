use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a finalized segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentId(pub Uuid);

impl SegmentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SegmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the capture source produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Microphone / system audio only
    Audio,
    /// Audio plus screen video
    Screen,
}

impl CaptureMode {
    pub fn has_video(self) -> bool {
        matches!(self, CaptureMode::Screen)
    }

    /// Filename prefix
    pub fn kind(self) -> &'static str {
        match self {
            CaptureMode::Audio => "audio",
            CaptureMode::Screen => "screen",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            CaptureMode::Audio => "wav",
            CaptureMode::Screen => "webm",
        }
    }
}

/// Build a segment filename:
/// `<kind>_recording_<timestamp>_chunk_<sequence>.<ext>`
///
/// The timestamp is RFC 3339 in UTC with millisecond precision, with every
/// `:` and `.` replaced by `-` so it is safe on every filesystem.
pub fn segment_filename(mode: CaptureMode, created_at: DateTime<Utc>, sequence: u32) -> String {
    let timestamp = created_at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");

    format!(
        "{}_recording_{}_chunk_{}.{}",
        mode.kind(),
        timestamp,
        sequence,
        mode.extension()
    )
}

/// Split a filename into stem and extension (`"a_b.wav"` -> `("a_b", Some("wav"))`)
pub fn split_filename(filename: &str) -> (&str, Option<&str>) {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (filename, None),
    }
}

/// A finalized slice of a recording, payload included
#[derive(Debug, Clone)]
pub struct Segment {
    pub descriptor: SegmentDescriptor,
    pub payload: Vec<u8>,
}

/// Everything about a segment except its payload.
///
/// This is what sits in the upload queue; the payload lives in the segment store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    pub id: SegmentId,
    pub filename: String,
    pub mode: CaptureMode,
    /// 1-based position within its recording session
    pub sequence: u32,
    pub created_at: DateTime<Utc>,
    /// Payload size at finalize time (plaintext)
    pub size_bytes: usize,
    /// Failed delivery attempts so far. Never reset.
    pub attempts: u32,
}

impl Segment {
    /// Finalize a capture buffer into a segment
    pub fn finalize(mode: CaptureMode, sequence: u32, payload: Vec<u8>) -> Self {
        let created_at = Utc::now();

        Self {
            descriptor: SegmentDescriptor {
                id: SegmentId::new(),
                filename: segment_filename(mode, created_at, sequence),
                mode,
                sequence,
                created_at,
                size_bytes: payload.len(),
                attempts: 0,
            },
            payload,
        }
    }

    pub fn id(&self) -> SegmentId {
        self.descriptor.id
    }
}
