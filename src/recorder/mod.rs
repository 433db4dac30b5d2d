//! Segment recorder
//!
//! Owns one capture session at a time and cuts it into segments:
//! - on a fixed rotation timer while recording
//! - on `stop()` (final, possibly short segment)
//! - when the capture source ends unexpectedly
//!
//! Every segment is written to the segment store, then enqueued for upload.

mod config;
mod recorder;
mod state;

pub use config::{RecorderConfig, DEFAULT_CHUNK_INTERVAL};
pub use recorder::SegmentRecorder;
pub use state::{RecorderStatus, RecordingState};
