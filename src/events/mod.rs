//! Notifications from the recorder and the upload queue
//!
//! Components emit [`RecorderEvent`]s into an [`EventSink`]; a UI, a log,
//! or a NATS publisher decides what to do with them.

mod advisory;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::network::NetworkQuality;
use crate::segment::{SegmentDescriptor, SegmentId};

pub use advisory::spawn_degraded_network_advisory;

/// Why a recording session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// `stop()` was called
    Stopped,
    /// The capture source closed its stream without being asked to
    SourceTerminated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecorderEvent {
    SegmentFinalized {
        segment: SegmentDescriptor,
    },
    SessionEnded {
        session_id: Uuid,
        reason: EndReason,
        segments: u32,
    },
    RecordingFailed {
        message: String,
    },
    SegmentDelivered {
        id: SegmentId,
        filename: String,
        attempts: u32,
    },
    SegmentDropped {
        id: SegmentId,
        filename: String,
        reason: String,
    },
    DeliveryFailed {
        id: SegmentId,
        filename: String,
        attempts: u32,
        error: String,
    },
    SegmentDeadLettered {
        id: SegmentId,
        filename: String,
        attempts: u32,
    },
    NetworkDegraded {
        quality: NetworkQuality,
    },
    NetworkRestored {
        quality: NetworkQuality,
    },
}

impl RecorderEvent {
    /// Short event name, used as a subject suffix when publishing
    pub fn kind(&self) -> &'static str {
        match self {
            RecorderEvent::SegmentFinalized { .. } => "segment_finalized",
            RecorderEvent::SessionEnded { .. } => "session_ended",
            RecorderEvent::RecordingFailed { .. } => "recording_failed",
            RecorderEvent::SegmentDelivered { .. } => "segment_delivered",
            RecorderEvent::SegmentDropped { .. } => "segment_dropped",
            RecorderEvent::DeliveryFailed { .. } => "delivery_failed",
            RecorderEvent::SegmentDeadLettered { .. } => "segment_dead_lettered",
            RecorderEvent::NetworkDegraded { .. } => "network_degraded",
            RecorderEvent::NetworkRestored { .. } => "network_restored",
        }
    }
}

/// Receiver of pipeline notifications. Must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: RecorderEvent);
}

/// Writes every event to the log
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: RecorderEvent) {
        match &event {
            RecorderEvent::RecordingFailed { message } => error!("Recording failed: {}", message),
            RecorderEvent::SegmentDropped { filename, reason, .. } => {
                warn!("Segment dropped: {} ({})", filename, reason)
            }
            RecorderEvent::SegmentDeadLettered { filename, attempts, .. } => {
                warn!("Segment dead-lettered after {} attempts: {}", attempts, filename)
            }
            RecorderEvent::NetworkDegraded { quality } => {
                warn!("Network degraded while recording ({:?})", quality)
            }
            other => info!("Event: {}", other.kind()),
        }
    }
}

/// Forwards events into a channel (UI bridge, tests)
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<RecorderEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RecorderEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: RecorderEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.tx.send(event);
    }
}

/// Sends each event to several sinks
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: RecorderEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}
