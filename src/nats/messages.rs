use serde::{Deserialize, Serialize};

use crate::events::RecorderEvent;

/// Envelope published to NATS for every recorder / upload event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    /// Name of the publishing service instance
    pub service: String,
    pub timestamp: String, // RFC3339 timestamp
    #[serde(flatten)]
    pub event: RecorderEvent,
}
