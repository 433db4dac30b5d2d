//! Error types for the segment pipeline
//!
//! Each component gets its own error enum so callers can tell the
//! recoverable cases (`AlreadyActive`, transient delivery failures) apart
//! from the ones that end an operation.

use thiserror::Error;

use crate::recorder::RecordingState;

/// Segment recorder errors
#[derive(Error, Debug)]
pub enum RecorderError {
    /// A session is already recording or paused. Nothing was changed.
    #[error("a recording session is already active")]
    AlreadyActive,

    #[error("cannot {action} while {from:?}")]
    InvalidTransition {
        from: RecordingState,
        action: &'static str,
    },

    #[error("capture source error: {0}")]
    Source(#[source] anyhow::Error),

    #[error("invalid recorder configuration: {0}")]
    InvalidConfig(String),
}

/// At-rest encryption errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Blob is shorter than the IV prefix
    #[error("encrypted blob is malformed ({len} bytes, need at least {min})")]
    MalformedInput { len: usize, min: usize },

    /// Ciphertext length or padding did not check out
    #[error("decryption failed: bad padding or ciphertext length")]
    DecryptionFailure,

    #[error("invalid encryption key: {0}")]
    InvalidKey(String),
}

/// Delivery errors. All of them are transient from the queue's point of view.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("endpoint responded with status {0}")]
    Status(u16),

    #[error("not authorized to upload")]
    Unauthorized,
}

impl From<reqwest::Error> for DeliveryError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => DeliveryError::Status(status.as_u16()),
            None => DeliveryError::Transport(e.to_string()),
        }
    }
}

/// Segment store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("path escapes the storage root: {0}")]
    OutsideRoot(String),
}
