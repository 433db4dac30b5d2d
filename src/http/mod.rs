//! HTTP API for local control of the recorder
//!
//! - POST /recording/start - Start a new session
//! - POST /recording/pause | /recording/resume | /recording/stop
//! - GET /recording/status - Recorder state and current session
//! - GET /uploads - Upload queue contents and counters
//! - POST /network - Push a connectivity signal
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{NetworkResponse, StartRecordingRequest, UploadsResponse};
pub use routes::create_router;
pub use state::AppState;
