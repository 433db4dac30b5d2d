//! Upload queue manager and delivery endpoint client

mod delivery;
mod policy;
mod queue;

pub use delivery::{HttpUploader, SharedToken, TokenProvider, Uploader};
pub use policy::{Backoff, QueuePolicy};
pub use queue::{QueueStats, UploadQueue};
