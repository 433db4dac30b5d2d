//! Segment store
//!
//! The only place segment payloads live between finalize and confirmed
//! delivery. The recorder writes, the upload queue reads and deletes.
//!
//! Two backends share the same interface:
//! - `MemoryStore`: in-process map, optionally holding ciphertext
//! - `EncryptedDiskStore`: encrypted files under `encrypted/` (plus optional
//!   plaintext copies under `decrypted/`)

mod disk;
mod memory;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::segment::{SegmentDescriptor, SegmentId};

pub use disk::EncryptedDiskStore;
pub use memory::MemoryStore;

/// Storage backend for segment payloads
#[async_trait]
pub trait SegmentStore: Send + Sync {
    /// Store a freshly finalized payload (plaintext in, backend decides the at-rest form)
    async fn put(&self, descriptor: &SegmentDescriptor, payload: Vec<u8>) -> Result<(), StoreError>;

    /// Stored representation of a payload, exactly what gets delivered.
    ///
    /// `Ok(None)` means the payload is gone (never written, evicted, or removed out-of-band).
    async fn get(&self, id: &SegmentId) -> Result<Option<Vec<u8>>, StoreError>;

    /// Plaintext payload, decrypting if the backend encrypts at rest
    async fn read_plaintext(&self, id: &SegmentId) -> Result<Option<Vec<u8>>, StoreError>;

    /// Delete a payload. Returns whether anything was removed.
    async fn remove(&self, id: &SegmentId) -> Result<bool, StoreError>;

    /// Number of payloads currently held
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Backend name for logging
    fn name(&self) -> &str;
}
