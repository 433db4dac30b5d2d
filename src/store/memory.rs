use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::SegmentStore;
use crate::crypto::SegmentCipher;
use crate::error::StoreError;
use crate::segment::{SegmentDescriptor, SegmentId};

/// In-memory segment store
///
/// Holds plaintext by default. Built with [`MemoryStore::encrypted`] it keeps
/// `IV || ciphertext` instead, so nothing readable sits in process memory
/// longer than the finalize step.
pub struct MemoryStore {
    payloads: RwLock<HashMap<SegmentId, Vec<u8>>>,
    cipher: Option<SegmentCipher>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            payloads: RwLock::new(HashMap::new()),
            cipher: None,
        }
    }

    pub fn encrypted(cipher: SegmentCipher) -> Self {
        Self {
            payloads: RwLock::new(HashMap::new()),
            cipher: Some(cipher),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SegmentStore for MemoryStore {
    async fn put(&self, descriptor: &SegmentDescriptor, payload: Vec<u8>) -> Result<(), StoreError> {
        let stored = match &self.cipher {
            Some(cipher) => cipher.encrypt(&payload),
            None => payload,
        };

        debug!(
            "Stored {} in memory ({} bytes)",
            descriptor.filename,
            stored.len()
        );

        self.payloads.write().await.insert(descriptor.id, stored);
        Ok(())
    }

    async fn get(&self, id: &SegmentId) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.payloads.read().await.get(id).cloned())
    }

    async fn read_plaintext(&self, id: &SegmentId) -> Result<Option<Vec<u8>>, StoreError> {
        let stored = match self.get(id).await? {
            Some(stored) => stored,
            None => return Ok(None),
        };

        match &self.cipher {
            Some(cipher) => Ok(Some(cipher.decrypt(&stored)?)),
            None => Ok(Some(stored)),
        }
    }

    async fn remove(&self, id: &SegmentId) -> Result<bool, StoreError> {
        Ok(self.payloads.write().await.remove(id).is_some())
    }

    async fn len(&self) -> usize {
        self.payloads.read().await.len()
    }

    fn name(&self) -> &str {
        if self.cipher.is_some() {
            "memory (encrypted)"
        } else {
            "memory"
        }
    }
}
