use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::SegmentStore;
use crate::crypto::SegmentCipher;
use crate::error::StoreError;
use crate::segment::{split_filename, SegmentDescriptor, SegmentId};

/// Files written for one segment
#[derive(Debug, Clone)]
struct StoredFiles {
    encrypted: PathBuf,
    decrypted: Option<PathBuf>,
}

/// Segment store that persists every payload encrypted at rest
///
/// Layout under `root`:
/// ```text
/// encrypted/<stem>_encrypted.<ext>   IV || ciphertext
/// decrypted/<stem>_decrypted.<ext>   plaintext copy (only with keep_decrypted_copy)
/// ```
pub struct EncryptedDiskStore {
    encrypted_dir: PathBuf,
    decrypted_dir: PathBuf,
    cipher: SegmentCipher,
    keep_decrypted_copy: bool,
    index: RwLock<HashMap<SegmentId, StoredFiles>>,
}

impl EncryptedDiskStore {
    pub fn new(root: impl AsRef<Path>, cipher: SegmentCipher, keep_decrypted_copy: bool) -> Result<Self> {
        let root = root.as_ref();
        let encrypted_dir = root.join("encrypted");
        let decrypted_dir = root.join("decrypted");

        std::fs::create_dir_all(&encrypted_dir)
            .with_context(|| format!("Failed to create directory: {:?}", encrypted_dir))?;
        if keep_decrypted_copy {
            std::fs::create_dir_all(&decrypted_dir)
                .with_context(|| format!("Failed to create directory: {:?}", decrypted_dir))?;
        }

        info!(
            "Encrypted disk store initialized at {} (decrypted copies: {})",
            root.display(),
            keep_decrypted_copy
        );

        Ok(Self {
            encrypted_dir,
            decrypted_dir,
            cipher,
            keep_decrypted_copy,
            index: RwLock::new(HashMap::new()),
        })
    }

    /// Path of the encrypted file for a stored segment
    pub async fn encrypted_path(&self, id: &SegmentId) -> Option<PathBuf> {
        self.index.read().await.get(id).map(|f| f.encrypted.clone())
    }

    /// Path of the plaintext copy for a stored segment, if one was kept
    pub async fn decrypted_path(&self, id: &SegmentId) -> Option<PathBuf> {
        self.index.read().await.get(id).and_then(|f| f.decrypted.clone())
    }

    /// `<stem>_<suffix>.<ext>` inside `dir`, refusing names that would leave it
    fn confined_path(dir: &Path, filename: &str, suffix: &str) -> Result<PathBuf, StoreError> {
        let mut components = Path::new(filename).components();
        let single_normal = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !single_normal {
            return Err(StoreError::OutsideRoot(filename.to_string()));
        }

        let name = match split_filename(filename) {
            (stem, Some(ext)) => format!("{}_{}.{}", stem, suffix, ext),
            (stem, None) => format!("{}_{}", stem, suffix),
        };

        Ok(dir.join(name))
    }
}

impl EncryptedDiskStore {
    /// Decrypt what was just produced so a bad key shows up at write time
    async fn write_decrypted_copy(&self, filename: &str, blob: &[u8]) -> Result<PathBuf, StoreError> {
        let plaintext = self.cipher.decrypt(blob)?;
        let decrypted_path = Self::confined_path(&self.decrypted_dir, filename, "decrypted")?;
        tokio::fs::write(&decrypted_path, &plaintext).await?;
        debug!("Saved decrypted: {}", decrypted_path.display());
        Ok(decrypted_path)
    }
}

async fn remove_if_exists(path: &Path) -> Result<bool, StoreError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl SegmentStore for EncryptedDiskStore {
    async fn put(&self, descriptor: &SegmentDescriptor, payload: Vec<u8>) -> Result<(), StoreError> {
        let encrypted_path = Self::confined_path(&self.encrypted_dir, &descriptor.filename, "encrypted")?;

        let blob = self.cipher.encrypt(&payload);
        tokio::fs::write(&encrypted_path, &blob).await?;
        debug!("Saved encrypted: {}", encrypted_path.display());

        let decrypted = if self.keep_decrypted_copy {
            match self.write_decrypted_copy(&descriptor.filename, &blob).await {
                Ok(path) => Some(path),
                Err(e) => {
                    // Unindexed files could never be removed again
                    if let Err(cleanup) = remove_if_exists(&encrypted_path).await {
                        warn!(
                            "Failed to clean up {}: {}",
                            encrypted_path.display(),
                            cleanup
                        );
                    }
                    return Err(e);
                }
            }
        } else {
            None
        };

        self.index.write().await.insert(
            descriptor.id,
            StoredFiles {
                encrypted: encrypted_path,
                decrypted,
            },
        );

        Ok(())
    }

    async fn get(&self, id: &SegmentId) -> Result<Option<Vec<u8>>, StoreError> {
        let path = match self.encrypted_path(id).await {
            Some(path) => path,
            None => return Ok(None),
        };

        match tokio::fs::read(&path).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Encrypted file vanished: {}", path.display());
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read_plaintext(&self, id: &SegmentId) -> Result<Option<Vec<u8>>, StoreError> {
        match self.get(id).await? {
            Some(blob) => Ok(Some(self.cipher.decrypt(&blob)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, id: &SegmentId) -> Result<bool, StoreError> {
        let files = match self.index.read().await.get(id).cloned() {
            Some(files) => files,
            None => return Ok(false),
        };

        // The entry outlives a failed unlink so the removal can be retried
        let mut removed = remove_if_exists(&files.encrypted).await?;
        if let Some(decrypted) = &files.decrypted {
            removed |= remove_if_exists(decrypted).await?;
        }
        self.index.write().await.remove(id);

        debug!("Deleted local files for segment {}", id);
        Ok(removed)
    }

    async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    fn name(&self) -> &str {
        "encrypted disk"
    }
}
