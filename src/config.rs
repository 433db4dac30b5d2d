use anyhow::{bail, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::upload::{Backoff, QueuePolicy};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub crypto: CryptoConfig,
    pub upload: UploadConfig,
    #[serde(default)]
    pub nats: NatsConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct RecordingConfig {
    #[serde(default = "default_chunk_interval_secs")]
    pub chunk_interval_secs: u64,
    /// WAV file streamed by the built-in capture source
    pub capture_wav: Option<PathBuf>,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            chunk_interval_secs: default_chunk_interval_secs(),
            capture_wav: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    EncryptedDisk,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root for `encrypted/` and `decrypted/` (encrypted_disk only)
    pub root: Option<PathBuf>,
    /// Keep ciphertext instead of plaintext in the memory backend
    #[serde(default)]
    pub encrypt_in_memory: bool,
    /// Also write a plaintext copy next to each encrypted file
    #[serde(default)]
    pub keep_decrypted_copy: bool,
}

#[derive(Debug, Deserialize)]
pub struct CryptoConfig {
    /// Environment variable holding the 32-byte key (raw or base64)
    pub key_env: String,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            key_env: "ENCRYPTION_KEY".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadConfig {
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    pub max_attempts: Option<u32>,
    pub backoff_base_ms: Option<u64>,
    pub backoff_max_ms: Option<u64>,
    /// Environment variable holding the bearer token
    pub auth_token_env: Option<String>,
}

impl UploadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn policy(&self) -> QueuePolicy {
        let retry_backoff = self.backoff_base_ms.map(|base_ms| {
            let base = Duration::from_millis(base_ms);
            Backoff {
                base,
                max: self
                    .backoff_max_ms
                    .map(Duration::from_millis)
                    .unwrap_or(base.saturating_mul(32)),
            }
        });

        QueuePolicy {
            pacing: Duration::from_millis(self.pacing_ms),
            max_attempts: self.max_attempts,
            retry_backoff,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NatsConfig {
    pub url: Option<String>,
}

fn default_chunk_interval_secs() -> u64 {
    30
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_pacing_ms() -> u64 {
    500
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        let cfg: Self = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.recording.chunk_interval_secs == 0 {
            bail!("recording.chunk_interval_secs must be greater than zero");
        }
        Ok(())
    }
}
