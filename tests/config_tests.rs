use anyhow::Result;
use chunk_relay::config::StorageBackend;
use chunk_relay::upload::Backoff;
use chunk_relay::Config;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_bundled_config_loads() -> Result<()> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config").join("chunk-relay");
    let cfg = Config::load(path.to_str().unwrap())?;

    assert_eq!(cfg.service.name, "chunk-relay");
    assert_eq!(cfg.recording.chunk_interval_secs, 30);
    assert_eq!(cfg.storage.backend, StorageBackend::EncryptedDisk);
    assert_eq!(cfg.crypto.key_env, "ENCRYPTION_KEY");
    assert!(cfg.nats.url.is_none());

    let policy = cfg.upload.policy();
    assert_eq!(policy.pacing, Duration::from_millis(500));
    assert_eq!(
        policy.retry_backoff,
        Some(Backoff {
            base: Duration::from_secs(2),
            max: Duration::from_secs(60),
        })
    );

    Ok(())
}

#[test]
fn test_minimal_config_uses_defaults() -> Result<()> {
    let temp_dir = TempDir::new()?;
    std::fs::write(
        temp_dir.path().join("relay.toml"),
        r#"
[service]
name = "relay-test"

[service.http]
bind = "0.0.0.0"
port = 9000

[storage]
backend = "memory"

[upload]
endpoint = "https://uploads.example.com/segments"
max_attempts = 5
backoff_base_ms = 100
"#,
    )?;

    let cfg = Config::load(temp_dir.path().join("relay").to_str().unwrap())?;

    assert_eq!(cfg.recording.chunk_interval_secs, 30);
    assert!(cfg.recording.capture_wav.is_none());
    assert_eq!(cfg.storage.backend, StorageBackend::Memory);
    assert!(!cfg.storage.encrypt_in_memory);
    assert_eq!(cfg.crypto.key_env, "ENCRYPTION_KEY");
    assert_eq!(cfg.upload.timeout(), Duration::from_secs(60));

    let policy = cfg.upload.policy();
    assert_eq!(policy.max_attempts, Some(5));
    assert_eq!(
        policy.retry_backoff,
        Some(Backoff {
            base: Duration::from_millis(100),
            max: Duration::from_millis(3200),
        })
    );

    Ok(())
}

const MINIMAL: &str = r#"
[service]
name = "relay-test"

[service.http]
bind = "0.0.0.0"
port = 9000

[storage]
backend = "memory"
"#;

fn load_with(temp_dir: &TempDir, extra: &str) -> Result<Config> {
    std::fs::write(temp_dir.path().join("relay.toml"), format!("{}{}", MINIMAL, extra))?;
    Config::load(temp_dir.path().join("relay").to_str().unwrap())
}

#[test]
fn test_zero_chunk_interval_is_rejected() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let err = load_with(
        &temp_dir,
        r#"
[recording]
chunk_interval_secs = 0

[upload]
endpoint = "https://uploads.example.com/segments"
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("chunk_interval_secs"));

    Ok(())
}

#[test]
fn test_huge_backoff_base_saturates() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let cfg = load_with(
        &temp_dir,
        r#"
[upload]
endpoint = "https://uploads.example.com/segments"
backoff_base_ms = 9223372036854775807
"#,
    )?;

    let backoff = cfg.upload.policy().retry_backoff.expect("backoff configured");
    let base = Duration::from_millis(i64::MAX as u64);
    assert_eq!(backoff.base, base);
    assert_eq!(backoff.max, base.saturating_mul(32));
    assert_eq!(backoff.delay(40), backoff.max);

    Ok(())
}
