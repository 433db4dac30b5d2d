use anyhow::{bail, Context, Result};
use chunk_relay::capture::{CaptureSource, SourceFactory, WavSourceFactory};
use chunk_relay::config::StorageBackend;
use chunk_relay::events::{spawn_degraded_network_advisory, FanoutSink};
use chunk_relay::nats::{NatsClient, NatsSink};
use chunk_relay::upload::SharedToken;
use chunk_relay::{
    create_router, AppState, CaptureMode, Config, EncryptedDiskStore, EventSink, HttpUploader,
    MemoryStore, NetworkMonitor, RecorderConfig, SegmentCipher, SegmentRecorder, SegmentStore,
    TracingSink, UploadQueue,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chunk-relay", about = "Chunked recording with encrypted at-rest storage and reliable upload")]
struct Cli {
    /// Config file (without extension)
    #[arg(long, default_value = "config/chunk-relay")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control API and upload worker
    Serve,
    /// Decrypt a persisted segment file
    Decrypt { input: PathBuf, output: PathBuf },
}

/// Used when no capture source is configured
struct UnconfiguredSources;

impl SourceFactory for UnconfiguredSources {
    fn create(&self, _mode: CaptureMode) -> Result<Box<dyn CaptureSource>> {
        bail!("No capture source configured (set recording.capture_wav)")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    match cli.command {
        Command::Serve => serve(cfg).await,
        Command::Decrypt { input, output } => decrypt_file(&cfg, &input, &output).await,
    }
}

async fn serve(cfg: Config) -> Result<()> {
    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    let mut sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(TracingSink)];
    if let Some(url) = &cfg.nats.url {
        let client = NatsClient::connect(url, cfg.service.name.clone()).await?;
        sinks.push(Arc::new(NatsSink::new(client)));
    }
    let events: Arc<dyn EventSink> = Arc::new(FanoutSink::new(sinks));

    let store: Arc<dyn SegmentStore> = match cfg.storage.backend {
        StorageBackend::Memory if cfg.storage.encrypt_in_memory => Arc::new(MemoryStore::encrypted(
            SegmentCipher::from_env(&cfg.crypto.key_env)?,
        )),
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::EncryptedDisk => {
            let root = cfg
                .storage
                .root
                .clone()
                .context("storage.root is required for the encrypted_disk backend")?;
            Arc::new(EncryptedDiskStore::new(
                root,
                SegmentCipher::from_env(&cfg.crypto.key_env)?,
                cfg.storage.keep_decrypted_copy,
            )?)
        }
    };

    let mut uploader = HttpUploader::new(cfg.upload.endpoint.clone(), cfg.upload.timeout())?;
    if let Some(var) = &cfg.upload.auth_token_env {
        let token = std::env::var(var).ok();
        if token.is_none() {
            warn!("{} is not set; uploads are held until a token is provided", var);
        }
        uploader = uploader.with_tokens(Arc::new(SharedToken::new(token)));
    }

    let monitor = NetworkMonitor::online();
    let queue = UploadQueue::start(
        Arc::clone(&store),
        Arc::new(uploader),
        monitor.clone(),
        cfg.upload.policy(),
        Arc::clone(&events),
    );

    let recorder = SegmentRecorder::new(
        RecorderConfig {
            chunk_interval: Duration::from_secs(cfg.recording.chunk_interval_secs),
        },
        store,
        queue.clone(),
        Arc::clone(&events),
    );

    let shutdown = CancellationToken::new();
    let advisory = spawn_degraded_network_advisory(
        &monitor,
        recorder.subscribe_state(),
        Arc::clone(&events),
        shutdown.clone(),
    );

    let sources: Arc<dyn SourceFactory> = match &cfg.recording.capture_wav {
        Some(path) => Arc::new(WavSourceFactory {
            path: path.clone(),
            buffer_duration: Duration::from_millis(100),
        }),
        None => Arc::new(UnconfiguredSources),
    };

    let app = create_router(AppState {
        recorder: recorder.clone(),
        queue: queue.clone(),
        monitor,
        sources,
    });

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server error")?;

    info!("Shutting down");
    if recorder.state().is_live() {
        if let Err(e) = recorder.stop().await {
            warn!("Failed to stop recording on shutdown: {}", e);
        }
    }

    let pending = queue.len().await;
    if pending > 0 {
        warn!("{} segments still queued at shutdown", pending);
    }
    queue.shutdown().await;

    shutdown.cancel();
    advisory.await.context("Advisory task panicked")?;

    Ok(())
}

async fn decrypt_file(cfg: &Config, input: &Path, output: &Path) -> Result<()> {
    let cipher = SegmentCipher::from_env(&cfg.crypto.key_env)?;

    let blob = tokio::fs::read(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let plaintext = cipher
        .decrypt(&blob)
        .with_context(|| format!("Failed to decrypt {}", input.display()))?;
    tokio::fs::write(output, &plaintext)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!(
        "Decrypted {} -> {} ({} bytes)",
        input.display(),
        output.display(),
        plaintext.len()
    );
    Ok(())
}
