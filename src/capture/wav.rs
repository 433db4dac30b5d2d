use anyhow::{bail, Context, Result};
use hound::WavReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::source::{CaptureCapabilities, CaptureChunk, CaptureSource, SourceFactory};
use crate::segment::CaptureMode;

/// Capture source that replays a WAV file in real time
///
/// Pushes 16-bit little-endian PCM in `buffer_duration` slices. Useful for
/// running the pipeline without a capture device.
pub struct WavFileSource {
    path: PathBuf,
    buffer_duration: Duration,
    looping: bool,
    paused_tx: watch::Sender<bool>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    is_capturing: Arc<AtomicBool>,
}

impl WavFileSource {
    pub fn new(path: impl AsRef<Path>, buffer_duration: Duration, looping: bool) -> Self {
        let (paused_tx, _) = watch::channel(false);

        Self {
            path: path.as_ref().to_path_buf(),
            buffer_duration,
            looping,
            paused_tx,
            cancel: CancellationToken::new(),
            task: None,
            is_capturing: Arc::new(AtomicBool::new(false)),
        }
    }

    fn load_pcm(&self) -> Result<(Vec<u8>, usize)> {
        let reader = WavReader::open(&self.path)
            .with_context(|| format!("Failed to open WAV file: {}", self.path.display()))?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let bytes_per_second = spec.sample_rate as usize * spec.channels as usize * 2;
        let bytes_per_buffer =
            (bytes_per_second as u128 * self.buffer_duration.as_millis() / 1000).max(2) as usize;

        info!(
            "WAV source loaded: {}Hz, {} channels, {} samples",
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        let pcm = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Ok((pcm, bytes_per_buffer))
    }
}

#[async_trait::async_trait]
impl CaptureSource for WavFileSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureChunk>> {
        if self.task.is_some() {
            bail!("WAV source already started");
        }

        let (pcm, bytes_per_buffer) = self.load_pcm()?;
        if pcm.is_empty() {
            bail!("WAV file has no samples: {}", self.path.display());
        }

        let (tx, rx) = mpsc::channel(100);
        let paused_rx = self.paused_tx.subscribe();
        let cancel = self.cancel.clone();
        let looping = self.looping;
        let is_capturing = Arc::clone(&self.is_capturing);
        let mut ticker = tokio::time::interval(self.buffer_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let started = Instant::now();

        is_capturing.store(true, Ordering::SeqCst);

        self.task = Some(tokio::spawn(async move {
            let mut position = 0usize;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                if *paused_rx.borrow() {
                    continue;
                }

                if position >= pcm.len() {
                    if !looping {
                        break;
                    }
                    position = 0;
                }

                let end = (position + bytes_per_buffer).min(pcm.len());
                let chunk = CaptureChunk {
                    data: pcm[position..end].to_vec(),
                    timestamp_ms: started.elapsed().as_millis() as u64,
                };
                position = end;

                if tx.send(chunk).await.is_err() {
                    break;
                }
            }

            is_capturing.store(false, Ordering::SeqCst);
        }));

        info!("WAV capture source started: {}", self.path.display());
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.cancel.cancel();

        if let Some(task) = self.task.take() {
            task.await.context("WAV source task panicked")?;
        }

        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        self.paused_tx.send_replace(true);
        Ok(())
    }

    async fn resume(&mut self) -> Result<()> {
        self.paused_tx.send_replace(false);
        Ok(())
    }

    fn capabilities(&self) -> CaptureCapabilities {
        CaptureCapabilities { has_video: false }
    }

    fn is_capturing(&self) -> bool {
        self.is_capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}

/// Creates looping WAV sources for the control API
pub struct WavSourceFactory {
    pub path: PathBuf,
    pub buffer_duration: Duration,
}

impl SourceFactory for WavSourceFactory {
    fn create(&self, mode: CaptureMode) -> Result<Box<dyn CaptureSource>> {
        if mode.has_video() {
            bail!("WAV file source cannot capture video");
        }

        Ok(Box::new(WavFileSource::new(
            &self.path,
            self.buffer_duration,
            true,
        )))
    }
}
