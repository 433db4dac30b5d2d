use anyhow::{bail, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::source::{CaptureCapabilities, CaptureChunk, CaptureSource};
use crate::segment::CaptureMode;

/// Producer side of a [`ChannelSource`]
///
/// Whoever owns the real device pushes encoded bytes here. Dropping every
/// feed handle ends the stream.
#[derive(Clone)]
pub struct SourceFeed {
    tx: mpsc::Sender<Vec<u8>>,
}

impl SourceFeed {
    pub async fn push(&self, data: Vec<u8>) -> Result<()> {
        self.tx
            .send(data)
            .await
            .context("Capture source is no longer accepting data")
    }
}

/// Capture source fed through a channel
///
/// Adapts an externally driven producer (device callback, test harness)
/// to the [`CaptureSource`] contract. Data pushed while paused is dropped.
pub struct ChannelSource {
    capabilities: CaptureCapabilities,
    feed_rx: Option<mpsc::Receiver<Vec<u8>>>,
    buffer_size: usize,
    paused_tx: watch::Sender<bool>,
    cancel: CancellationToken,
    forwarder: Option<JoinHandle<()>>,
    is_capturing: Arc<AtomicBool>,
}

impl ChannelSource {
    pub fn new(mode: CaptureMode) -> (Self, SourceFeed) {
        Self::with_buffer(mode, 64)
    }

    pub fn with_buffer(mode: CaptureMode, buffer_size: usize) -> (Self, SourceFeed) {
        let (tx, rx) = mpsc::channel(buffer_size);
        let (paused_tx, _) = watch::channel(false);

        let source = Self {
            capabilities: mode.into(),
            feed_rx: Some(rx),
            buffer_size,
            paused_tx,
            cancel: CancellationToken::new(),
            forwarder: None,
            is_capturing: Arc::new(AtomicBool::new(false)),
        };

        (source, SourceFeed { tx })
    }
}

#[async_trait::async_trait]
impl CaptureSource for ChannelSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureChunk>> {
        let mut feed_rx = match self.feed_rx.take() {
            Some(rx) => rx,
            None => bail!("Channel source can only be started once"),
        };

        let (tx, rx) = mpsc::channel(self.buffer_size);
        let paused_rx = self.paused_tx.subscribe();
        let cancel = self.cancel.clone();
        let is_capturing = Arc::clone(&self.is_capturing);
        let started = Instant::now();

        is_capturing.store(true, Ordering::SeqCst);

        self.forwarder = Some(tokio::spawn(async move {
            let stamp = |data: Vec<u8>| CaptureChunk {
                data,
                timestamp_ms: started.elapsed().as_millis() as u64,
            };

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        // Data already pushed before stop still belongs to the session
                        let mut flushed = 0usize;
                        while let Ok(data) = feed_rx.try_recv() {
                            if *paused_rx.borrow() {
                                continue;
                            }
                            if tx.send(stamp(data)).await.is_err() {
                                break;
                            }
                            flushed += 1;
                        }
                        if flushed > 0 {
                            debug!("Flushed {} pending capture chunks on stop", flushed);
                        }
                        break;
                    }
                    item = feed_rx.recv() => {
                        let Some(data) = item else {
                            debug!("Capture feed closed");
                            break;
                        };

                        if *paused_rx.borrow() {
                            continue;
                        }

                        if tx.send(stamp(data)).await.is_err() {
                            break;
                        }
                    }
                }
            }

            is_capturing.store(false, Ordering::SeqCst);
        }));

        info!("Channel capture source started");
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.cancel.cancel();

        if let Some(handle) = self.forwarder.take() {
            handle.await.context("Capture forwarder task panicked")?;
        }

        self.is_capturing.store(false, Ordering::SeqCst);
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
        self.capabilities
    }

    fn is_capturing(&self) -> bool {
        self.is_capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "channel"
    }
}
