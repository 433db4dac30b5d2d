use chrono::{DateTime, Utc};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::config::RecorderConfig;
use super::state::{RecorderStatus, RecordingState};
use crate::capture::{CaptureChunk, CaptureSource};
use crate::error::RecorderError;
use crate::events::{EndReason, EventSink, RecorderEvent};
use crate::segment::{CaptureMode, Segment};
use crate::store::SegmentStore;
use crate::upload::UploadQueue;

struct ActiveSession {
    id: Uuid,
    mode: CaptureMode,
    started_at: DateTime<Utc>,
    /// Bytes captured since the last finalize
    buffer: Vec<u8>,
    /// Segments finalized so far; the next one gets `chunk_sequence + 1`
    chunk_sequence: u32,
    source: Option<Box<dyn CaptureSource>>,
    /// Set once stop (requested or not) has begun
    stopping: bool,
    rotation: Option<CancellationToken>,
    pump_cancel: CancellationToken,
    pump: Option<JoinHandle<()>>,
}

impl ActiveSession {
    /// Close out the buffer. Empty buffers produce nothing.
    fn take_segment(&mut self) -> Option<Segment> {
        if self.buffer.is_empty() {
            return None;
        }

        self.chunk_sequence += 1;
        let payload = std::mem::take(&mut self.buffer);
        Some(Segment::finalize(self.mode, self.chunk_sequence, payload))
    }

    fn disarm_rotation(&mut self) {
        if let Some(token) = self.rotation.take() {
            token.cancel();
        }
    }
}

struct RecorderInner {
    state: RecordingState,
    session: Option<ActiveSession>,
}

impl RecorderInner {
    fn session_mut(&mut self, id: Uuid) -> Option<&mut ActiveSession> {
        self.session.as_mut().filter(|s| s.id == id)
    }
}

struct RecorderShared {
    config: RecorderConfig,
    store: Arc<dyn SegmentStore>,
    queue: UploadQueue,
    events: Arc<dyn EventSink>,
    inner: Mutex<RecorderInner>,
    /// At most one finalize-and-emit in flight; keeps enqueue order = capture order
    finalize_lock: Mutex<()>,
    state_tx: watch::Sender<RecordingState>,
}

/// Chunked recording state machine
///
/// Cloning gives another handle to the same recorder.
#[derive(Clone)]
pub struct SegmentRecorder {
    shared: Arc<RecorderShared>,
}

impl SegmentRecorder {
    pub fn new(
        config: RecorderConfig,
        store: Arc<dyn SegmentStore>,
        queue: UploadQueue,
        events: Arc<dyn EventSink>,
    ) -> Self {
        info!(
            "Segment recorder initialized (segments: {}s each, store: {})",
            config.chunk_interval.as_secs_f64(),
            store.name()
        );

        let (state_tx, _) = watch::channel(RecordingState::Idle);

        Self {
            shared: Arc::new(RecorderShared {
                config,
                store,
                queue,
                events,
                inner: Mutex::new(RecorderInner {
                    state: RecordingState::Idle,
                    session: None,
                }),
                finalize_lock: Mutex::new(()),
                state_tx,
            }),
        }
    }

    fn from_shared(shared: Arc<RecorderShared>) -> Self {
        Self { shared }
    }

    pub fn state(&self) -> RecordingState {
        *self.shared.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<RecordingState> {
        self.shared.state_tx.subscribe()
    }

    fn set_state(&self, inner: &mut RecorderInner, state: RecordingState) {
        debug!("Recorder state: {:?} -> {:?}", inner.state, state);
        inner.state = state;
        self.shared.state_tx.send_replace(state);
    }

    /// Start a new session
    ///
    /// Returns [`RecorderError::AlreadyActive`] without touching anything if a
    /// session is recording or paused.
    pub async fn start(
        &self,
        mode: CaptureMode,
        mut source: Box<dyn CaptureSource>,
    ) -> Result<Uuid, RecorderError> {
        let mut inner = self.shared.inner.lock().await;

        if inner.state.is_live() {
            warn!("Recording already started");
            return Err(RecorderError::AlreadyActive);
        }

        if self.shared.config.chunk_interval.is_zero() {
            return Err(RecorderError::InvalidConfig(
                "chunk interval must be greater than zero".to_string(),
            ));
        }

        if mode.has_video() && !source.capabilities().has_video {
            return Err(RecorderError::Source(anyhow::anyhow!(
                "capture source {} cannot record video",
                source.name()
            )));
        }

        let capture_rx = source.start().await.map_err(RecorderError::Source)?;

        let session_id = Uuid::new_v4();
        let pump_cancel = CancellationToken::new();
        let pump = tokio::spawn(pump_capture(
            Arc::downgrade(&self.shared),
            session_id,
            capture_rx,
            pump_cancel.clone(),
        ));

        info!(
            "Starting recording session {} ({:?}, source: {})",
            session_id,
            mode,
            source.name()
        );

        inner.session = Some(ActiveSession {
            id: session_id,
            mode,
            started_at: Utc::now(),
            buffer: Vec::new(),
            chunk_sequence: 0,
            source: Some(source),
            stopping: false,
            rotation: Some(self.arm_rotation(session_id)),
            pump_cancel,
            pump: Some(pump),
        });
        self.set_state(&mut inner, RecordingState::Recording);

        Ok(session_id)
    }

    /// Suspend capture and the rotation timer. The buffer is kept, not finalized.
    pub async fn pause(&self) -> Result<(), RecorderError> {
        let mut inner = self.shared.inner.lock().await;

        if inner.state != RecordingState::Recording {
            return Err(RecorderError::InvalidTransition {
                from: inner.state,
                action: "pause",
            });
        }

        if let Some(session) = inner.session.as_mut() {
            if let Some(source) = session.source.as_mut() {
                source.pause().await.map_err(RecorderError::Source)?;
            }
            session.disarm_rotation();
        }

        self.set_state(&mut inner, RecordingState::Paused);
        info!("Recording paused");
        Ok(())
    }

    /// Continue a paused session into the same buffer, with a fresh rotation interval
    pub async fn resume(&self) -> Result<(), RecorderError> {
        let mut inner = self.shared.inner.lock().await;

        if inner.state != RecordingState::Paused {
            return Err(RecorderError::InvalidTransition {
                from: inner.state,
                action: "resume",
            });
        }

        if let Some(session) = inner.session.as_mut() {
            if let Some(source) = session.source.as_mut() {
                source.resume().await.map_err(RecorderError::Source)?;
            }
            session.rotation = Some(self.arm_rotation(session.id));
        }

        self.set_state(&mut inner, RecordingState::Recording);
        info!("Recording resumed");
        Ok(())
    }

    /// Stop the session, emitting whatever is buffered as the final segment.
    ///
    /// Does not touch the upload queue; pending uploads keep draining.
    pub async fn stop(&self) -> Result<(), RecorderError> {
        let (session_id, source, pump_cancel, pump) = {
            let mut inner = self.shared.inner.lock().await;
            let state = inner.state;

            let session = match inner.session.as_mut() {
                Some(session) if state.is_live() && !session.stopping => session,
                _ => {
                    return Err(RecorderError::InvalidTransition {
                        from: state,
                        action: "stop",
                    })
                }
            };

            session.stopping = true;
            session.disarm_rotation();

            (
                session.id,
                session.source.take(),
                session.pump_cancel.clone(),
                session.pump.take(),
            )
        };

        info!("Stopping recording session {}", session_id);

        if let Some(mut source) = source {
            if let Err(e) = source.stop().await {
                warn!("Failed to stop capture source {}: {}", source.name(), e);
            }
        }

        // Pump drains anything the source pushed before it closed
        pump_cancel.cancel();
        if let Some(pump) = pump {
            if let Err(e) = pump.await {
                error!("Capture pump panicked: {}", e);
            }
        }

        self.finish(session_id, EndReason::Stopped).await;
        Ok(())
    }

    pub async fn status(&self) -> RecorderStatus {
        let inner = self.shared.inner.lock().await;

        match &inner.session {
            Some(session) => RecorderStatus {
                state: inner.state,
                session_id: Some(session.id),
                mode: Some(session.mode),
                started_at: Some(session.started_at),
                chunk_sequence: session.chunk_sequence,
                buffered_bytes: session.buffer.len(),
            },
            None => RecorderStatus {
                state: inner.state,
                session_id: None,
                mode: None,
                started_at: None,
                chunk_sequence: 0,
                buffered_bytes: 0,
            },
        }
    }

    fn arm_rotation(&self, session_id: Uuid) -> CancellationToken {
        let token = CancellationToken::new();
        let cancel = token.clone();
        let interval = self.shared.config.chunk_interval;
        let weak = Arc::downgrade(&self.shared);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let Some(shared) = weak.upgrade() else { break };
                SegmentRecorder::from_shared(shared).rotate(session_id).await;
            }
        });

        token
    }

    /// Timer-driven finalize. Skipped (coalesced) if another finalize is in flight.
    async fn rotate(&self, session_id: Uuid) {
        let Ok(_guard) = self.shared.finalize_lock.try_lock() else {
            debug!("Rotation skipped: finalize already in progress");
            return;
        };

        let segment = {
            let mut inner = self.shared.inner.lock().await;
            if inner.state != RecordingState::Recording {
                return;
            }
            match inner.session_mut(session_id) {
                Some(session) if !session.stopping => session.take_segment(),
                _ => return,
            }
        };

        match segment {
            Some(segment) => self.emit(segment).await,
            None => debug!("Rotation with empty buffer, nothing to emit"),
        }
    }

    /// Final finalize of a session and transition to Stopped
    async fn finish(&self, session_id: Uuid, reason: EndReason) {
        let _guard = self.shared.finalize_lock.lock().await;

        let (segment, segments) = {
            let mut inner = self.shared.inner.lock().await;
            if !inner.state.is_live() {
                return;
            }

            let Some(session) = inner.session_mut(session_id) else {
                return;
            };
            session.disarm_rotation();
            let segment = session.take_segment();
            let segments = session.chunk_sequence;

            self.set_state(&mut inner, RecordingState::Stopped);
            (segment, segments)
        };

        if let Some(segment) = segment {
            self.emit(segment).await;
        }

        info!(
            "Recording session {} ended ({:?}, {} segments)",
            session_id, reason, segments
        );
        self.shared.events.emit(RecorderEvent::SessionEnded {
            session_id,
            reason,
            segments,
        });
    }

    /// Capture stream closed without `stop()`: keep what was buffered, then end the session
    async fn end_unexpectedly(&self, session_id: Uuid) {
        let source = {
            let mut inner = self.shared.inner.lock().await;
            let live = inner.state.is_live();

            match inner.session_mut(session_id) {
                Some(session) if live && !session.stopping => {
                    session.stopping = true;
                    session.disarm_rotation();
                    // This runs on the pump task itself
                    session.pump.take();
                    session.source.take()
                }
                _ => return,
            }
        };

        warn!("Capture source terminated unexpectedly; finalizing buffered data");

        if let Some(mut source) = source {
            if let Err(e) = source.stop().await {
                debug!("Stopping terminated source {} failed: {}", source.name(), e);
            }
        }

        self.finish(session_id, EndReason::SourceTerminated).await;
    }

    /// Store first, then enqueue, so the worker never sees a descriptor without a payload
    async fn emit(&self, segment: Segment) {
        let Segment {
            descriptor,
            payload,
        } = segment;
        let size = payload.len();

        if let Err(e) = self.shared.store.put(&descriptor, payload).await {
            error!("Failed to store segment {}: {}", descriptor.filename, e);
            self.shared.events.emit(RecorderEvent::RecordingFailed {
                message: format!("could not store {}: {}", descriptor.filename, e),
            });
            return;
        }

        self.shared.queue.enqueue(descriptor.clone()).await;

        info!(
            "Chunk {} saved: {} ({} bytes)",
            descriptor.sequence, descriptor.filename, size
        );
        self.shared
            .events
            .emit(RecorderEvent::SegmentFinalized { segment: descriptor });
    }

    async fn append(&self, session_id: Uuid, chunk: CaptureChunk) {
        let mut inner = self.shared.inner.lock().await;
        let recording = inner.state == RecordingState::Recording;

        match inner.session_mut(session_id) {
            Some(session) if recording => session.buffer.extend_from_slice(&chunk.data),
            Some(_) => debug!(
                "Dropped {} bytes captured while not recording",
                chunk.data.len()
            ),
            None => {}
        }
    }
}

/// Move captured bytes into the session buffer until the stream ends or stop cancels us
async fn pump_capture(
    shared: Weak<RecorderShared>,
    session_id: Uuid,
    mut capture_rx: mpsc::Receiver<CaptureChunk>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            next = capture_rx.recv() => next,
            _ = cancel.cancelled() => {
                let Some(shared) = shared.upgrade() else { return };
                let recorder = SegmentRecorder::from_shared(shared);
                while let Ok(chunk) = capture_rx.try_recv() {
                    recorder.append(session_id, chunk).await;
                }
                return;
            }
        };

        let Some(shared) = shared.upgrade() else { return };
        let recorder = SegmentRecorder::from_shared(shared);

        match next {
            Some(chunk) => recorder.append(session_id, chunk).await,
            None => {
                recorder.end_unexpectedly(session_id).await;
                return;
            }
        }
    }
}
