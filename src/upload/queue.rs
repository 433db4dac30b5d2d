use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::delivery::Uploader;
use super::policy::QueuePolicy;
use crate::events::{EventSink, RecorderEvent};
use crate::network::NetworkMonitor;
use crate::segment::{SegmentDescriptor, SegmentId};
use crate::store::SegmentStore;

/// Why a drain pass stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrainOutcome {
    /// Queue is empty
    Idle,
    /// Network not eligible
    Ineligible,
    /// No upload credentials
    Unauthorized,
    /// Head delivery failed; it stays at the head
    Halted { attempts: u32 },
    Shutdown,
}

/// Counters since the queue was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub delivered: u64,
    pub dropped: u64,
    pub failed_attempts: u64,
    pub dead_lettered: u64,
}

#[derive(Default)]
struct Counters {
    delivered: AtomicU64,
    dropped: AtomicU64,
    failed_attempts: AtomicU64,
    dead_lettered: AtomicU64,
}

struct QueueShared {
    pending: Mutex<VecDeque<SegmentDescriptor>>,
    dead_letters: Mutex<Vec<SegmentDescriptor>>,
    store: Arc<dyn SegmentStore>,
    uploader: Arc<dyn Uploader>,
    monitor: NetworkMonitor,
    policy: QueuePolicy,
    events: Arc<dyn EventSink>,
    counters: Counters,
    wake: Notify,
    /// Bumped for every real reason to run: enqueue, eligibility, credentials
    wake_generation: AtomicU64,
    shutdown: CancellationToken,
}

impl QueueShared {
    fn wake_worker(&self) {
        self.wake_generation.fetch_add(1, Ordering::SeqCst);
        self.wake.notify_one();
    }
}

/// Upload queue manager
///
/// FIFO of segment descriptors drained by a single worker task. The head
/// blocks everything behind it: a failed delivery leaves it in place and
/// halts the worker until network eligibility flips to true, something new
/// is enqueued, or (with a backoff policy) the retry timer fires.
///
/// Payloads are read from the segment store and deleted only after the
/// endpoint confirms delivery.
#[derive(Clone)]
pub struct UploadQueue {
    shared: Arc<QueueShared>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl UploadQueue {
    /// Create the queue and spawn its worker. Must be called inside a Tokio runtime.
    pub fn start(
        store: Arc<dyn SegmentStore>,
        uploader: Arc<dyn Uploader>,
        monitor: NetworkMonitor,
        policy: QueuePolicy,
        events: Arc<dyn EventSink>,
    ) -> Self {
        info!(
            "Upload queue starting (store: {}, uploader: {}, policy: {:?})",
            store.name(),
            uploader.name(),
            policy
        );

        let shared = Arc::new(QueueShared {
            pending: Mutex::new(VecDeque::new()),
            dead_letters: Mutex::new(Vec::new()),
            store,
            uploader,
            monitor,
            policy,
            events,
            counters: Counters::default(),
            wake: Notify::new(),
            wake_generation: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        });

        let worker = tokio::spawn(run_worker(Arc::clone(&shared)));
        let watcher = tokio::spawn(watch_eligibility(Arc::clone(&shared)));

        Self {
            shared,
            tasks: Arc::new(Mutex::new(vec![worker, watcher])),
        }
    }

    /// Append a descriptor and wake the worker.
    ///
    /// The payload must already be in the store.
    pub async fn enqueue(&self, descriptor: SegmentDescriptor) {
        debug!("Enqueued {}", descriptor.filename);
        self.shared.pending.lock().await.push_back(descriptor);
        self.shared.wake_worker();
    }

    /// Wake the worker after credentials were granted or refreshed
    pub fn notify_authorization_changed(&self) {
        self.shared.wake_worker();
    }

    pub async fn len(&self) -> usize {
        self.shared.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Queued descriptors, head first
    pub async fn snapshot(&self) -> Vec<SegmentDescriptor> {
        self.shared.pending.lock().await.iter().cloned().collect()
    }

    /// Descriptors that hit `max_attempts`. Their payloads are still in the store.
    pub async fn dead_letters(&self) -> Vec<SegmentDescriptor> {
        self.shared.dead_letters.lock().await.clone()
    }

    pub async fn stats(&self) -> QueueStats {
        let counters = &self.shared.counters;

        QueueStats {
            pending: self.len().await,
            delivered: counters.delivered.load(Ordering::SeqCst),
            dropped: counters.dropped.load(Ordering::SeqCst),
            failed_attempts: counters.failed_attempts.load(Ordering::SeqCst),
            dead_lettered: counters.dead_lettered.load(Ordering::SeqCst),
        }
    }

    /// Stop the worker after any in-flight delivery. Pending items stay queued.
    pub async fn shutdown(&self) {
        info!("Shutting down upload queue");
        self.shared.shutdown.cancel();

        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for result in join_all(tasks).await {
            if let Err(e) = result {
                error!("Upload queue task panicked: {}", e);
            }
        }
    }
}

async fn run_worker(shared: Arc<QueueShared>) {
    info!("Upload worker started");

    'worker: loop {
        let outcome = drain(&shared).await;
        debug!("Drain pass finished: {:?}", outcome);

        let retry_after = match outcome {
            DrainOutcome::Shutdown => break,
            DrainOutcome::Halted { attempts } => shared
                .policy
                .retry_backoff
                .map(|backoff| backoff.delay(attempts)),
            _ => None,
        };

        // Wake-ups recorded before a failure were already spent on the failed attempt
        let halted_at = matches!(outcome, DrainOutcome::Halted { .. })
            .then(|| shared.wake_generation.load(Ordering::SeqCst));

        let backoff = sleep_opt(retry_after);
        tokio::pin!(backoff);

        loop {
            tokio::select! {
                _ = shared.shutdown.cancelled() => break 'worker,
                _ = shared.wake.notified() => {}
                _ = &mut backoff => break,
            }

            match halted_at {
                Some(seen) if seen == shared.wake_generation.load(Ordering::SeqCst) => {
                    debug!("Ignoring stale wake-up for halted head");
                }
                _ => break,
            }
        }
    }

    info!("Upload worker stopped");
}

async fn sleep_opt(delay: Option<Duration>) {
    match delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending().await,
    }
}

/// Re-run the queue whenever eligibility turns true
async fn watch_eligibility(shared: Arc<QueueShared>) {
    let mut eligible_rx = shared.monitor.subscribe_eligibility();

    loop {
        tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            changed = eligible_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                if *eligible_rx.borrow_and_update() {
                    info!("Network eligible again, resuming uploads");
                    shared.wake_worker();
                }
            }
        }
    }
}

async fn drain(shared: &QueueShared) -> DrainOutcome {
    loop {
        if shared.shutdown.is_cancelled() {
            return DrainOutcome::Shutdown;
        }

        if !shared.monitor.is_upload_eligible() {
            debug!(
                "Uploads held: network {:?}",
                shared.monitor.current_quality()
            );
            return DrainOutcome::Ineligible;
        }

        if !shared.uploader.is_authorized() {
            debug!("Uploads held: not authorized");
            return DrainOutcome::Unauthorized;
        }

        let head = match shared.pending.lock().await.front().cloned() {
            Some(head) => head,
            None => return DrainOutcome::Idle,
        };

        let payload = match shared.store.get(&head.id).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                warn!(
                    "Payload missing for {}, dropping it from the queue (data loss)",
                    head.filename
                );
                remove_head(shared, &head.id).await;
                shared.counters.dropped.fetch_add(1, Ordering::SeqCst);
                shared.events.emit(RecorderEvent::SegmentDropped {
                    id: head.id,
                    filename: head.filename,
                    reason: "payload missing from store".to_string(),
                });
                continue;
            }
            Err(e) => {
                let attempts = record_failure(shared, &head, &e.to_string()).await;
                return DrainOutcome::Halted { attempts };
            }
        };

        match shared.uploader.deliver(&head, payload).await {
            Ok(()) => {
                if let Err(e) = shared.store.remove(&head.id).await {
                    warn!(
                        "Delivered {} but could not delete payload, it stays in the store: {}",
                        head.filename, e
                    );
                }
                remove_head(shared, &head.id).await;
                shared.counters.delivered.fetch_add(1, Ordering::SeqCst);

                info!(
                    "Delivered {} ({} failed attempts before)",
                    head.filename, head.attempts
                );
                shared.events.emit(RecorderEvent::SegmentDelivered {
                    id: head.id,
                    filename: head.filename,
                    attempts: head.attempts,
                });

                tokio::select! {
                    _ = shared.shutdown.cancelled() => return DrainOutcome::Shutdown,
                    _ = tokio::time::sleep(shared.policy.pacing) => {}
                }
            }
            Err(e) => {
                let attempts = record_failure(shared, &head, &e.to_string()).await;

                if let Some(max) = shared.policy.max_attempts {
                    if attempts >= max {
                        dead_letter(shared, &head.id).await;
                        continue;
                    }
                }

                return DrainOutcome::Halted { attempts };
            }
        }
    }
}

/// Bump the head's attempt counter in place. Returns the new count.
async fn record_failure(shared: &QueueShared, head: &SegmentDescriptor, reason: &str) -> u32 {
    let attempts = {
        let mut pending = shared.pending.lock().await;
        match pending.iter_mut().find(|d| d.id == head.id) {
            Some(entry) => {
                entry.attempts += 1;
                entry.attempts
            }
            None => head.attempts + 1,
        }
    };

    shared.counters.failed_attempts.fetch_add(1, Ordering::SeqCst);

    warn!(
        "Delivery of {} failed (attempt {}): {}",
        head.filename, attempts, reason
    );
    shared.events.emit(RecorderEvent::DeliveryFailed {
        id: head.id,
        filename: head.filename.clone(),
        attempts,
        error: reason.to_string(),
    });

    attempts
}

async fn remove_head(shared: &QueueShared, id: &SegmentId) -> Option<SegmentDescriptor> {
    let mut pending = shared.pending.lock().await;

    if pending.front().map(|d| &d.id) == Some(id) {
        return pending.pop_front();
    }

    let index = pending.iter().position(|d| &d.id == id)?;
    pending.remove(index)
}

async fn dead_letter(shared: &QueueShared, id: &SegmentId) {
    let Some(descriptor) = remove_head(shared, id).await else {
        return;
    };

    warn!(
        "Giving up on {} after {} attempts, moved to dead letters",
        descriptor.filename, descriptor.attempts
    );
    shared.counters.dead_lettered.fetch_add(1, Ordering::SeqCst);
    shared.events.emit(RecorderEvent::SegmentDeadLettered {
        id: descriptor.id,
        filename: descriptor.filename.clone(),
        attempts: descriptor.attempts,
    });

    shared.dead_letters.lock().await.push(descriptor);
}
