// Tests for the upload queue manager
//
// A scripted uploader records every delivery attempt so the tests can check
// ordering, head-of-line blocking, eligibility gating and payload cleanup.

use anyhow::Result;
use async_trait::async_trait;
use chunk_relay::segment::Segment;
use chunk_relay::upload::{Backoff, QueuePolicy, UploadQueue, Uploader};
use chunk_relay::{
    CaptureMode, ChannelSink, ConnectivitySignal, DeliveryError, MemoryStore, NetworkMonitor,
    RecorderEvent, SegmentDescriptor, SegmentStore,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Uploader whose failures are scripted per filename
#[derive(Default)]
struct ScriptedUploader {
    attempts: Mutex<Vec<String>>,
    delivered: Mutex<Vec<(String, Vec<u8>)>>,
    /// filename -> number of upcoming attempts that fail (u32::MAX = always)
    failures: Mutex<HashMap<String, u32>>,
    unauthorized: AtomicBool,
}

impl ScriptedUploader {
    fn fail(&self, filename: &str, times: u32) {
        self.failures.lock().unwrap().insert(filename.to_string(), times);
    }

    fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    fn delivered_names(&self) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[async_trait]
impl Uploader for ScriptedUploader {
    async fn deliver(&self, segment: &SegmentDescriptor, payload: Vec<u8>) -> Result<(), DeliveryError> {
        self.attempts.lock().unwrap().push(segment.filename.clone());

        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&segment.filename) {
                if *remaining > 0 {
                    if *remaining != u32::MAX {
                        *remaining -= 1;
                    }
                    return Err(DeliveryError::Status(503));
                }
            }
        }

        self.delivered
            .lock()
            .unwrap()
            .push((segment.filename.clone(), payload));
        Ok(())
    }

    fn is_authorized(&self) -> bool {
        !self.unauthorized.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    uploader: Arc<ScriptedUploader>,
    monitor: NetworkMonitor,
    queue: UploadQueue,
    events: mpsc::UnboundedReceiver<RecorderEvent>,
    sequence: u32,
}

impl Harness {
    fn new(monitor: NetworkMonitor, policy: QueuePolicy) -> Self {
        Self::with_uploader(monitor, policy, Arc::new(ScriptedUploader::default()))
    }

    fn with_uploader(monitor: NetworkMonitor, policy: QueuePolicy, uploader: Arc<ScriptedUploader>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let (sink, events) = ChannelSink::new();

        let queue = UploadQueue::start(
            store.clone(),
            uploader.clone(),
            monitor.clone(),
            policy,
            Arc::new(sink),
        );

        Self {
            store,
            uploader,
            monitor,
            queue,
            events,
            sequence: 0,
        }
    }

    /// Write a payload to the store, then enqueue its descriptor
    async fn stage(&mut self, name: &str) -> Result<SegmentDescriptor> {
        self.sequence += 1;
        let mut segment = Segment::finalize(CaptureMode::Audio, self.sequence, name.as_bytes().to_vec());
        segment.descriptor.filename = name.to_string();

        self.store.put(&segment.descriptor, segment.payload).await?;
        self.queue.enqueue(segment.descriptor.clone()).await;
        Ok(segment.descriptor)
    }

    /// Wait for the next event matching `pred`
    async fn wait_for(&mut self, pred: impl Fn(&RecorderEvent) -> bool) -> RecorderEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = self.events.recv().await.expect("event channel closed");
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    /// Let the worker and eligibility watcher catch up with what was staged
    async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    async fn wait_for_deliveries(&mut self, count: usize) {
        for _ in 0..count {
            self.wait_for(|e| matches!(e, RecorderEvent::SegmentDelivered { .. }))
                .await;
        }
    }
}

fn fast_policy() -> QueuePolicy {
    QueuePolicy {
        pacing: Duration::from_millis(1),
        ..QueuePolicy::default()
    }
}

#[tokio::test]
async fn test_delivers_in_fifo_order_and_frees_payloads() -> Result<()> {
    let mut h = Harness::new(NetworkMonitor::online(), fast_policy());

    h.stage("a.wav").await?;
    h.stage("b.wav").await?;
    h.stage("c.wav").await?;

    h.wait_for_deliveries(3).await;

    assert_eq!(h.uploader.delivered_names(), vec!["a.wav", "b.wav", "c.wav"]);
    assert_eq!(h.uploader.delivered.lock().unwrap()[1].1, b"b.wav".to_vec());
    assert!(h.store.is_empty().await, "delivered payloads must be deleted");
    assert!(h.queue.is_empty().await);

    let stats = h.queue.stats().await;
    assert_eq!(stats.delivered, 3);
    assert_eq!(stats.failed_attempts, 0);

    Ok(())
}

#[tokio::test]
async fn test_failed_head_blocks_later_items() -> Result<()> {
    let mut h = Harness::new(NetworkMonitor::offline(), fast_policy());
    h.uploader.fail("a.wav", u32::MAX);

    let a = h.stage("a.wav").await?;
    h.stage("b.wav").await?;
    h.stage("c.wav").await?;
    h.settle().await;

    h.monitor.update(ConnectivitySignal::online());

    let failed = h
        .wait_for(|e| matches!(e, RecorderEvent::DeliveryFailed { .. }))
        .await;
    assert!(matches!(failed, RecorderEvent::DeliveryFailed { attempts: 1, .. }));

    // Give a misbehaving worker the chance to move on
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.uploader.attempts(), vec!["a.wav"], "halted after one failure");

    let pending = h.queue.snapshot().await;
    let names: Vec<_> = pending.iter().map(|d| d.filename.as_str()).collect();
    assert_eq!(names, vec!["a.wav", "b.wav", "c.wav"], "order unchanged");
    assert_eq!(pending[0].id, a.id);
    assert_eq!(pending[0].attempts, 1);
    assert_eq!(pending[1].attempts, 0);
    assert_eq!(h.store.len().await, 3, "failed payloads stay in the store");

    // Endpoint recovers; an eligibility flip restarts the drain from the same head
    h.uploader.fail("a.wav", 0);
    h.monitor.update(ConnectivitySignal::offline());
    h.monitor.update(ConnectivitySignal::online());

    h.wait_for_deliveries(3).await;
    assert_eq!(h.uploader.delivered_names(), vec!["a.wav", "b.wav", "c.wav"]);
    assert!(h.store.is_empty().await);

    Ok(())
}

#[tokio::test]
async fn test_failure_halts_even_with_items_enqueued_back_to_back() -> Result<()> {
    let mut h = Harness::new(NetworkMonitor::online(), fast_policy());
    h.uploader.fail("a.wav", u32::MAX);

    // Every enqueue wakes the worker; none of them may cause a second attempt
    h.stage("a.wav").await?;
    h.stage("b.wav").await?;
    h.stage("c.wav").await?;

    h.wait_for(|e| matches!(e, RecorderEvent::DeliveryFailed { .. }))
        .await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(h.uploader.attempts(), vec!["a.wav"]);
    let pending = h.queue.snapshot().await;
    assert_eq!(pending.len(), 3);
    assert_eq!(pending[0].attempts, 1);
    assert_eq!(h.queue.stats().await.failed_attempts, 1);

    // A genuinely new item still retries the head
    h.stage("d.wav").await?;
    h.wait_for(|e| matches!(e, RecorderEvent::DeliveryFailed { attempts: 2, .. }))
        .await;
    assert_eq!(h.uploader.attempts(), vec!["a.wav", "a.wav"]);

    Ok(())
}

#[tokio::test]
async fn test_new_enqueue_retries_halted_head() -> Result<()> {
    let mut h = Harness::new(NetworkMonitor::online(), fast_policy());
    h.uploader.fail("a.wav", 1);

    h.stage("a.wav").await?;
    h.wait_for(|e| matches!(e, RecorderEvent::DeliveryFailed { .. }))
        .await;

    h.stage("b.wav").await?;
    h.wait_for_deliveries(2).await;

    assert_eq!(h.uploader.attempts(), vec!["a.wav", "a.wav", "b.wav"]);
    assert_eq!(h.uploader.delivered_names(), vec!["a.wav", "b.wav"]);

    Ok(())
}

#[tokio::test]
async fn test_offline_queue_makes_no_attempts() -> Result<()> {
    let mut h = Harness::new(NetworkMonitor::offline(), fast_policy());

    for i in 0..5 {
        h.stage(&format!("seg-{}.wav", i)).await?;
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.uploader.attempts().is_empty());

    // Poor is still ineligible
    h.monitor
        .update(ConnectivitySignal::online().with_downlink(0.2));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.uploader.attempts().is_empty());

    h.monitor.update(ConnectivitySignal::online());
    h.wait_for_deliveries(5).await;

    let expected: Vec<String> = (0..5).map(|i| format!("seg-{}.wav", i)).collect();
    assert_eq!(h.uploader.delivered_names(), expected);

    Ok(())
}

#[tokio::test]
async fn test_missing_payload_is_dropped_and_queue_continues() -> Result<()> {
    let mut h = Harness::new(NetworkMonitor::offline(), fast_policy());

    h.stage("a.wav").await?;
    let b = h.stage("b.wav").await?;
    h.stage("c.wav").await?;

    // Payload vanishes out-of-band
    h.store.remove(&b.id).await?;
    h.settle().await;

    h.monitor.update(ConnectivitySignal::online());

    let dropped = h
        .wait_for(|e| matches!(e, RecorderEvent::SegmentDropped { .. }))
        .await;
    match dropped {
        RecorderEvent::SegmentDropped { id, .. } => assert_eq!(id, b.id),
        other => panic!("unexpected event {:?}", other),
    }

    h.wait_for_deliveries(2).await;
    assert_eq!(h.uploader.delivered_names(), vec!["a.wav", "c.wav"]);
    assert!(!h.uploader.attempts().contains(&"b.wav".to_string()));

    let stats = h.queue.stats().await;
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.delivered, 2);
    assert!(h.queue.is_empty().await);

    Ok(())
}

#[tokio::test]
async fn test_dead_letter_after_max_attempts() -> Result<()> {
    let policy = QueuePolicy {
        pacing: Duration::from_millis(1),
        max_attempts: Some(2),
        retry_backoff: Some(Backoff {
            base: Duration::from_millis(10),
            max: Duration::from_millis(20),
        }),
    };
    let mut h = Harness::new(NetworkMonitor::online(), policy);
    h.uploader.fail("a.wav", u32::MAX);

    let a = h.stage("a.wav").await?;
    h.stage("b.wav").await?;

    h.wait_for(|e| matches!(e, RecorderEvent::SegmentDeadLettered { .. }))
        .await;
    h.wait_for_deliveries(1).await;

    assert_eq!(h.uploader.attempts(), vec!["a.wav", "a.wav", "b.wav"]);

    let dead = h.queue.dead_letters().await;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id, a.id);
    assert_eq!(dead[0].attempts, 2);

    // Not delivered, so the payload is kept
    assert!(h.store.get(&a.id).await?.is_some());
    assert_eq!(h.queue.stats().await.dead_lettered, 1);

    Ok(())
}

#[tokio::test]
async fn test_backoff_retries_halted_head() -> Result<()> {
    let policy = QueuePolicy {
        pacing: Duration::from_millis(1),
        max_attempts: None,
        retry_backoff: Some(Backoff {
            base: Duration::from_millis(10),
            max: Duration::from_millis(50),
        }),
    };
    let mut h = Harness::new(NetworkMonitor::online(), policy);
    h.uploader.fail("a.wav", 2);

    h.stage("a.wav").await?;

    let delivered = h
        .wait_for(|e| matches!(e, RecorderEvent::SegmentDelivered { .. }))
        .await;
    assert!(matches!(
        delivered,
        RecorderEvent::SegmentDelivered { attempts: 2, .. }
    ));
    assert_eq!(h.uploader.attempts().len(), 3);

    Ok(())
}

#[tokio::test]
async fn test_unauthorized_holds_queue_without_counting_attempts() -> Result<()> {
    let uploader = Arc::new(ScriptedUploader::default());
    uploader.unauthorized.store(true, Ordering::SeqCst);
    let mut h = Harness::with_uploader(NetworkMonitor::online(), fast_policy(), uploader);

    h.stage("a.wav").await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(h.uploader.attempts().is_empty());
    assert_eq!(h.queue.snapshot().await[0].attempts, 0);

    h.uploader.unauthorized.store(false, Ordering::SeqCst);
    h.queue.notify_authorization_changed();

    h.wait_for_deliveries(1).await;
    assert_eq!(h.uploader.delivered_names(), vec!["a.wav"]);

    Ok(())
}

#[tokio::test]
async fn test_shutdown_leaves_pending_items() -> Result<()> {
    let mut h = Harness::new(NetworkMonitor::offline(), fast_policy());

    h.stage("a.wav").await?;
    h.stage("b.wav").await?;

    h.queue.shutdown().await;
    h.monitor.update(ConnectivitySignal::online());
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(h.queue.len().await, 2);
    assert!(h.uploader.attempts().is_empty());
    assert_eq!(h.store.len().await, 2);

    Ok(())
}

#[test]
fn test_backoff_delay_is_bounded() {
    let backoff = Backoff {
        base: Duration::from_secs(1),
        max: Duration::from_secs(10),
    };

    assert_eq!(backoff.delay(0), Duration::from_secs(1));
    assert_eq!(backoff.delay(1), Duration::from_secs(1));
    assert_eq!(backoff.delay(2), Duration::from_secs(2));
    assert_eq!(backoff.delay(3), Duration::from_secs(4));
    assert_eq!(backoff.delay(5), Duration::from_secs(10));
    assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(10));
}

#[test]
fn test_default_policy_has_no_ceiling() {
    let policy = QueuePolicy::default();

    assert_eq!(policy.max_attempts, None);
    assert_eq!(policy.retry_backoff, None);
    assert_eq!(policy.pacing, Duration::from_millis(500));
}
