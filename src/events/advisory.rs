use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{EventSink, RecorderEvent};
use crate::network::NetworkMonitor;
use crate::recorder::RecordingState;

/// Watch network eligibility and recorder state together and tell the user
/// when uploads are held back while a session is live.
///
/// Emits `NetworkDegraded` when the network becomes ineligible during a
/// session, and `NetworkRestored` when it recovers before the session ends.
pub fn spawn_degraded_network_advisory(
    monitor: &NetworkMonitor,
    mut recorder_state: watch::Receiver<RecordingState>,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut eligible_rx = monitor.subscribe_eligibility();
    let monitor = monitor.clone();

    tokio::spawn(async move {
        let mut degraded = false;

        loop {
            let eligible = *eligible_rx.borrow_and_update();
            let live = recorder_state.borrow_and_update().is_live();
            let now_degraded = live && !eligible;

            if now_degraded && !degraded {
                sink.emit(RecorderEvent::NetworkDegraded {
                    quality: monitor.current_quality(),
                });
            } else if !now_degraded && degraded && eligible {
                sink.emit(RecorderEvent::NetworkRestored {
                    quality: monitor.current_quality(),
                });
            }
            degraded = now_degraded;

            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = eligible_rx.changed() => if changed.is_err() { break },
                changed = recorder_state.changed() => if changed.is_err() { break },
            }
        }

        debug!("Degraded network advisory stopped");
    })
}
