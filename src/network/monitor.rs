use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use super::quality::{classify, ConnectivitySignal, NetworkQuality};

/// Current view of the network
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkStatus {
    pub signal: ConnectivitySignal,
    pub quality: NetworkQuality,
}

impl NetworkStatus {
    pub fn is_upload_eligible(&self) -> bool {
        self.signal.online && self.quality.allows_upload()
    }
}

struct MonitorChannels {
    status: watch::Sender<NetworkStatus>,
    eligible: watch::Sender<bool>,
}

/// Network quality monitor
///
/// Fed by an external connectivity collaborator through [`NetworkMonitor::update`].
/// Cloning gives another handle to the same monitor.
#[derive(Clone)]
pub struct NetworkMonitor {
    channels: Arc<MonitorChannels>,
}

impl NetworkMonitor {
    pub fn new(initial: ConnectivitySignal) -> Self {
        let status = NetworkStatus {
            signal: initial,
            quality: classify(&initial),
        };
        let (status_tx, _) = watch::channel(status);
        let (eligible_tx, _) = watch::channel(status.is_upload_eligible());

        Self {
            channels: Arc::new(MonitorChannels {
                status: status_tx,
                eligible: eligible_tx,
            }),
        }
    }

    /// Monitor that starts online with no bandwidth hints
    pub fn online() -> Self {
        Self::new(ConnectivitySignal::online())
    }

    pub fn offline() -> Self {
        Self::new(ConnectivitySignal::offline())
    }

    /// Apply a new connectivity signal. Returns true when upload eligibility flipped.
    pub fn update(&self, signal: ConnectivitySignal) -> bool {
        let status = NetworkStatus {
            signal,
            quality: classify(&signal),
        };
        self.channels.status.send_replace(status);

        let eligible = status.is_upload_eligible();
        let changed = self.channels.eligible.send_if_modified(|current| {
            if *current == eligible {
                false
            } else {
                *current = eligible;
                true
            }
        });

        if changed {
            info!(
                "Upload eligibility changed: {} (quality={:?})",
                eligible, status.quality
            );
        }

        changed
    }

    pub fn current_quality(&self) -> NetworkQuality {
        self.channels.status.borrow().quality
    }

    pub fn status(&self) -> NetworkStatus {
        *self.channels.status.borrow()
    }

    pub fn is_upload_eligible(&self) -> bool {
        *self.channels.eligible.borrow()
    }

    /// Notifications that fire only when eligibility crosses the Fair boundary
    pub fn subscribe_eligibility(&self) -> watch::Receiver<bool> {
        self.channels.eligible.subscribe()
    }

    /// Every status update, boundary crossing or not
    pub fn subscribe_status(&self) -> watch::Receiver<NetworkStatus> {
        self.channels.status.subscribe()
    }
}
