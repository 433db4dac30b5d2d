//! Network quality monitor
//!
//! Turns a platform connectivity signal into a coarse quality class and a
//! single "can I upload now" predicate. Queue gating and the UI's degraded
//! network advisory subscribe independently.

mod monitor;
mod quality;

pub use monitor::{NetworkMonitor, NetworkStatus};
pub use quality::{
    classify, ConnectivitySignal, EffectiveType, NetworkQuality, FAIR_DOWNLINK_MBPS,
    POOR_DOWNLINK_MBPS,
};
