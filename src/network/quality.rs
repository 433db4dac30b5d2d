use serde::{Deserialize, Serialize};

/// Coarse network quality, ordered worst to best
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkQuality {
    Offline,
    Poor,
    Fair,
    Good,
}

impl NetworkQuality {
    /// Fair or better
    pub fn allows_upload(self) -> bool {
        self >= NetworkQuality::Fair
    }
}

/// Effective connection type as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectiveType {
    #[serde(rename = "slow-2g")]
    Slow2g,
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "4g")]
    FourG,
}

/// Downlink below this is Poor (Mbps)
pub const POOR_DOWNLINK_MBPS: f64 = 0.5;
/// Downlink below this is Fair (Mbps)
pub const FAIR_DOWNLINK_MBPS: f64 = 2.0;

/// Raw connectivity signal from the platform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConnectivitySignal {
    pub online: bool,
    #[serde(default)]
    pub effective_type: Option<EffectiveType>,
    #[serde(default)]
    pub downlink_mbps: Option<f64>,
}

impl ConnectivitySignal {
    pub fn online() -> Self {
        Self {
            online: true,
            effective_type: None,
            downlink_mbps: None,
        }
    }

    pub fn offline() -> Self {
        Self {
            online: false,
            effective_type: None,
            downlink_mbps: None,
        }
    }

    pub fn with_effective_type(mut self, effective_type: EffectiveType) -> Self {
        self.effective_type = Some(effective_type);
        self
    }

    pub fn with_downlink(mut self, mbps: f64) -> Self {
        self.downlink_mbps = Some(mbps);
        self
    }
}

/// Classify a signal. The worse of the two bandwidth hints wins; a missing
/// hint does not drag the result down.
pub fn classify(signal: &ConnectivitySignal) -> NetworkQuality {
    if !signal.online {
        return NetworkQuality::Offline;
    }

    let by_type = match signal.effective_type {
        Some(EffectiveType::Slow2g) | Some(EffectiveType::TwoG) => NetworkQuality::Poor,
        Some(EffectiveType::ThreeG) => NetworkQuality::Fair,
        Some(EffectiveType::FourG) | None => NetworkQuality::Good,
    };

    let by_downlink = match signal.downlink_mbps {
        Some(mbps) if mbps < POOR_DOWNLINK_MBPS => NetworkQuality::Poor,
        Some(mbps) if mbps < FAIR_DOWNLINK_MBPS => NetworkQuality::Fair,
        _ => NetworkQuality::Good,
    };

    by_type.min(by_downlink)
}
