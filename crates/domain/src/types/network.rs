//! Connectivity signal consumed by the network monitor.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{SYNC_COST_EXCELLENT, SYNC_COST_FAIR, SYNC_COST_GOOD, SYNC_COST_POOR};
use crate::impl_domain_status_conversions;

/// Coarse connection quality reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetworkQuality {
    #[default]
    Poor,
    Fair,
    Good,
    Excellent,
}

impl_domain_status_conversions!(NetworkQuality {
    Poor => "poor",
    Fair => "fair",
    Good => "good",
    Excellent => "excellent",
});

impl NetworkQuality {
    /// Rough time to deliver one queued action at this quality.
    #[must_use]
    pub const fn estimated_cost_per_action(self) -> Duration {
        match self {
            Self::Poor => SYNC_COST_POOR,
            Self::Fair => SYNC_COST_FAIR,
            Self::Good => SYNC_COST_GOOD,
            Self::Excellent => SYNC_COST_EXCELLENT,
        }
    }
}

/// Point-in-time connectivity snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct NetworkStatus {
    pub is_online: bool,
    pub quality: NetworkQuality,
}

impl NetworkStatus {
    /// Online at the given quality.
    #[must_use]
    pub const fn online(quality: NetworkQuality) -> Self {
        Self { is_online: true, quality }
    }

    /// Offline. Quality is meaningless and reported as `Poor`.
    #[must_use]
    pub const fn offline() -> Self {
        Self { is_online: false, quality: NetworkQuality::Poor }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_offline() {
        assert_eq!(NetworkStatus::default(), NetworkStatus::offline());
    }

    #[test]
    fn test_cost_decreases_with_quality() {
        assert!(
            NetworkQuality::Poor.estimated_cost_per_action()
                > NetworkQuality::Excellent.estimated_cost_per_action()
        );
        assert_eq!(NetworkQuality::Good.estimated_cost_per_action(), Duration::from_secs(1));
    }
}
