// Connectivity classification from poll failures and sample age
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    Connecting,
    Online,
    Degraded,
    Offline,
}

/// Tri-state indicator shown in the console header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Indicator {
    Ok,
    Mid,
    Bad,
}

impl ConnectivityState {
    pub fn indicator(self) -> Indicator {
        match self {
            ConnectivityState::Online => Indicator::Ok,
            ConnectivityState::Connecting | ConnectivityState::Degraded => Indicator::Mid,
            ConnectivityState::Offline => Indicator::Bad,
        }
    }

    /// State after `consecutive_failures` failed polls in a row.
    pub fn after_failures(consecutive_failures: u32, offline_threshold: u32) -> Self {
        if consecutive_failures == 0 {
            ConnectivityState::Online
        } else if consecutive_failures >= offline_threshold.max(1) {
            ConnectivityState::Offline
        } else {
            ConnectivityState::Degraded
        }
    }

    /// Watchdog downgrade from elapsed time alone. Never upgrades.
    pub fn downgrade_for_age(self, age: Duration, thresholds: &StalenessThresholds) -> Self {
        let by_age = if age >= thresholds.offline_after {
            ConnectivityState::Offline
        } else if age >= thresholds.degraded_after {
            ConnectivityState::Degraded
        } else {
            return self;
        };

        if by_age.severity() > self.severity() {
            by_age
        } else {
            self
        }
    }

    fn severity(self) -> u8 {
        match self {
            ConnectivityState::Online => 0,
            ConnectivityState::Connecting => 1,
            ConnectivityState::Degraded => 2,
            ConnectivityState::Offline => 3,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StalenessThresholds {
    pub degraded_after: Duration,
    pub offline_after: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_ladder() {
        assert_eq!(ConnectivityState::after_failures(0, 3), ConnectivityState::Online);
        assert_eq!(ConnectivityState::after_failures(1, 3), ConnectivityState::Degraded);
        assert_eq!(ConnectivityState::after_failures(2, 3), ConnectivityState::Degraded);
        assert_eq!(ConnectivityState::after_failures(3, 3), ConnectivityState::Offline);
        assert_eq!(ConnectivityState::after_failures(2, 2), ConnectivityState::Offline);
    }

    #[test]
    fn test_age_only_downgrades() {
        let thresholds = StalenessThresholds {
            degraded_after: Duration::from_secs(75),
            offline_after: Duration::from_secs(150),
        };

        let online = ConnectivityState::Online;
        assert_eq!(online.downgrade_for_age(Duration::from_secs(10), &thresholds), online);
        assert_eq!(
            online.downgrade_for_age(Duration::from_secs(80), &thresholds),
            ConnectivityState::Degraded
        );
        assert_eq!(
            online.downgrade_for_age(Duration::from_secs(200), &thresholds),
            ConnectivityState::Offline
        );
        assert_eq!(
            ConnectivityState::Offline.downgrade_for_age(Duration::from_secs(80), &thresholds),
            ConnectivityState::Offline
        );
    }

    #[test]
    fn test_indicator() {
        assert_eq!(ConnectivityState::Connecting.indicator(), Indicator::Mid);
        assert_eq!(ConnectivityState::Offline.indicator(), Indicator::Bad);
    }
}
