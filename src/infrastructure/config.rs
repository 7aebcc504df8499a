use crate::application::calibration::desk::DeskSettings;
use crate::application::telemetry_poller::PollerSettings;
use crate::domain::connectivity::StalenessThresholds;
use chrono::TimeDelta;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConsoleConfig {
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
    #[serde(default)]
    pub calibration: CalibrationSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeviceSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelemetrySettings {
    pub refresh_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub startup_retry_delay_secs: u64,
    pub startup_retry_limit: u32,
    pub offline_after_failures: u32,
    pub watchdog_interval_secs: u64,
    pub degraded_after_secs: u64,
    pub offline_after_secs: u64,
    pub series_capacity: usize,
    pub history_range: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 30,
            request_timeout_secs: 10,
            startup_retry_delay_secs: 2,
            startup_retry_limit: 3,
            offline_after_failures: 3,
            watchdog_interval_secs: 5,
            degraded_after_secs: 75,
            offline_after_secs: 150,
            series_capacity: 100,
            history_range: "24h".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CalibrationSettings {
    pub commit_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub reconcile_delay_secs: u64,
    pub freshness_days: i64,
    pub status_refresh_secs: u64,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            commit_timeout_secs: 20,
            request_timeout_secs: 10,
            reconcile_delay_secs: 2,
            freshness_days: 90,
            status_refresh_secs: 300,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_base_url() -> String {
    "http://poolcontroller.local".to_string()
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

impl TelemetrySettings {
    pub fn poller_settings(&self) -> PollerSettings {
        PollerSettings {
            refresh_interval: Duration::from_secs(self.refresh_interval_secs.max(1)),
            request_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
            startup_retry_delay: Duration::from_secs(self.startup_retry_delay_secs),
            startup_retry_limit: self.startup_retry_limit,
            offline_after_failures: self.offline_after_failures.max(1),
            watchdog_interval: Duration::from_secs(self.watchdog_interval_secs.max(1)),
            staleness: StalenessThresholds {
                degraded_after: Duration::from_secs(self.degraded_after_secs),
                offline_after: Duration::from_secs(self.offline_after_secs),
            },
            series_capacity: self.series_capacity.max(1),
        }
    }
}

impl CalibrationSettings {
    pub fn desk_settings(&self) -> DeskSettings {
        DeskSettings {
            commit_timeout: Duration::from_secs(self.commit_timeout_secs.max(1)),
            request_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
            reconcile_delay: Duration::from_secs(self.reconcile_delay_secs),
            freshness_window: TimeDelta::days(self.freshness_days),
            status_refresh: Duration::from_secs(self.status_refresh_secs.max(1)),
        }
    }
}

/// Optional `config/console.*`, overridden by `POOL_CONSOLE__SECTION__KEY`.
pub fn load_console_config() -> anyhow::Result<ConsoleConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/console").required(false))
        .add_source(
            config::Environment::with_prefix("POOL_CONSOLE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
