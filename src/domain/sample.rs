// Sample domain model - latest telemetry snapshot and its store
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Metrics charted by the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Temperature,
    Ph,
    Orp,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Temperature, Metric::Ph, Metric::Orp];

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "temperature" => Some(Metric::Temperature),
            "ph" => Some(Metric::Ph),
            "orp" => Some(Metric::Orp),
            _ => None,
        }
    }
}

/// One telemetry snapshot from the device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub temperature_raw: Option<f64>,
    pub ph: Option<f64>,
    pub orp: Option<f64>,
    pub orp_raw: Option<f64>,
    pub filtration_running: bool,
    pub time_synced: bool,
}

/// `/data` body as sent by the device. `timestamp` is usually absent.
#[derive(Debug, Deserialize)]
pub struct SamplePayload {
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub temperature_raw: Option<f64>,
    #[serde(default)]
    pub ph: Option<f64>,
    #[serde(default)]
    pub orp: Option<f64>,
    #[serde(default)]
    pub orp_raw: Option<f64>,
    #[serde(default)]
    pub filtration_running: bool,
    #[serde(default)]
    pub time_synced: bool,
}

impl SamplePayload {
    /// Converts the wire payload, stamping it with `received_at` when the
    /// device did not send a timestamp of its own.
    pub fn into_sample(self, received_at: DateTime<Utc>) -> Sample {
        let timestamp = self
            .timestamp
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or(received_at);

        Sample {
            timestamp,
            temperature: finite(self.temperature),
            temperature_raw: finite(self.temperature_raw),
            ph: finite(self.ph),
            orp: finite(self.orp),
            orp_raw: finite(self.orp_raw),
            filtration_running: self.filtration_running,
            time_synced: self.time_synced,
        }
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

impl Sample {
    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Ph => self.ph,
            Metric::Orp => self.orp,
        }
    }
}

/// Locally applied correction shown until the next authoritative poll.
/// Touches only the calibrated metric's value/raw pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OptimisticPatch {
    pub metric: Metric,
    pub value: f64,
    pub raw: Option<f64>,
}

/// Holder of the most recent sample. Cloning shares the same slot.
#[derive(Debug, Clone, Default)]
pub struct SampleStore {
    latest: Arc<RwLock<Option<Sample>>>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<Sample> {
        self.latest
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn replace(&self, sample: Sample) {
        *self
            .latest
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(sample);
    }

    /// Applies an optimistic correction. With no sample yet, a synthetic one
    /// is created holding only the patched metric.
    pub fn patch(&self, patch: &OptimisticPatch, at: DateTime<Utc>) {
        let mut guard = self
            .latest
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let sample = guard.get_or_insert_with(|| Sample {
            timestamp: at,
            temperature: None,
            temperature_raw: None,
            ph: None,
            orp: None,
            orp_raw: None,
            filtration_running: false,
            time_synced: false,
        });

        match patch.metric {
            Metric::Temperature => {
                sample.temperature = Some(patch.value);
                if patch.raw.is_some() {
                    sample.temperature_raw = patch.raw;
                }
            }
            Metric::Ph => sample.ph = Some(patch.value),
            Metric::Orp => {
                sample.orp = Some(patch.value);
                if patch.raw.is_some() {
                    sample.orp_raw = patch.raw;
                }
            }
        }
    }
}
