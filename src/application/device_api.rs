// Device port - the pool controller's JSON/HTTP API as seen by the console
use crate::domain::device_config::DeviceConfig;
use crate::domain::sample::Sample;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Failure talking to the device.
///
/// Polling treats the first three alike; they stay distinct for logs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviceError {
    #[error("network error: {0}")]
    Network(String),
    #[error("device answered HTTP {status}: {message}")]
    Protocol { status: u16, message: String },
    #[error("malformed device response: {0}")]
    Decode(String),
    #[error("{0}")]
    Rejected(String),
}

impl DeviceError {
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceError::Network(_) => "network",
            DeviceError::Protocol { .. } => "protocol",
            DeviceError::Decode(_) => "decode",
            DeviceError::Rejected(_) => "rejected",
        }
    }

    /// Message for the operator; device-provided text is kept verbatim.
    pub fn operator_message(&self) -> String {
        match self {
            DeviceError::Protocol { message, .. } if !message.is_empty() => message.clone(),
            DeviceError::Rejected(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Buffer solutions handled by the device-side pH regression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PhBuffer {
    Neutral,
    Acid,
}

impl PhBuffer {
    pub fn endpoint(self) -> &'static str {
        match self {
            PhBuffer::Neutral => "/calibrate_ph_neutral",
            PhBuffer::Acid => "/calibrate_ph_acid",
        }
    }

    pub fn nominal_ph(self) -> f64 {
        match self {
            PhBuffer::Neutral => 7.0,
            PhBuffer::Acid => 4.0,
        }
    }
}

/// Reply to a pH calibration step.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PhCalibrationReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    /// Water temperature the device recorded with the calibration.
    #[serde(default)]
    pub temperature: Option<f64>,
}

/// One stored point from `/get-history`.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryPoint {
    /// Epoch seconds.
    pub timestamp: i64,
    #[serde(default)]
    pub ph: Option<f64>,
    #[serde(default)]
    pub orp: Option<f64>,
    #[serde(default)]
    pub temperature: Option<f64>,
}

/// Subset of configuration keys written in a single `/save-config` call.
pub type ConfigPatch = serde_json::Map<String, serde_json::Value>;

#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// Fetch the current sample; `cache_buster` is sent as `?t=`.
    async fn fetch_sample(&self, cache_buster: u64) -> Result<Sample, DeviceError>;

    async fn fetch_config(&self) -> Result<DeviceConfig, DeviceError>;

    async fn save_config(&self, patch: &ConfigPatch) -> Result<(), DeviceError>;

    /// Run one server-side pH calibration step. A `success: false` reply is
    /// returned as [`DeviceError::Rejected`].
    async fn calibrate_ph(&self, buffer: PhBuffer) -> Result<PhCalibrationReply, DeviceError>;

    async fn fetch_history(&self, range: &str) -> Result<Vec<HistoryPoint>, DeviceError>;
}
