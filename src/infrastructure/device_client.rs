// Pool controller HTTP client
use crate::application::device_api::{
    ConfigPatch, DeviceApi, DeviceError, HistoryPoint, PhBuffer, PhCalibrationReply,
};
use crate::domain::device_config::DeviceConfig;
use crate::domain::sample::{Sample, SamplePayload};
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;

const PH_REJECTED_FALLBACK: &str = "pH calibration was rejected by the device";

#[derive(Debug, Clone)]
pub struct HttpDevice {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryBody {
    #[serde(default)]
    history: Vec<HistoryPoint>,
}

impl HttpDevice {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<String, DeviceError> {
        let response = request
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(DeviceError::Protocol {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        Ok(body)
    }

    async fn get_json<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<T, DeviceError> {
        let url = self.url(path_and_query);
        tracing::debug!(%url, "device GET");
        let body = self.execute(self.client.get(&url)).await?;
        decode(&body)
    }
}

fn transport_error(error: reqwest::Error) -> DeviceError {
    if error.is_decode() {
        DeviceError::Decode(error.to_string())
    } else {
        DeviceError::Network(error.to_string())
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, DeviceError> {
    serde_json::from_str(body).map_err(|e| DeviceError::Decode(e.to_string()))
}

/// Device-provided error text from a failed reply, if it sent one.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error.or(b.message))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_default()
}

fn ph_outcome(reply: PhCalibrationReply) -> Result<PhCalibrationReply, DeviceError> {
    if reply.success {
        return Ok(reply);
    }
    let message = reply
        .error
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| PH_REJECTED_FALLBACK.to_string());
    Err(DeviceError::Rejected(message))
}

fn history_path(range: &str) -> String {
    format!("/get-history?range={}", urlencoding::encode(range))
}

#[async_trait]
impl DeviceApi for HttpDevice {
    async fn fetch_sample(&self, cache_buster: u64) -> Result<Sample, DeviceError> {
        let payload: SamplePayload = self.get_json(&format!("/data?t={}", cache_buster)).await?;
        Ok(payload.into_sample(Utc::now()))
    }

    async fn fetch_config(&self) -> Result<DeviceConfig, DeviceError> {
        self.get_json("/get-config").await
    }

    async fn save_config(&self, patch: &ConfigPatch) -> Result<(), DeviceError> {
        let keys: Vec<&str> = patch.keys().map(String::as_str).collect();
        tracing::info!(?keys, "saving device config");
        self.execute(self.client.post(self.url("/save-config")).json(patch))
            .await?;
        Ok(())
    }

    async fn calibrate_ph(&self, buffer: PhBuffer) -> Result<PhCalibrationReply, DeviceError> {
        tracing::info!(?buffer, "requesting device pH calibration");
        let body = self
            .execute(self.client.post(self.url(buffer.endpoint())))
            .await?;
        ph_outcome(decode(&body)?)
    }

    async fn fetch_history(&self, range: &str) -> Result<Vec<HistoryPoint>, DeviceError> {
        let body: HistoryBody = self.get_json(&history_path(range)).await?;
        Ok(body.history)
    }
}
