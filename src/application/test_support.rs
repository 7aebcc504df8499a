// Scripted in-memory device for application tests
use crate::application::device_api::{
    ConfigPatch, DeviceApi, DeviceError, HistoryPoint, PhBuffer, PhCalibrationReply,
};
use crate::domain::device_config::DeviceConfig;
use crate::domain::sample::Sample;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct FakeDevice {
    samples: Mutex<VecDeque<Result<Sample, DeviceError>>>,
    latency: Mutex<Duration>,
    save_latency: Mutex<Duration>,
    config_latency: Mutex<Duration>,
    history_latency: Mutex<Duration>,
    sample_requests: AtomicUsize,
    config: Mutex<DeviceConfig>,
    saved: Mutex<Vec<ConfigPatch>>,
    save_results: Mutex<VecDeque<Result<(), DeviceError>>>,
    ph_results: Mutex<VecDeque<Result<PhCalibrationReply, DeviceError>>>,
    ph_calls: Mutex<Vec<PhBuffer>>,
    history: Mutex<Vec<HistoryPoint>>,
}

impl FakeDevice {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sample(temperature: f64) -> Sample {
        Sample {
            timestamp: Utc::now(),
            temperature: Some(temperature),
            temperature_raw: Some(temperature),
            ph: Some(7.2),
            orp: Some(650.0),
            orp_raw: Some(640.0),
            filtration_running: true,
            time_synced: true,
        }
    }

    pub fn push_sample(&self, sample: Sample) {
        self.samples.lock().unwrap().push_back(Ok(sample));
    }

    pub fn push_error(&self, error: DeviceError) {
        self.samples.lock().unwrap().push_back(Err(error));
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn set_save_latency(&self, latency: Duration) {
        *self.save_latency.lock().unwrap() = latency;
    }

    pub fn set_config_latency(&self, latency: Duration) {
        *self.config_latency.lock().unwrap() = latency;
    }

    pub fn set_history_latency(&self, latency: Duration) {
        *self.history_latency.lock().unwrap() = latency;
    }

    pub fn set_config(&self, config: DeviceConfig) {
        *self.config.lock().unwrap() = config;
    }

    pub fn push_save_result(&self, result: Result<(), DeviceError>) {
        self.save_results.lock().unwrap().push_back(result);
    }

    pub fn push_ph_result(&self, result: Result<PhCalibrationReply, DeviceError>) {
        self.ph_results.lock().unwrap().push_back(result);
    }

    pub fn set_history(&self, points: Vec<HistoryPoint>) {
        *self.history.lock().unwrap() = points;
    }

    pub fn sample_requests(&self) -> usize {
        self.sample_requests.load(Ordering::SeqCst)
    }

    pub fn saved(&self) -> Vec<ConfigPatch> {
        self.saved.lock().unwrap().clone()
    }

    pub fn ph_calls(&self) -> Vec<PhBuffer> {
        self.ph_calls.lock().unwrap().clone()
    }
}

async fn stall(latency: &Mutex<Duration>) {
    let latency = *latency.lock().unwrap();
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}

#[async_trait]
impl DeviceApi for FakeDevice {
    async fn fetch_sample(&self, _cache_buster: u64) -> Result<Sample, DeviceError> {
        self.sample_requests.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.samples
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(DeviceError::Network("no scripted sample".into())))
    }

    async fn fetch_config(&self) -> Result<DeviceConfig, DeviceError> {
        stall(&self.config_latency).await;
        Ok(self.config.lock().unwrap().clone())
    }

    async fn save_config(&self, patch: &ConfigPatch) -> Result<(), DeviceError> {
        let latency = *self.save_latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.saved.lock().unwrap().push(patch.clone());
        self.save_results.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn calibrate_ph(&self, buffer: PhBuffer) -> Result<PhCalibrationReply, DeviceError> {
        self.ph_calls.lock().unwrap().push(buffer);
        self.ph_results.lock().unwrap().pop_front().unwrap_or(Ok(PhCalibrationReply {
            success: true,
            error: None,
            temperature: Some(24.0),
        }))
    }

    async fn fetch_history(&self, _range: &str) -> Result<Vec<HistoryPoint>, DeviceError> {
        stall(&self.history_latency).await;
        Ok(self.history.lock().unwrap().clone())
    }
}
