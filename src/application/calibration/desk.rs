// Calibration desk - one session per procedure plus the status board
use super::procedure::CalibrationProcedure;
use super::procedures::{OrpOnePoint, OrpTwoPoint, PhTwoPoint, TemperatureOffset};
use super::session::{CalibrationSession, CommitPreview, SessionView, Transition, Wizard};
use super::{CalibrationContext, CalibrationError};
use crate::application::device_api::{DeviceApi, DeviceError};
use crate::application::telemetry_poller::{PollOptions, TelemetryPoller};
use crate::domain::calibration_status::{CalibrationStatusBoard, FRESHNESS_WINDOW_DAYS};
use chrono::{TimeDelta, Utc};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedureKey {
    Temperature,
    Ph,
    OrpOnePoint,
    OrpTwoPoint,
}

impl ProcedureKey {
    pub const ALL: [ProcedureKey; 4] = [
        ProcedureKey::Temperature,
        ProcedureKey::Ph,
        ProcedureKey::OrpOnePoint,
        ProcedureKey::OrpTwoPoint,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProcedureKey::Temperature => "temperature",
            ProcedureKey::Ph => "ph",
            ProcedureKey::OrpOnePoint => "orp-1pt",
            ProcedureKey::OrpTwoPoint => "orp-2pt",
        }
    }

    /// The other procedure driving the same probe, if any.
    pub fn sibling(self) -> Option<Self> {
        match self {
            ProcedureKey::OrpOnePoint => Some(ProcedureKey::OrpTwoPoint),
            ProcedureKey::OrpTwoPoint => Some(ProcedureKey::OrpOnePoint),
            _ => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone)]
pub struct DeskSettings {
    pub commit_timeout: Duration,
    pub request_timeout: Duration,
    pub reconcile_delay: Duration,
    pub freshness_window: TimeDelta,
    pub status_refresh: Duration,
}

impl Default for DeskSettings {
    fn default() -> Self {
        Self {
            commit_timeout: Duration::from_secs(20),
            request_timeout: Duration::from_secs(10),
            reconcile_delay: Duration::from_secs(2),
            freshness_window: TimeDelta::days(FRESHNESS_WINDOW_DAYS),
            status_refresh: Duration::from_secs(300),
        }
    }
}

fn slot<P: CalibrationProcedure>(procedure: P) -> Mutex<Box<dyn Wizard>> {
    let session: Box<dyn Wizard> = Box::new(CalibrationSession::new(procedure));
    Mutex::new(session)
}

struct DeskInner {
    device: Arc<dyn DeviceApi>,
    telemetry: TelemetryPoller,
    settings: DeskSettings,
    sessions: [Mutex<Box<dyn Wizard>>; 4],
    status: RwLock<Option<CalibrationStatusBoard>>,
}

#[derive(Clone)]
pub struct CalibrationDesk {
    inner: Arc<DeskInner>,
}

impl CalibrationDesk {
    pub fn new(device: Arc<dyn DeviceApi>, telemetry: TelemetryPoller, settings: DeskSettings) -> Self {
        // Order follows ProcedureKey discriminants.
        let sessions = [
            slot(TemperatureOffset),
            slot(PhTwoPoint),
            slot(OrpOnePoint),
            slot(OrpTwoPoint),
        ];
        Self {
            inner: Arc::new(DeskInner {
                device,
                telemetry,
                settings,
                sessions,
                status: RwLock::new(None),
            }),
        }
    }

    /// A session stays locked for the whole of a commit request.
    fn session(&self, key: ProcedureKey) -> Result<MutexGuard<'_, Box<dyn Wizard>>, CalibrationError> {
        self.inner.sessions[key.index()]
            .try_lock()
            .map_err(|_| CalibrationError::Busy)
    }

    pub fn view(&self, key: ProcedureKey) -> Result<SessionView, CalibrationError> {
        Ok(self.session(key)?.view())
    }

    /// View for a freshly opened wizard page; refreshes a stale sample first.
    pub async fn open(&self, key: ProcedureKey) -> Result<SessionView, CalibrationError> {
        if let Err(e) = self
            .inner
            .telemetry
            .poll(PollOptions::if_stale("navigation"))
            .await
        {
            tracing::debug!(procedure = key.as_str(), "navigation poll failed: {}", e);
        }
        self.view(key)
    }

    pub fn enter_reference(&self, key: ProcedureKey, value: f64) -> Result<SessionView, CalibrationError> {
        let mut session = self.session(key)?;
        session.enter_reference(value)?;
        Ok(session.view())
    }

    pub fn preview(&self, key: ProcedureKey) -> Result<CommitPreview, CalibrationError> {
        let sample = self.inner.telemetry.store().latest();
        self.session(key)?.preview(sample.as_ref())
    }

    pub async fn advance(&self, key: ProcedureKey) -> Result<Transition, CalibrationError> {
        let mut session = self.session(key)?;

        if !session.is_active() {
            if let Some(sibling) = key.sibling() {
                let sibling_active = self.inner.sessions[sibling.index()]
                    .try_lock()
                    .map(|other| other.is_active())
                    .unwrap_or(true);
                if sibling_active {
                    return Err(CalibrationError::AlreadyActive(sibling.as_str()));
                }
            }
        }

        let ctx = CalibrationContext {
            device: self.inner.device.as_ref(),
            telemetry: &self.inner.telemetry,
            commit_timeout: self.inner.settings.commit_timeout,
            reconcile_delay: self.inner.settings.reconcile_delay,
        };
        let transition = session.advance(&ctx).await?;
        drop(session);

        if let Transition::Completed(_) = &transition {
            if let Err(e) = self.refresh_status().await {
                tracing::warn!("calibration status refresh failed: {}", e);
            }
        }
        Ok(transition)
    }

    pub fn cancel(&self, key: ProcedureKey) -> Result<SessionView, CalibrationError> {
        let mut session = self.session(key)?;
        session.cancel()?;
        Ok(session.view())
    }

    pub fn acknowledge(&self, key: ProcedureKey) -> Result<SessionView, CalibrationError> {
        let mut session = self.session(key)?;
        session.acknowledge();
        Ok(session.view())
    }

    /// Re-derives the status board from the device configuration.
    pub async fn refresh_status(&self) -> Result<CalibrationStatusBoard, DeviceError> {
        let limit = self.inner.settings.request_timeout;
        let config = tokio::time::timeout(limit, self.inner.device.fetch_config())
            .await
            .map_err(|_| DeviceError::Network(format!("no answer within {:?}", limit)))??;
        let board =
            CalibrationStatusBoard::from_config(&config, Utc::now(), self.inner.settings.freshness_window);
        tracing::debug!(attention_needed = board.attention_needed, "calibration status refreshed");

        let mut status = self
            .inner
            .status
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *status = Some(board.clone());
        Ok(board)
    }

    pub fn status(&self) -> Option<CalibrationStatusBoard> {
        self.inner
            .status
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn spawn_status_refresh(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.inner.settings.status_refresh);
            loop {
                ticker.tick().await;
                if let Err(e) = this.refresh_status().await {
                    tracing::warn!("calibration status refresh failed: {}", e);
                }
            }
        })
    }
}
