// Calibration - wizard driver, procedures and the desk that hosts them
pub mod desk;
pub mod procedure;
pub mod procedures;
pub mod session;

use crate::application::device_api::{DeviceApi, DeviceError};
use crate::application::telemetry_poller::TelemetryPoller;
use crate::domain::calibration::ValidationError;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalibrationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{}", .0.operator_message())]
    Device(#[from] DeviceError),
    #[error("a calibration request is still in progress")]
    Busy,
    #[error("acknowledge the previous failure first")]
    FailurePending,
    #[error("no reference value can be entered at this step")]
    NotEditable,
    #[error("{0} calibration is in progress on the same sensor")]
    AlreadyActive(&'static str),
    #[error("nothing to commit at this step")]
    NothingToCommit,
}

impl CalibrationError {
    pub fn kind(&self) -> &'static str {
        match self {
            CalibrationError::Validation(_) => "validation",
            CalibrationError::Device(e) => e.kind(),
            CalibrationError::Busy => "busy",
            CalibrationError::FailurePending => "failure_pending",
            CalibrationError::NotEditable => "not_editable",
            CalibrationError::AlreadyActive(_) => "conflict",
            CalibrationError::NothingToCommit => "nothing_to_commit",
        }
    }
}

/// Collaborators a session needs while it advances.
pub struct CalibrationContext<'a> {
    pub device: &'a dyn DeviceApi,
    pub telemetry: &'a TelemetryPoller,
    pub commit_timeout: Duration,
    pub reconcile_delay: Duration,
}
