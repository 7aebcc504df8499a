// Application state for HTTP handlers
use crate::application::calibration::desk::CalibrationDesk;
use crate::application::telemetry_poller::TelemetryPoller;

#[derive(Clone)]
pub struct AppState {
    pub telemetry: TelemetryPoller,
    pub desk: CalibrationDesk,
}
