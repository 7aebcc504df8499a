// Presentation layer - JSON API for the browser console
pub mod app_state;
pub mod handlers;

use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    acknowledge_calibration, advance_calibration, calibration_status, cancel_calibration,
    enter_reference, get_series, get_session, get_telemetry, health_check, preview_calibration,
    refresh_telemetry,
};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/api/telemetry", get(get_telemetry))
        .route("/api/telemetry/refresh", post(refresh_telemetry))
        .route("/api/series/:metric", get(get_series))
        .route("/api/calibration/status", get(calibration_status))
        .route("/api/calibration/:procedure", get(get_session))
        .route("/api/calibration/:procedure/preview", get(preview_calibration))
        .route("/api/calibration/:procedure/reference", post(enter_reference))
        .route("/api/calibration/:procedure/advance", post(advance_calibration))
        .route("/api/calibration/:procedure/cancel", post(cancel_calibration))
        .route("/api/calibration/:procedure/acknowledge", post(acknowledge_calibration))
        .with_state(state)
}
