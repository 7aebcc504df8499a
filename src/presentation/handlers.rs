// HTTP request handlers
use crate::application::calibration::desk::ProcedureKey;
use crate::application::calibration::session::{SessionView, Transition};
use crate::application::calibration::CalibrationError;
use crate::application::device_api::DeviceError;
use crate::application::telemetry_poller::PollOptions;
use crate::domain::sample::Metric;
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

pub enum ApiError {
    NotFound(String),
    Calibration(CalibrationError),
    Device(DeviceError),
}

impl From<CalibrationError> for ApiError {
    fn from(error: CalibrationError) -> Self {
        ApiError::Calibration(error)
    }
}

impl From<DeviceError> for ApiError {
    fn from(error: DeviceError) -> Self {
        ApiError::Device(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self {
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, "not_found", what.clone()),
            ApiError::Calibration(e) => {
                let status = match e {
                    CalibrationError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    CalibrationError::Device(_) => StatusCode::BAD_GATEWAY,
                    _ => StatusCode::CONFLICT,
                };
                (status, e.kind(), e.to_string())
            }
            ApiError::Device(e) => (StatusCode::BAD_GATEWAY, e.kind(), e.operator_message()),
        };
        (status, Json(json!({ "error": message, "kind": kind }))).into_response()
    }
}

fn procedure(name: &str) -> Result<ProcedureKey, ApiError> {
    ProcedureKey::parse(name)
        .ok_or_else(|| ApiError::NotFound(format!("unknown calibration procedure '{}'", name)))
}

#[derive(Deserialize)]
pub struct ReferenceBody {
    pub value: f64,
}

#[derive(Serialize)]
pub struct AdvanceReply {
    pub transition: Transition,
    pub session: SessionView,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn get_telemetry(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.telemetry.status())
}

/// Manual refresh; always goes to the device.
pub async fn refresh_telemetry(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    state.telemetry.poll(PollOptions::forced("manual")).await?;
    Ok(Json(state.telemetry.status()).into_response())
}

pub async fn get_series(
    Path(metric): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let metric = Metric::parse(&metric)
        .ok_or_else(|| ApiError::NotFound(format!("unknown metric '{}'", metric)))?;
    Ok(Json(state.telemetry.chart_view(metric)).into_response())
}

pub async fn calibration_status(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let board = match state.desk.status() {
        Some(board) => board,
        None => state.desk.refresh_status().await?,
    };
    Ok(Json(board).into_response())
}

pub async fn get_session(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let view = state.desk.open(procedure(&name)?).await?;
    Ok(Json(view).into_response())
}

pub async fn preview_calibration(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let preview = state.desk.preview(procedure(&name)?)?;
    Ok(Json(preview).into_response())
}

pub async fn enter_reference(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<ReferenceBody>,
) -> Result<Response, ApiError> {
    let view = state.desk.enter_reference(procedure(&name)?, body.value)?;
    Ok(Json(view).into_response())
}

pub async fn advance_calibration(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let key = procedure(&name)?;
    let transition = state.desk.advance(key).await?;
    let session = state.desk.view(key)?;
    Ok(Json(AdvanceReply {
        transition,
        session,
    })
    .into_response())
}

pub async fn cancel_calibration(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let view = state.desk.cancel(procedure(&name)?)?;
    Ok(Json(view).into_response())
}

pub async fn acknowledge_calibration(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let view = state.desk.acknowledge(procedure(&name)?)?;
    Ok(Json(view).into_response())
}
