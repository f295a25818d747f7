// src/api/mod.rs
// Motion control HTTP surface, consumed by the planning agents. Every
// operation is synchronous request/response: the ack is returned once the
// primitive (or sweep) has completed, with the resulting pose attached so
// planners can reason about structured payloads instead of exceptions.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::detect::Orientation;
use crate::drive::{DriveController, Pose, RotationDirection};
use crate::scan::{ScanOrchestrator, ScanReport};
use crate::telemetry::{CommandEcho, ControlState};
use crate::JetbotError;

/// Shared state behind the motion routes.
pub struct ApiState {
    /// Drive controller executing the primitives
    pub controller: Arc<DriveController>,
    /// Scan orchestrator for sweep requests
    pub scanner: Arc<ScanOrchestrator>,
    /// Currently-active command echo (also shown in telemetry frames)
    pub echo: CommandEcho,
}

impl ApiState {
    fn set_echo(&self, state: Option<ControlState>) {
        *self.echo.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }
}

/// Builds the motion control router.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/forward/", post(forward))
        .route("/backward/", post(backward))
        .route("/rotate/", post(rotate))
        .route("/stop/", post(stop))
        .route("/scan/", post(scan))
        .with_state(state)
}

/// Serves the router until the task is dropped.
pub async fn serve(state: Arc<ApiState>, listener: tokio::net::TcpListener) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}

#[derive(Debug, Deserialize)]
struct MoveParams {
    #[serde(default = "default_speed")]
    speed: f64,
    #[serde(default)]
    duration: Option<f64>,
}

fn default_speed() -> f64 {
    0.5
}

#[derive(Debug, Deserialize)]
struct RotateParams {
    angle: f64,
}

#[derive(Debug, Deserialize)]
struct ScanRequest {
    #[serde(default)]
    words: Vec<String>,
    #[serde(default)]
    orientation: Option<Orientation>,
}

#[derive(Debug, Serialize)]
struct MoveAck {
    status: &'static str,
    speed: f64,
    duration: Option<f64>,
    pose: Pose,
}

#[derive(Debug, Serialize)]
struct RotateAck {
    status: &'static str,
    angle: f64,
    direction: RotationDirection,
    pose: Pose,
}

#[derive(Debug, Serialize)]
struct StopAck {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ScanAck {
    status: &'static str,
    data: ScanReport,
}

/// Per-request failures come back as structured error payloads, never as
/// a connection drop.
struct ApiError(JetbotError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            JetbotError::Detector(_) => StatusCode::BAD_GATEWAY,
            JetbotError::Stale { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error!("request failed: {}", self.0);
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl From<JetbotError> for ApiError {
    fn from(e: JetbotError) -> Self {
        ApiError(e)
    }
}

async fn forward(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<MoveParams>,
) -> Result<Json<MoveAck>, ApiError> {
    info!(
        "moving forward at speed {} for {:?} seconds",
        params.speed, params.duration
    );
    state.set_echo(Some(ControlState {
        status: "moving forward".into(),
        speed: Some(params.speed),
        duration: params.duration,
        angle: None,
    }));
    let pose = state.controller.forward(params.speed, params.duration).await?;
    if params.duration.is_some() {
        state.set_echo(None);
    }
    Ok(Json(MoveAck {
        status: "moving forward",
        speed: params.speed,
        duration: params.duration,
        pose,
    }))
}

async fn backward(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<MoveParams>,
) -> Result<Json<MoveAck>, ApiError> {
    info!(
        "moving backward at speed {} for {:?} seconds",
        params.speed, params.duration
    );
    state.set_echo(Some(ControlState {
        status: "moving backward".into(),
        speed: Some(params.speed),
        duration: params.duration,
        angle: None,
    }));
    let pose = state
        .controller
        .backward(params.speed, params.duration)
        .await?;
    if params.duration.is_some() {
        state.set_echo(None);
    }
    Ok(Json(MoveAck {
        status: "moving backward",
        speed: params.speed,
        duration: params.duration,
        pose,
    }))
}

async fn rotate(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<RotateParams>,
) -> Result<Json<RotateAck>, ApiError> {
    info!("rotate {} degrees", params.angle);
    state.set_echo(Some(ControlState {
        status: "rotating".into(),
        speed: None,
        duration: None,
        angle: Some(params.angle),
    }));
    let (pose, direction) = state.controller.rotate(params.angle).await?;
    state.set_echo(None);
    Ok(Json(RotateAck {
        status: "rotating",
        angle: params.angle,
        direction,
        pose,
    }))
}

async fn stop(State(state): State<Arc<ApiState>>) -> Json<StopAck> {
    info!("stopping robot");
    state.set_echo(None);
    state.controller.stop();
    Json(StopAck { status: "stopped" })
}

async fn scan(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<ScanRequest>,
) -> Result<Json<ScanAck>, ApiError> {
    info!("scanning for {:?}", request.words);
    state.set_echo(Some(ControlState {
        status: "scanning".into(),
        speed: None,
        duration: None,
        angle: None,
    }));
    let report = state
        .scanner
        .scan(&request.words, request.orientation)
        .await;
    state.set_echo(None);
    Ok(Json(ScanAck {
        status: "scanning",
        data: report?,
    }))
}
