//! Health check endpoint

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;

/// Liveness report including the resolved compute device.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub device: String,
    pub compute_type: String,
    pub cuda_available: bool,
    pub gpu_count: u32,
}

/// Health check endpoint. Succeeds whenever the process is up.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let device = state.engine.device();
    Json(HealthResponse {
        status: "healthy",
        device: device.kind.to_string(),
        compute_type: device.compute_type.to_string(),
        cuda_available: device.cuda_available,
        gpu_count: device.gpu_count,
    })
}
