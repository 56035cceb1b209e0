use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub run_in_progress: bool,
}

pub async fn root() -> &'static str {
    "TourForge Hive API v0.1"
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        run_in_progress: state.coordinator.is_running(),
    })
}
