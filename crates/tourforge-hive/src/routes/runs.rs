use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;
use tourforge_core::error::TourError;
use tourforge_core::protocol::{RunReport, StartRunRequest, StartRunResponse};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::routes::instances;
use crate::state::AppState;

pub async fn start(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<StartRunRequest>,
) -> AppResult<(StatusCode, Json<StartRunResponse>)> {
    let root = state.instances.clone();
    let name = payload.instance.clone();
    let instance = tokio::task::spawn_blocking(move || instances::load(&root, &name))
        .await
        .map_err(anyhow::Error::from)??;
    info!(
        "📥 Run requested: {} ({} cities) with {}",
        instance.name, instance.city_count, payload.algorithm
    );

    let started = state
        .coordinator
        .start(instance.matrix, payload.algorithm)
        .await
        .map_err(|e| match e {
            TourError::ConcurrentRun => AppError::Conflict(e.to_string()),
            other => AppError::Tour(other),
        })?;
    Ok((StatusCode::ACCEPTED, Json(started)))
}

pub async fn latest(State(state): State<Arc<AppState>>) -> AppResult<Json<RunReport>> {
    state
        .coordinator
        .latest_report()
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound("finished run".to_string()))
}
