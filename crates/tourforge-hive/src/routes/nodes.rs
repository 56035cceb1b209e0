use axum::{extract::State, Json};
use std::sync::Arc;
use tourforge_core::channel::Broker;
use tourforge_core::protocol::{NodeListResponse, RegisterNodeRequest, RegisterNodeResponse};
use tracing::info;

use crate::coordinator::COORDINATOR_PREFIX;
use crate::error::AppResult;
use crate::state::AppState;

pub async fn register_node(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterNodeRequest>,
) -> AppResult<Json<RegisterNodeResponse>> {
    state
        .broker
        .register_node(&payload.node_id, &payload.cpu_model, payload.cores)
        .await?;

    info!(
        "🖥️ Node Registered: {} | {} | {} cores",
        payload.node_id, payload.cpu_model, payload.cores
    );

    Ok(Json(RegisterNodeResponse {
        status: "registered".to_string(),
        prefetch: state.config.channel.prefetch,
    }))
}

pub async fn list(State(state): State<Arc<AppState>>) -> AppResult<Json<NodeListResponse>> {
    let nodes = state
        .broker
        .live_consumers()
        .await?
        .into_iter()
        .filter(|id| !id.starts_with(COORDINATOR_PREFIX))
        .collect();
    Ok(Json(NodeListResponse { nodes }))
}
