use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tourforge_core::channel::Broker;
use tourforge_core::protocol::{
    AckRequest, FetchRequest, FetchResponse, NackRequest, PublishRequest, PurgeResponse, WireDelivery,
};

use crate::error::AppResult;
use crate::state::AppState;

/// Longest a fetch may hold its HTTP request open.
pub const MAX_FETCH_WAIT: Duration = Duration::from_secs(30);

pub async fn publish(
    State(state): State<Arc<AppState>>,
    Path(queue): Path<String>,
    Json(req): Json<PublishRequest>,
) -> AppResult<()> {
    state.broker.publish(&queue, req.payload).await?;
    Ok(())
}

pub async fn fetch(
    State(state): State<Arc<AppState>>,
    Path(queue): Path<String>,
    Json(req): Json<FetchRequest>,
) -> AppResult<Json<FetchResponse>> {
    let wait = Duration::from_millis(req.wait_ms).min(MAX_FETCH_WAIT);
    let deliveries = state
        .broker
        .fetch(&queue, &req.consumer_id, req.max, wait)
        .await?
        .into_iter()
        .map(|d| WireDelivery {
            tag: d.tag,
            redelivered: d.redelivered,
            payload: d.payload,
        })
        .collect();
    Ok(Json(FetchResponse { deliveries }))
}

pub async fn ack(
    State(state): State<Arc<AppState>>,
    Path(queue): Path<String>,
    Json(req): Json<AckRequest>,
) -> AppResult<()> {
    state.broker.ack(&queue, req.tag).await?;
    Ok(())
}

pub async fn nack(
    State(state): State<Arc<AppState>>,
    Path(queue): Path<String>,
    Json(req): Json<NackRequest>,
) -> AppResult<()> {
    state.broker.nack(&queue, req.tag, req.requeue).await?;
    Ok(())
}

pub async fn purge(State(state): State<Arc<AppState>>, Path(queue): Path<String>) -> AppResult<Json<PurgeResponse>> {
    let purged = state.broker.purge(&queue).await?;
    Ok(Json(PurgeResponse { purged }))
}

#[derive(Serialize)]
pub struct QueueDepth {
    pub queue: String,
    pub ready: u64,
    pub leased: u64,
}

pub async fn depth(State(state): State<Arc<AppState>>, Path(queue): Path<String>) -> AppResult<Json<QueueDepth>> {
    let (ready, leased) = state.broker.depth(&queue).await?;
    Ok(Json(QueueDepth { queue, ready, leased }))
}
