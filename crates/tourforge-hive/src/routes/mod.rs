pub mod instances;
pub mod nodes;
pub mod queues;
pub mod runs;
pub mod system;

use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

pub fn system_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(system::root))
        .route("/health", get(system::health))
}

pub fn run_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/instances", get(instances::list))
        .route("/runs", post(runs::start))
        .route("/runs/latest", get(runs::latest))
}

pub fn queue_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/queues/{queue}", get(queues::depth))
        .route("/queues/{queue}/publish", post(queues::publish))
        .route("/queues/{queue}/fetch", post(queues::fetch))
        .route("/queues/{queue}/ack", post(queues::ack))
        .route("/queues/{queue}/nack", post(queues::nack))
        .route("/queues/{queue}/purge", post(queues::purge))
}

pub fn node_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/nodes", get(nodes::list))
        .route("/nodes/register", post(nodes::register_node))
}

pub fn app(state: Arc<AppState>) -> Router {
    system_routes()
        .merge(run_routes())
        .merge(queue_routes())
        .merge(node_routes())
        .with_state(state)
}
