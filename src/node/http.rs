//! Node HTTP status API

use axum::{extract::State, response::IntoResponse, routing::get, Router};
use serde_json::json;
use std::sync::Arc;

use crate::common::metrics::metrics;
use crate::node::locks::LockTable;
use crate::node::store::ShardStore;

/// Shared node state for HTTP handlers.
#[derive(Clone)]
pub struct NodeState {
    pub store: Arc<ShardStore>,
    pub locks: Arc<LockTable>,
    pub node_index: u32,
}

async fn health() -> &'static str {
    "ok"
}

async fn status(State(state): State<NodeState>) -> impl IntoResponse {
    axum::Json(json!({
        "role": "node",
        "version": crate::VERSION,
        "node_index": state.node_index,
        "keys": state.store.len(),
        "locks": state.locks.stats(),
        "metrics": metrics().snapshot(),
    }))
}

pub fn create_router(state: NodeState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .with_state(state)
}
