//! Coordinator HTTP status API

use axum::{extract::State, response::IntoResponse, routing::get, Router};
use serde_json::json;
use std::sync::Arc;

use crate::common::metrics::metrics;
use crate::coordinator::manager::TxnManager;

/// Shared coordinator state for HTTP handlers.
#[derive(Clone)]
pub struct CoordState {
    pub manager: Arc<TxnManager>,
}

async fn health() -> &'static str {
    "ok"
}

async fn status(State(state): State<CoordState>) -> impl IntoResponse {
    axum::Json(json!({
        "role": "coordinator",
        "version": crate::VERSION,
        "nodes": state.manager.node_count(),
        "history_len": state.manager.history_len().await,
        "live_txns": state.manager.live_count(),
        "last_ts": state.manager.last_timestamp(),
        "metrics": metrics().snapshot(),
    }))
}

pub fn create_router(state: CoordState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .with_state(state)
}
