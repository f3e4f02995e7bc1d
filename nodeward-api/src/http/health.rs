//! Liveness endpoint
//!
//! Anonymous, so orchestrator probes need no credentials.

use axum::{response::IntoResponse, routing::get, Json, Router};
use serde_json::json;

use super::AppState;

/// Ping router
pub fn create_health_router() -> Router<AppState> {
    Router::new().route("/ping", get(ping))
}

/// Always answers while the server is running
pub async fn ping() -> impl IntoResponse {
    Json(json!({ "message": "pong" }))
}
