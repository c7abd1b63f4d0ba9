//! Aggregate statistics and liveness.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use super::AppState;
use crate::errors::RecorderError;
use crate::views::PortStats;

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> Result<Json<PortStats>, RecorderError> {
    let stats = state.database.stats().await?;
    Ok(Json(stats))
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
