//! Boat read views.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use super::AppState;
use crate::errors::{FieldError, RecorderError};
use crate::models::SerialNumber;
use crate::views::{BoatDetail, BoatWithMovement};

/// Search results are capped for autocomplete use.
pub const SEARCH_RESULT_LIMIT: usize = 10;

/// GET /boats/current
pub async fn current_boats(
    State(state): State<AppState>,
) -> Result<Json<Vec<BoatWithMovement>>, RecorderError> {
    let boats = state.database.current_boats().await?;
    Ok(Json(boats))
}

/// GET /boats/history
pub async fn history(
    State(state): State<AppState>,
) -> Result<Json<Vec<BoatDetail>>, RecorderError> {
    let boats = state.database.history().await?;
    Ok(Json(boats))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

/// GET /boats/search?q=...
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<BoatWithMovement>>, RecorderError> {
    let query = params.q.unwrap_or_default();
    if query.trim().is_empty() {
        return Err(RecorderError::Validation(vec![FieldError::new(
            "q",
            "search query is required",
        )]));
    }
    let boats = state.database.search_boats(&query, SEARCH_RESULT_LIMIT).await?;
    Ok(Json(boats))
}

/// GET /boats/{serialNumber}
pub async fn boat_detail(
    State(state): State<AppState>,
    Path(serial_number): Path<String>,
) -> Result<Json<BoatDetail>, RecorderError> {
    // A serial that cannot normalize cannot name a stored boat.
    let serial = SerialNumber::normalize(&serial_number)
        .map_err(|_| RecorderError::BoatNotFound)?;
    let detail = state
        .database
        .boat_detail(&serial)
        .await?
        .ok_or(RecorderError::BoatNotFound)?;
    Ok(Json(detail))
}
