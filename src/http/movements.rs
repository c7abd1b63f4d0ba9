//! Write endpoints and the movement journal.

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::audit::Actor;
use crate::errors::{FieldError, RecorderError};
use crate::models::{
    ArrivalRequest, Boat, DepartureRequest, Movement, MovementKind, MovementSource,
};
use crate::views::{movements_to_csv, JournalFilter, MovementPage};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Result of a successful arrival or departure
#[derive(Debug, Serialize)]
pub struct MutationResponse {
    pub boat: Boat,
    pub movement: Movement,
}

/// POST /arrivals
pub async fn record_arrival(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<ArrivalRequest>,
) -> Result<impl IntoResponse, RecorderError> {
    let arrival = body.validate()?;
    let (boat, movement) = state.ledger.record_arrival(arrival, actor).await?;
    Ok((StatusCode::CREATED, Json(MutationResponse { boat, movement })))
}

/// POST /departures
pub async fn record_departure(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<DepartureRequest>,
) -> Result<Json<MutationResponse>, RecorderError> {
    let departure = body.validate()?;
    let (boat, movement) = state.ledger.record_departure(departure, actor).await?;
    Ok(Json(MutationResponse { boat, movement }))
}

/// Raw journal/export query parameters, prior to validation
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalParams {
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub query: Option<String>,
    pub berth: Option<String>,
    pub source: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl JournalParams {
    /// Validate all filters, reporting every failing parameter.
    pub fn validate(self) -> Result<(JournalFilter, u32, u32), RecorderError> {
        let mut errors = Vec::new();

        let date_from = parse_timestamp(&mut errors, "dateFrom", self.date_from);
        let date_to = parse_timestamp(&mut errors, "dateTo", self.date_to);

        let source = match non_empty(self.source) {
            Some(raw) => match raw.parse::<MovementSource>() {
                Ok(source) => Some(source),
                Err(message) => {
                    errors.push(FieldError::new("source", message));
                    None
                }
            },
            None => None,
        };

        let kind = match non_empty(self.kind) {
            Some(raw) => match raw.parse::<MovementKind>() {
                Ok(kind) => Some(kind),
                Err(message) => {
                    errors.push(FieldError::new("type", message));
                    None
                }
            },
            None => None,
        };

        let page = self.page.unwrap_or(1);
        if page == 0 {
            errors.push(FieldError::new("page", "page must be at least 1"));
        }

        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if limit == 0 || limit > MAX_PAGE_SIZE {
            errors.push(FieldError::new(
                "limit",
                format!("limit must be between 1 and {MAX_PAGE_SIZE}"),
            ));
        }

        RecorderError::from_field_errors(errors)?;

        Ok((
            JournalFilter {
                date_from,
                date_to,
                query: non_empty(self.query),
                berth: non_empty(self.berth),
                source,
                kind,
            },
            page,
            limit,
        ))
    }
}

/// GET /movements
pub async fn journal(
    State(state): State<AppState>,
    Query(params): Query<JournalParams>,
) -> Result<Json<MovementPage>, RecorderError> {
    let (filter, page, limit) = params.validate()?;
    let page = state.database.journal(&filter, page, limit).await?;
    Ok(Json(page))
}

/// GET /movements/export
pub async fn export_csv(
    State(state): State<AppState>,
    Query(params): Query<JournalParams>,
) -> Result<impl IntoResponse, RecorderError> {
    // Same filter set as the journal; pagination does not apply.
    let (filter, _, _) = params.validate()?;
    let movements = state.database.movements_matching(&filter).await?;
    let csv = movements_to_csv(&movements);

    let filename = format!("movements_{}.csv", Utc::now().format("%Y-%m-%d"));
    Ok((
        [
            (
                header::CONTENT_TYPE,
                "text/csv; charset=utf-8".to_string(),
            ),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        csv,
    ))
}

fn parse_timestamp(
    errors: &mut Vec<FieldError>,
    field: &str,
    value: Option<String>,
) -> Option<DateTime<Utc>> {
    let raw = non_empty(value)?;
    match DateTime::parse_from_rfc3339(&raw) {
        Ok(instant) => Some(instant.with_timezone(&Utc)),
        Err(_) => {
            errors.push(FieldError::new(
                field,
                format!("{field} must be an RFC 3339 timestamp"),
            ));
            None
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
