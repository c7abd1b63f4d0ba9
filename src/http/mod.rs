//! HTTP surface of the berth recorder.
//!
//! Write endpoints (`POST /arrivals`, `POST /departures`) pass the rate
//! limiter before any other work; both the allow and the deny path carry
//! `X-RateLimit-*` headers. Read endpoints are plain projections.

pub mod boats;
pub mod movements;
pub mod server;
pub mod stats;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{async_trait, Json};
use chrono::SecondsFormat;
use serde_json::json;
use tracing::warn;

use crate::audit::Actor;
use crate::database::Database;
use crate::ledger::Ledger;
use crate::ratelimit::{RateLimitDecision, RateLimiter};

pub use server::{build_router, HttpServer};

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub ledger: Ledger,
    pub database: Database,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(database: Database, limiter: Arc<RateLimiter>) -> Self {
        Self {
            ledger: Ledger::new(database.clone()),
            database,
            limiter,
        }
    }
}

/// Client network identity: the first `x-forwarded-for` hop when present,
/// otherwise the socket peer address.
fn client_ip(headers: &HeaderMap, extensions: &axum::http::Extensions) -> Option<String> {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Actor {
            ip_address: client_ip(&parts.headers, &parts.extensions),
            user_agent: parts
                .headers
                .get(header::USER_AGENT)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
        })
    }
}

/// Rate limit middleware for the write endpoints
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let client_key = client_ip(request.headers(), request.extensions())
        .unwrap_or_else(|| "unknown".to_string());
    let decision = state.limiter.check(&client_key);

    if !decision.allowed {
        warn!(client_key = %client_key, "Request rejected by rate limiter");
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "Too many requests, please retry later" })),
        )
            .into_response();
        apply_rate_limit_headers(&mut response, &decision);
        return response;
    }

    let mut response = next.run(request).await;
    apply_rate_limit_headers(&mut response, &decision);
    response
}

fn apply_rate_limit_headers(response: &mut Response, decision: &RateLimitDecision) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("x-ratelimit-limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", value);
    }
    let reset = decision.reset_at.to_rfc3339_opts(SecondsFormat::Secs, true);
    if let Ok(value) = HeaderValue::from_str(&reset) {
        headers.insert("x-ratelimit-reset", value);
    }
}
