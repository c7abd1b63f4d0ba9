//! HTTP server wiring all routes together.

use std::net::SocketAddr;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::{boats, movements, rate_limit, stats, AppState};
use crate::config::HttpConfig;
use crate::errors::RecorderError;

pub struct HttpServer {
    addr: String,
    router: Router,
}

impl HttpServer {
    pub fn new(config: &HttpConfig, state: AppState) -> Self {
        Self {
            addr: config.socket_addr(),
            router: build_router(state),
        }
    }

    /// The underlying router, for driving requests in tests
    pub fn router(self) -> Router {
        self.router
    }

    /// Bind and serve until the task is cancelled
    pub async fn start(self) -> Result<(), RecorderError> {
        let listener = TcpListener::bind(&self.addr).await?;
        info!("HTTP server listening on {}", listener.local_addr()?);
        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
        Ok(())
    }
}

/// Build the application router.
///
/// Only the two write endpoints sit behind the rate limiter.
pub fn build_router(state: AppState) -> Router {
    let write_routes = Router::new()
        .route("/arrivals", post(movements::record_arrival))
        .route("/departures", post(movements::record_departure))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    let read_routes = Router::new()
        .route("/health", get(stats::health))
        .route("/boats/current", get(boats::current_boats))
        .route("/boats/history", get(boats::history))
        .route("/boats/search", get(boats::search))
        .route("/boats/:serial_number", get(boats::boat_detail))
        .route("/movements", get(movements::journal))
        .route("/movements/export", get(movements::export_csv))
        .route("/stats", get(stats::stats));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(write_routes)
        .merge(read_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
