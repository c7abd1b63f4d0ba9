//! Berth recorder service

use std::sync::Arc;

use tokio::signal;
use tracing::info;

use berth_recorder::config::AppConfig;
use berth_recorder::database::Database;
use berth_recorder::errors::RecorderError;
use berth_recorder::http::{AppState, HttpServer};
use berth_recorder::ratelimit::RateLimiter;

#[tokio::main]
async fn main() -> Result<(), RecorderError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load configuration, preferring environment variables over config files
    let config = AppConfig::load()?;

    let db = Database::from_url(&config.database.url).await?;

    let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone())?);
    let _sweeper = Arc::clone(&limiter).spawn_sweeper();

    let state = AppState::new(db, limiter);
    let server = HttpServer::new(&config.http, state);

    // Setup signal handling for graceful shutdown
    let shutdown_signal = signal::ctrl_c();

    tokio::select! {
        result = server.start() => {
            info!("HTTP server stopped: {:?}", result);
        }
        _ = shutdown_signal => {
            info!("Received shutdown signal");
        }
    }

    Ok(())
}
