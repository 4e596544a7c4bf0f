//! HTTP server setup and routing

use crate::error::{Error, Result};
use crate::playback::BroadcastEngine;
use axum::{
    routing::{delete, get, post},
    Router,
};
use onair_common::StationConfig;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Station identity advertised to listeners
#[derive(Debug, Clone)]
pub struct StationInfo {
    pub name: String,
    pub genre: String,
}

impl StationInfo {
    pub fn from_config(config: &StationConfig) -> Self {
        Self {
            name: config.station_name.clone(),
            genre: config.station_genre.clone(),
        }
    }
}

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub engine: Arc<BroadcastEngine>,
    pub station: Arc<StationInfo>,
}

impl AppContext {
    pub fn new(engine: Arc<BroadcastEngine>, station: StationInfo) -> Self {
        Self {
            engine,
            station: Arc::new(station),
        }
    }
}

/// Build the router with every route attached
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(super::handlers::health))
        // Listening
        .route("/stream.mp3", get(super::stream::listen))
        // Queue administration
        .route("/queue", get(super::handlers::get_queue))
        .route("/queue", post(super::handlers::enqueue))
        .route("/queue/play-next", post(super::handlers::play_next))
        .route("/queue/clear", post(super::handlers::clear_queue))
        .route("/queue/:index", delete(super::handlers::remove_from_queue))
        // Status
        .route("/status", get(super::handlers::get_status))
        .route("/listeners", get(super::handlers::get_listeners))
        .route("/events", get(super::sse::event_stream))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve until `shutdown` resolves
///
/// `shutdown` should stop the engine before resolving: open audio streams
/// only end once their outboxes are closed.
pub async fn run<F>(config: &StationConfig, ctx: AppContext, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(ctx);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;
    info!("Listening on http://{}/stream.mp3", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}
