//! HTTP request handlers
//!
//! Queue administration and status reporting.

use crate::api::server::AppContext;
use crate::broadcast::ListenerInfo;
use crate::error::Error;
use crate::playback::{Placement, QueueItem};
use crate::state::{NowPlaying, PlaybackState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    path: String,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    status: String,
    id: Uuid,
    /// Index at response time; None if the scheduler already took it
    position: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    queue: Vec<QueueEntryInfo>,
}

#[derive(Debug, Serialize)]
pub struct QueueEntryInfo {
    index: usize,
    id: Uuid,
    path: String,
}

impl QueueEntryInfo {
    fn new(index: usize, item: &QueueItem) -> Self {
        Self {
            index,
            id: item.id,
            path: item.path.to_string_lossy().into_owned(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RemoveResponse {
    removed: QueueEntryInfo,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    cleared: usize,
}

#[derive(Debug, Serialize)]
pub struct StationStatus {
    state: PlaybackState,
    now_playing: Option<NowPlaying>,
    queue_length: usize,
    listeners: usize,
    replay_chunks: usize,
    replay_capacity: usize,
    replay_bytes: usize,
    chunks_broadcast: u64,
}

#[derive(Debug, Serialize)]
pub struct ListenersResponse {
    listeners: Vec<ListenerInfo>,
}

type ApiError = (StatusCode, Json<StatusResponse>);

pub(crate) fn error_response(e: Error) -> ApiError {
    let code = match &e {
        Error::Ingestion(_) => StatusCode::BAD_REQUEST,
        Error::OutOfRange { .. } | Error::EmptyQueue => StatusCode::NOT_FOUND,
        Error::Listener(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (code, Json(StatusResponse::new(e.to_string())))
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "onair-caster".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Queue Endpoints
// ============================================================================

/// GET /queue
pub async fn get_queue(State(ctx): State<AppContext>) -> Json<QueueResponse> {
    let snapshot = ctx.engine.queue().list();
    Json(QueueResponse {
        queue: snapshot
            .iter()
            .map(|(index, item)| QueueEntryInfo::new(index, item))
            .collect(),
    })
}

/// POST /queue
pub async fn enqueue(
    State(ctx): State<AppContext>,
    Json(req): Json<EnqueueRequest>,
) -> Result<Json<EnqueueResponse>, ApiError> {
    ingest(&ctx, req.path, Placement::Back).await
}

/// POST /queue/play-next
pub async fn play_next(
    State(ctx): State<AppContext>,
    Json(req): Json<EnqueueRequest>,
) -> Result<Json<EnqueueResponse>, ApiError> {
    ingest(&ctx, req.path, Placement::Next).await
}

async fn ingest(
    ctx: &AppContext,
    path: String,
    placement: Placement,
) -> Result<Json<EnqueueResponse>, ApiError> {
    let item = ctx.engine.ingest(path, placement).await.map_err(|e| {
        warn!("Rejected enqueue: {}", e);
        error_response(e)
    })?;

    let position = ctx
        .engine
        .queue()
        .list()
        .iter()
        .find(|(_, queued)| queued.id == item.id)
        .map(|(index, _)| index);

    Ok(Json(EnqueueResponse {
        status: "queued".to_string(),
        id: item.id,
        position,
    }))
}

/// DELETE /queue/:index
pub async fn remove_from_queue(
    State(ctx): State<AppContext>,
    Path(index): Path<usize>,
) -> Result<Json<RemoveResponse>, ApiError> {
    let item = ctx.engine.queue().remove(index).map_err(error_response)?;
    Ok(Json(RemoveResponse {
        removed: QueueEntryInfo::new(index, &item),
    }))
}

/// POST /queue/clear
pub async fn clear_queue(State(ctx): State<AppContext>) -> Json<ClearResponse> {
    let cleared = ctx.engine.queue().clear();
    info!("Queue cleared via API");
    Json(ClearResponse { cleared })
}

// ============================================================================
// Status Endpoints
// ============================================================================

/// GET /status
pub async fn get_status(State(ctx): State<AppContext>) -> Json<StationStatus> {
    let engine = &ctx.engine;
    Json(StationStatus {
        state: engine.state().playback_state(),
        now_playing: engine.state().now_playing().await,
        queue_length: engine.queue().len(),
        listeners: engine.hub().listener_count(),
        replay_chunks: engine.hub().replay_len(),
        replay_capacity: engine.hub().replay_capacity(),
        replay_bytes: engine.hub().replay_bytes(),
        chunks_broadcast: engine.hub().chunks_broadcast(),
    })
}

/// GET /listeners
pub async fn get_listeners(State(ctx): State<AppContext>) -> Json<ListenersResponse> {
    Json(ListenersResponse {
        listeners: ctx.engine.hub().listeners(),
    })
}
