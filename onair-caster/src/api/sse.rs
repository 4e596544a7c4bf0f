//! Server-Sent Events (SSE) broadcaster
//!
//! Streams engine events to connected clients until shutdown.

use crate::api::server::AppContext;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

/// GET /events
pub async fn event_stream(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("New SSE client connected");

    let rx = ctx.engine.state().subscribe_events();

    let stream = BroadcastStream::new(rx)
        .filter_map(|result| async move {
            match result {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => Some(Ok(Event::default().event(event.event_type()).data(json))),
                    Err(e) => {
                        warn!("Failed to serialize event: {}", e);
                        None
                    }
                },
                Err(e) => {
                    // Lagged behind the bus; skip what was missed
                    warn!("SSE stream error: {:?}", e);
                    None
                }
            }
        })
        .take_until(ctx.engine.stopped());

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
