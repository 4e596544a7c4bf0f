//! Listener endpoint
//!
//! `GET /stream.mp3` joins the hub and streams the replay buffer followed by
//! live chunks until the client disconnects. The response body owns the
//! subscription, so dropping the connection leaves the hub.

use crate::api::handlers::error_response;
use crate::api::server::AppContext;
use crate::error::Error;
use axum::{
    body::Body,
    extract::State,
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE, PRAGMA},
        HeaderName, HeaderValue,
    },
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use std::convert::Infallible;
use tracing::warn;

const ICY_NAME: HeaderName = HeaderName::from_static("icy-name");
const ICY_GENRE: HeaderName = HeaderName::from_static("icy-genre");

/// GET /stream.mp3
pub async fn listen(State(ctx): State<AppContext>) -> Response {
    let subscription = match ctx.engine.hub().subscribe() {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!("Listener could not join: {}", e);
            return error_response(Error::from(e)).into_response();
        }
    };

    let body = Body::from_stream(subscription.into_stream().map(Ok::<_, Infallible>));

    (
        [
            (CONTENT_TYPE, HeaderValue::from_static("audio/mpeg")),
            (CACHE_CONTROL, HeaderValue::from_static("no-cache, must-revalidate")),
            (PRAGMA, HeaderValue::from_static("no-cache")),
            (ICY_NAME, header_text(&ctx.station.name)),
            (ICY_GENRE, header_text(&ctx.station.genre)),
        ],
        body,
    )
        .into_response()
}

/// Station text as a header value; non-visible-ASCII characters are dropped
fn header_text(text: &str) -> HeaderValue {
    let cleaned: String = text.chars().filter(|c| c.is_ascii_graphic() || *c == ' ').collect();
    HeaderValue::from_str(&cleaned).unwrap_or_else(|_| HeaderValue::from_static(""))
}
