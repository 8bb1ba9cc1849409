//! Stream relay endpoint (`POST /api/generate`)

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use tracing::{debug, error, warn};

use super::AppState;
use crate::{
    error::{Result, VidChatError},
    messages::ChatRequest,
    protocol::frame,
    services::EventStream,
};

/// Relay a chat request to the backend and stream frames back
pub async fn generate(State(state): State<AppState>, body: Bytes) -> Response {
    match open_session(&state, &body).await {
        Ok(events) => event_stream_response(events),
        Err(e) => {
            if e.status_code() == StatusCode::BAD_REQUEST {
                warn!(error = %e, "Rejected chat request");
            } else {
                error!(error = %e, "Failed to open generation stream");
            }
            e.into_response()
        }
    }
}

async fn open_session(state: &AppState, body: &[u8]) -> Result<EventStream> {
    let request: ChatRequest = serde_json::from_slice(body)
        .map_err(|e| VidChatError::Validation(format!("Invalid chat request: {e}")))?;
    request.validate()?;

    let backend = state.backend()?;
    debug!(
        provider = backend.provider(),
        model = backend.model(),
        turns = request.contents.len(),
        media = request.inline_media_count(),
        "Opening generation stream"
    );

    backend.stream_generate(request).await
}

/// Wrap an event stream as a `text/event-stream` response
///
/// Each event is flushed as soon as the backend yields it. A backend error
/// after headers are sent aborts the body so the client sees the connection
/// drop rather than a clean end of stream.
fn event_stream_response(mut events: EventStream) -> Response {
    let frames = async_stream::stream! {
        let mut sent = 0usize;
        while let Some(item) = events.next().await {
            match item.and_then(|event| frame::encode_bytes(&event)) {
                Ok(bytes) => {
                    sent += 1;
                    yield Ok::<Bytes, std::io::Error>(bytes);
                }
                Err(e) => {
                    error!(error = %e, frames = sent, "Generation stream failed mid-flight");
                    yield Err(std::io::Error::other(e.to_string()));
                    return;
                }
            }
        }
        debug!(frames = sent, "Generation stream complete");
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}
