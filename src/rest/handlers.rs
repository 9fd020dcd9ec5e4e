use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::header,
    response::{Html, IntoResponse, Json, Response},
};
use tracing::{error, info};

use crate::common::{ApiMessage, Error, Result};
use crate::rest::AppState;
use crate::rest::models::AppendRequest;

pub async fn index() -> Html<&'static str> {
    Html(include_str!("../../static/index.html"))
}

pub async fn create_stream(State(state): State<Arc<AppState>>) -> Result<String> {
    let id = state.registry.create()?;
    Ok(format!("{}\n", id))
}

pub async fn append_stream(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<ApiMessage>> {
    // Existence first: an unknown id is 404 even when the body is junk.
    let stream = state.registry.checkout(&id)?;

    let filename = serde_json::from_slice::<AppendRequest>(&body)
        .ok()
        .and_then(|req| req.filename)
        .ok_or_else(|| Error::InvalidInput("Invalid query".to_string()))?;

    info!("stream {}: appending {}", id, filename);
    stream.lock().append(&filename, 0.0);
    Ok(Json(ApiMessage::ok(format!("Appended file {}", filename))))
}

pub async fn advance_stream(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Response> {
    let stream = state.registry.checkout(&id)?;
    let seconds = state.config.stream.advance_seconds;

    // The advance blocks on subprocess output; keep it off the I/O threads.
    let result = tokio::task::spawn_blocking(move || {
        let mut sink = Vec::new();
        stream.lock().advance(seconds, &mut sink).map(|_| sink)
    })
    .await;

    match result {
        Ok(Ok(sink)) => Ok(([(header::CONTENT_TYPE, "audio/webm")], sink).into_response()),
        Ok(Err(e)) => Err(e),
        Err(join_err) => {
            error!("advance task for stream {} panicked: {}", id, join_err);
            Err(Error::Subprocess("advance task failed".to_string()))
        }
    }
}

pub async fn destroy_stream(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiMessage>> {
    state.registry.destroy(&id)?;
    Ok(Json(ApiMessage::ok("Stream successfully erased")))
}
