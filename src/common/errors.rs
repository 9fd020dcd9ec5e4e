use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

/// Crate-wide error type.
#[derive(Debug)]
pub enum Error {
    /// Bad client input (unsupported sample format, malformed JSON, missing
    /// field). Maps to HTTP 400.
    InvalidInput(String),
    /// Unknown stream id. Maps to HTTP 404.
    NotFound(String),
    /// Failure while spawning or talking to an external tool.
    Subprocess(String),
    /// Opus encoder construction or control failure.
    Encoder(audiopus::Error),
    Io(std::io::Error),
    Json(serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidInput(msg) => f.write_str(msg),
            Error::NotFound(msg) => f.write_str(msg),
            Error::Subprocess(msg) => f.write_str(msg),
            Error::Encoder(e) => write!(f, "opus encoder error: {}", e),
            Error::Io(e) => write!(f, "i/o error: {}", e),
            Error::Json(e) => write!(f, "json error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Encoder(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<audiopus::Error> for Error {
    fn from(e: audiopus::Error) -> Self {
        Error::Encoder(e)
    }
}

/// JSON envelope for API responses: `{"status": "...", "msg": "..."}`.
#[derive(Debug, Serialize)]
pub struct ApiMessage {
    pub status: &'static str,
    pub msg: String,
}

impl ApiMessage {
    pub fn ok(msg: impl Into<String>) -> Self {
        Self {
            status: "ok",
            msg: msg.into(),
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error",
            msg: msg.into(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (code, msg) = match &self {
            Error::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            _ => {
                tracing::error!("request failed: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (code, Json(ApiMessage::error(msg))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelope_shape() {
        let body = serde_json::to_string(&ApiMessage::error("Stream id \"deadbeef\" not found"))
            .unwrap();
        assert_eq!(
            body,
            "{\"status\":\"error\",\"msg\":\"Stream id \\\"deadbeef\\\" not found\"}"
        );
    }

    #[test]
    fn ok_envelope_shape() {
        let body = serde_json::to_string(&ApiMessage::ok("Appended file a.flac")).unwrap();
        assert_eq!(body, "{\"status\":\"ok\",\"msg\":\"Appended file a.flac\"}");
    }
}
