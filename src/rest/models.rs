use serde::Deserialize;

/// Body of `POST /stream/{id}/append`.
#[derive(Debug, Deserialize)]
pub struct AppendRequest {
    pub filename: Option<String>,
}
