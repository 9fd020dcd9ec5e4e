pub mod handlers;
pub mod models;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::config::Config;
use crate::stream::registry::Registry;

pub struct AppState {
    pub registry: Registry,
    pub config: Config,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/index.html", get(handlers::index))
        .route("/stream/create", post(handlers::create_stream))
        .route("/stream/{id}/append", post(handlers::append_stream))
        .route("/stream/{id}/advance", post(handlers::advance_stream))
        .route("/stream/{id}/destroy", post(handlers::destroy_stream))
        .with_state(state)
}
