//! Router configuration for the web transport.

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::ws::chat_ws_handler;
use crate::chat::ChatHub;

/// Create the chat router.
pub fn create_router(hub: Arc<ChatHub>) -> Router {
    Router::new()
        .route("/ws", get(chat_ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(hub)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}
