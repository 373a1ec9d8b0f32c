use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

use crate::handlers::{chat_handler, health_handler, metrics_handler};
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
