use axum::{Json, extract::State, response::IntoResponse};
use std::sync::Arc;

use crate::state::AppState;

// liveness plus a glance at how much of the budget is gone
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let config = state.admission.config();
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "upstream_configured": state.upstream_tx.is_some(),
        "estimated_spend": state.admission.total_spend(),
        "spend_cap": config.daily_spend_cap,
        "tracked_clients": state.admission.tracked_clients(),
    }))
}
