pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::analysis::handlers;
use crate::state::AppState;

/// Multipart framing on top of the document itself.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes + FORM_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/health/ready", get(health::ready_handler))
        // Analysis API
        .route("/api/v1/ai/analyze", post(handlers::handle_analyze))
        .route(
            "/api/v1/ai/check-ats-score",
            post(handlers::handle_check_ats_score),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
