use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use tracing::warn;

use crate::state::AppState;

/// GET /health
/// Returns a simple status object with service version.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": env!("CARGO_PKG_NAME")
    }))
}

/// GET /health/ready
/// Checks that the rate-limit log and the result cache are reachable.
pub async fn ready_handler(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let (fit_analysis, ats_score) = tokio::join!(state.fit_analysis.ready(), state.ats_score.ready());

    match fit_analysis.and(ats_score) {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(e) => {
            warn!("Readiness check failed: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "error": e.to_string() })),
            )
        }
    }
}
