use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::analysis::parser::ParseError;
use crate::analysis::pipeline::PipelineError;
use crate::store::StoreError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rate limit exceeded, retry after {}s", retry_after_secs(.retry_after))]
    RateLimited { retry_after: Duration },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Whole seconds, rounded up so a client never retries too early.
fn retry_after_secs(retry_after: &Duration) -> u64 {
    let secs = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut raw: Option<String> = None;
        let mut retry_after: Option<u64> = None;

        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::RateLimited { retry_after: wait } => {
                let secs = retry_after_secs(wait);
                retry_after = Some(secs);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "RATE_LIMITED",
                    format!("Too many requests. Try again in {secs} seconds."),
                )
            }
            AppError::Pipeline(PipelineError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Pipeline(PipelineError::Extraction(e)) if e.is_unreadable() => {
                tracing::warn!("Unreadable document: {e}");
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "UNREADABLE_DOCUMENT",
                    "The resume could not be read as a PDF document".to_string(),
                )
            }
            AppError::Pipeline(PipelineError::Extraction(e)) => {
                (StatusCode::BAD_REQUEST, "EXTRACTION_ERROR", e.to_string())
            }
            AppError::Pipeline(PipelineError::Model(e)) => {
                tracing::error!("Model error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "MODEL_ERROR",
                    "The AI analysis service failed. Please try again.".to_string(),
                )
            }
            AppError::Pipeline(PipelineError::OutputParse(e)) => {
                tracing::error!("Malformed model output: {e}");
                if let ParseError::MalformedJson { raw: cleaned, .. } = e {
                    raw = Some(cleaned.clone());
                }
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "MALFORMED_OUTPUT",
                    "The AI returned a response that could not be parsed".to_string(),
                )
            }
            AppError::Pipeline(PipelineError::Store(e)) | AppError::Store(e) => {
                tracing::error!("Store error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Pipeline(PipelineError::Internal(msg)) => {
                tracing::error!("Internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let mut body = json!({
            "success": false,
            "code": code,
            "message": message,
        });
        if let Some(raw) = raw {
            body["raw"] = json!(raw);
        }

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
