//! Axum route handlers for the Analysis API.

use std::convert::Infallible;
use std::net::SocketAddr;

use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, FromRequestParts, Multipart, State},
    http::{request::Parts, HeaderMap, HeaderName},
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use tracing::info;

use crate::analysis::extract::DocumentSource;
use crate::analysis::pipeline::{AnalysisInput, Pipeline};
use crate::analysis::schema::{AnalysisTask, AtsScore, FitAnalysis};
use crate::errors::AppError;
use crate::rate_limit::Admission;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct AnalysisResponse<T> {
    pub success: bool,
    pub cached: bool,
    pub data: T,
}

/// Identity used for rate limiting and cache scoping.
///
/// Taken from the configured requester header when one is trusted (the
/// upstream auth proxy must overwrite it), otherwise from the peer address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester(pub String);

#[async_trait]
impl FromRequestParts<AppState> for Requester {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Requester(resolve_requester(
            &parts.headers,
            peer,
            state.config.requester_header.as_ref(),
        )))
    }
}

const MAX_REQUESTER_LEN: usize = 256;

fn resolve_requester(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trusted_header: Option<&HeaderName>,
) -> String {
    let from_header = trusted_header
        .and_then(|name| headers.get(name))
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.len() <= MAX_REQUESTER_LEN);

    match (from_header, peer) {
        (Some(id), _) => id.to_string(),
        (None, Some(addr)) => format!("ip:{}", addr.ip()),
        (None, None) => "anonymous".to_string(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/ai/analyze
///
/// Fit analysis of a résumé against a job description.
pub async fn handle_analyze(
    State(state): State<AppState>,
    requester: Requester,
    multipart: Multipart,
) -> Result<Json<AnalysisResponse<FitAnalysis>>, AppError> {
    run_analysis(&state.fit_analysis, requester, multipart).await
}

/// POST /api/v1/ai/check-ats-score
///
/// ATS keyword score of a résumé against a job description.
pub async fn handle_check_ats_score(
    State(state): State<AppState>,
    requester: Requester,
    multipart: Multipart,
) -> Result<Json<AnalysisResponse<AtsScore>>, AppError> {
    run_analysis(&state.ats_score, requester, multipart).await
}

/// Admission happens before the multipart body is read.
async fn run_analysis<T: AnalysisTask>(
    pipeline: &Pipeline<T>,
    Requester(requester): Requester,
    multipart: Multipart,
) -> Result<Json<AnalysisResponse<T>>, AppError> {
    let admitted = match pipeline.admit(&requester).await? {
        Admission::Allowed(admitted) => admitted,
        Admission::Denied { retry_after } => return Err(AppError::RateLimited { retry_after }),
    };

    let input = read_analysis_form(multipart).await?;
    let outcome = pipeline.run(admitted, input).await?;

    info!(
        requester = %requester,
        task = T::KIND.namespace(),
        cached = outcome.cached,
        "Analysis complete"
    );

    Ok(Json(AnalysisResponse {
        success: true,
        cached: outcome.cached,
        data: outcome.payload,
    }))
}

/// Reads `jobDescription`, `isUrl` and `resume` in any order.
async fn read_analysis_form(mut multipart: Multipart) -> Result<AnalysisInput, AppError> {
    let mut job_description = String::new();
    let mut is_url = false;
    let mut resume: Option<Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid form data: {}", e.body_text())))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Invalid '{name}' field: {}", e.body_text())))?;

        match name.as_str() {
            "jobDescription" => job_description = field_text(&name, data)?,
            "isUrl" => is_url = field_text(&name, data)?.trim() == "true",
            "resume" => resume = Some(data),
            _ => {}
        }
    }

    let source = match resume {
        Some(data) if is_url => {
            let url = field_text("resume", data)?;
            let url = url.trim();
            if url.is_empty() {
                return Err(AppError::Validation("Resume URL is required".to_string()));
            }
            Some(DocumentSource::Url(url.to_string()))
        }
        Some(data) => Some(DocumentSource::Upload(data)),
        None => None,
    };

    Ok(AnalysisInput {
        task_text: job_description,
        source,
    })
}

fn field_text(name: &str, data: Bytes) -> Result<String, AppError> {
    String::from_utf8(data.to_vec())
        .map_err(|_| AppError::Validation(format!("'{name}' must be UTF-8 text")))
}
