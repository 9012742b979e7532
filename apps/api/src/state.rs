use std::sync::Arc;

use crate::analysis::pipeline::Pipeline;
use crate::analysis::schema::{AtsScore, FitAnalysis};
use crate::config::Config;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub fit_analysis: Arc<Pipeline<FitAnalysis>>,
    pub ats_score: Arc<Pipeline<AtsScore>>,
}
