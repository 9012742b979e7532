//! Structured results returned by the model, one schema per task kind.
//!
//! Decoding is strict: every field is required, unknown fields are rejected
//! and types must match exactly. Nothing is coerced.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::analysis::prompts::{
    ATS_SCORE_PROMPT_TEMPLATE, ATS_SCORE_SYSTEM, FIT_ANALYSIS_PROMPT_TEMPLATE, FIT_ANALYSIS_SYSTEM,
};
use crate::llm_client::prompts::render_template;
use crate::llm_client::Prompt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    FitAnalysis,
    AtsScore,
}

impl TaskKind {
    /// Separates cache keys and rate-limit records between the pipelines.
    pub fn namespace(self) -> &'static str {
        match self {
            TaskKind::FitAnalysis => "fit_analysis",
            TaskKind::AtsScore => "ats_score",
        }
    }
}

/// A task the pipeline can run: its prompt and its result schema.
pub trait AnalysisTask:
    Serialize + DeserializeOwned + Clone + Send + Sync + std::fmt::Debug + 'static
{
    const KIND: TaskKind;
    const SYSTEM_PROMPT: &'static str;
    /// Template with `{resume_text}` and `{jd_text}` placeholders.
    const PROMPT_TEMPLATE: &'static str;

    fn prompt(document_text: &str, task_text: &str) -> Prompt {
        Prompt {
            system: Self::SYSTEM_PROMPT,
            user: render_template(
                Self::PROMPT_TEMPLATE,
                &[("resume_text", document_text), ("jd_text", task_text)],
            ),
        }
    }

    /// Checks beyond what the type system expresses. Returns a description
    /// of the first violation.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Résumé-versus-job fit analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FitAnalysis {
    /// Free-form as produced by the model, e.g. "72%".
    pub match_percentage: String,
    pub missing_skills: Vec<String>,
    pub strengths: Vec<String>,
    pub roadmap: Vec<String>,
    pub resume_rewrite: String,
}

impl AnalysisTask for FitAnalysis {
    const KIND: TaskKind = TaskKind::FitAnalysis;
    const SYSTEM_PROMPT: &'static str = FIT_ANALYSIS_SYSTEM;
    const PROMPT_TEMPLATE: &'static str = FIT_ANALYSIS_PROMPT_TEMPLATE;
}

/// ATS-style keyword coverage and score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AtsScore {
    pub ats_score: f64,
    pub keyword_match: Vec<String>,
    pub missing_keywords: Vec<String>,
    pub suggestions: Vec<String>,
    pub summary: String,
}

impl AnalysisTask for AtsScore {
    const KIND: TaskKind = TaskKind::AtsScore;
    const SYSTEM_PROMPT: &'static str = ATS_SCORE_SYSTEM;
    const PROMPT_TEMPLATE: &'static str = ATS_SCORE_PROMPT_TEMPLATE;

    fn validate(&self) -> Result<(), String> {
        if !self.ats_score.is_finite() || !(0.0..=100.0).contains(&self.ats_score) {
            return Err(format!("atsScore must be between 0 and 100, got {}", self.ats_score));
        }
        Ok(())
    }
}
