//! Turns raw model text into a typed result.
//!
//! Only code-fence wrappers around the payload are removed. Anything else
//! that does not decode into the task schema is rejected along with the
//! cleaned text, so a bad response is visible rather than patched over.

use thiserror::Error;

use crate::analysis::schema::AnalysisTask;

/// Upper bound on raw text echoed back in diagnostics.
const MAX_DIAGNOSTIC_CHARS: usize = 4000;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("model returned no output")]
    EmptyOutput,

    #[error("model output does not match the expected schema: {reason}")]
    MalformedJson { reason: String, raw: String },
}

/// Parses raw model output into `T`.
pub fn parse_output<T: AnalysisTask>(raw: &str) -> Result<T, ParseError> {
    if raw.trim().is_empty() {
        return Err(ParseError::EmptyOutput);
    }

    let cleaned = strip_code_fences(raw);
    if cleaned.is_empty() {
        return Err(ParseError::EmptyOutput);
    }

    let parsed: T = serde_json::from_str(cleaned).map_err(|e| ParseError::MalformedJson {
        reason: e.to_string(),
        raw: truncate_chars(cleaned, MAX_DIAGNOSTIC_CHARS),
    })?;

    parsed.validate().map_err(|reason| ParseError::MalformedJson {
        reason,
        raw: truncate_chars(cleaned, MAX_DIAGNOSTIC_CHARS),
    })?;

    Ok(parsed)
}

/// Strips a leading ```` ``` ```` fence (with optional language tag) and a
/// trailing ```` ``` ```` fence from model output.
pub fn strip_code_fences(text: &str) -> &str {
    let mut body = text.trim();

    if let Some(after) = body.strip_prefix("```") {
        let tagless = after
            .trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        body = if tagless.trim_start().starts_with(['{', '[']) {
            tagless
        } else {
            after
        };
        body = body.trim();
    }

    if let Some(before) = body.strip_suffix("```") {
        body = before.trim();
    }

    body
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
