// Prompt constants for the analysis pipelines.
// Placeholders are filled by `llm_client::prompts::render_template`.

/// System prompt for fit analysis. Enforces JSON-only output.
pub const FIT_ANALYSIS_SYSTEM: &str = "You are an expert technical recruiter and career coach. \
    Compare a candidate's resume against a job description. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Fit analysis prompt template. Replace `{resume_text}` and `{jd_text}`.
pub const FIT_ANALYSIS_PROMPT_TEMPLATE: &str = r#"Compare the resume against the job description.

Return a JSON object with this EXACT schema (no extra fields):
{
  "matchPercentage": "72%",
  "missingSkills": ["Kubernetes"],
  "strengths": ["5 years of production Go"],
  "roadmap": ["Deploy a side project on Kubernetes"],
  "resumeRewrite": "A rewritten resume summary tailored to this role"
}

Rules:
- matchPercentage is a string holding a whole-number percentage followed by "%".
- missingSkills lists skills the job requires that the resume does not show.
- strengths lists resume evidence that directly supports the job's requirements.
- roadmap is an ordered list of concrete steps to close the missing skills.
- resumeRewrite uses ONLY facts present in the resume. Do NOT invent experience.

RESUME:
{resume_text}

JOB DESCRIPTION:
{jd_text}"#;

/// System prompt for ATS scoring. Enforces JSON-only output.
pub const ATS_SCORE_SYSTEM: &str = "You are an applicant tracking system (ATS) engine. \
    Score how well a resume would pass automated keyword screening for a job description. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// ATS scoring prompt template. Replace `{resume_text}` and `{jd_text}`.
pub const ATS_SCORE_PROMPT_TEMPLATE: &str = r#"You are an ATS engine. Compare the resume against the job description.

Return a JSON object with this EXACT schema (no extra fields):
{
  "atsScore": 0,
  "keywordMatch": ["Go"],
  "missingKeywords": ["Kubernetes"],
  "suggestions": ["Mention container orchestration experience explicitly"],
  "summary": "One paragraph overall assessment"
}

Rules:
- atsScore is a number from 0 to 100.
- keywordMatch lists job-description keywords found in the resume.
- missingKeywords lists job-description keywords absent from the resume.
- suggestions are concrete edits that would raise the score without inventing experience.

RESUME:
{resume_text}

JOB DESCRIPTION:
{jd_text}"#;
