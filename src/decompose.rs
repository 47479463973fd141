use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::constants;
use crate::gemini::{GeminiClient, ProviderEnvelope, ProviderError};
use crate::plan::{self, SchemaViolation, WeeklyPlan};

#[derive(Debug, Error)]
pub enum DecomposeError {
    #[error("Goal is required and must be a string")]
    InvalidInput,
    #[error("{0}")]
    ProviderBlocked(String),
    #[error("Failed to extract text from Gemini response.")]
    ProviderExtractionFailure,
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("Output was not valid JSON: {details}")]
    MalformedOutput { details: String, raw_output: String },
    #[error("Invalid data structure from AI: {0}")]
    SchemaViolation(#[from] SchemaViolation),
}

/// Pulls the goal out of a request body. Only a non-empty string is accepted.
pub fn goal_from_body(body: &Value) -> Result<&str, DecomposeError> {
    match body.get("goal") {
        Some(Value::String(goal)) if !goal.is_empty() => Ok(goal.as_str()),
        _ => Err(DecomposeError::InvalidInput),
    }
}

pub fn build_prompt(goal: &str) -> String {
    format!(
        "Decompose the following user goal into actionable weekly tasks for the next {weeks} weeks.\n\
         Provide the output as a valid JSON object with a single top-level key \"weeklyPlan\".\n\
         This key should map to an object where each key is a week identifier (e.g., \"week1\", \"week2\") \
         and its value is an array of task strings.\n\
         \n\
         Example output format:\n\
         {{\n  \"weeklyPlan\": {{\n    \"week1\": [\"Task A for week 1\", \"Task B for week 1\"],\n    \"week2\": [\"Task C for week 2\"]\n  }}\n}}\n\
         \n\
         User Goal: \"{goal}\"\n\
         \n\
         JSON Output:",
        weeks = constants::PLAN_WEEKS,
        goal = goal,
    )
}

/// Removes one markdown code fence around `text`, e.g. "```json\n{...}\n```".
///
/// Both the opening and the closing fence must be present; otherwise the
/// trimmed input is returned unchanged. A language tag is only recognised when
/// it fills the rest of the opening fence's line.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    else {
        return trimmed;
    };
    let body = match inner.split_once('\n') {
        Some((tag, body)) if tag.trim().chars().all(|c| c.is_ascii_alphanumeric()) => body,
        _ => inner,
    };
    body.trim()
}

/// Text of the completion, or the reason there is none.
pub fn extract_text(envelope: &ProviderEnvelope) -> Result<String, DecomposeError> {
    if let Some(text) = envelope.text() {
        return Ok(text);
    }
    error!(?envelope, "Unexpected response structure from Gemini");
    match envelope.block_reason() {
        Some(reason) => Err(DecomposeError::ProviderBlocked(reason)),
        None => Err(DecomposeError::ProviderExtractionFailure),
    }
}

/// Fence-strips, parses, and validates raw model output.
pub fn parse_plan(raw_output: &str) -> Result<WeeklyPlan, DecomposeError> {
    let cleaned = strip_code_fence(raw_output);
    let value: Value = serde_json::from_str(cleaned).map_err(|e| {
        error!(error = %e, raw_output, "Failed to parse JSON from Gemini output");
        DecomposeError::MalformedOutput {
            details: e.to_string(),
            raw_output: raw_output.to_string(),
        }
    })?;

    plan::validate(&value).map_err(|violation| {
        warn!(%violation, "Gemini output does not match the weekly plan schema");
        DecomposeError::from(violation)
    })
}

#[instrument(skip(client), fields(model = client.model()))]
pub async fn decompose_goal(client: &GeminiClient, goal: &str) -> Result<WeeklyPlan, DecomposeError> {
    info!("Received goal for decomposition");
    if goal.is_empty() {
        warn!("Rejecting empty goal");
        return Err(DecomposeError::InvalidInput);
    }

    let envelope = client.generate(&build_prompt(goal)).await?;
    let raw_output = extract_text(&envelope)?;
    info!(%raw_output, "Raw Gemini text output");

    let plan = parse_plan(&raw_output)?;
    info!(
        weeks = plan.weeks().len(),
        "Successfully decomposed goal and validated tasks"
    );
    Ok(plan)
}
