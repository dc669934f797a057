//! Axum route handlers for the resume extraction API.

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::errors::AppError;
use crate::extraction::parser::parse_resume;
use crate::models::resume::ResumeOutput;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ParseResumeRequest {
    /// Optional so a missing field surfaces as this service's validation
    /// error instead of a framework deserialization rejection.
    #[serde(default)]
    pub raw_text: Option<String>,
}

/// POST /api/v1/resume/parse
///
/// Parses free-form resume text (or a JSON document carrying it) into the
/// structured four-section schema.
pub async fn handle_parse_resume(
    State(state): State<AppState>,
    Json(request): Json<ParseResumeRequest>,
) -> Result<Json<ResumeOutput>, AppError> {
    let raw_text = match request.raw_text.as_deref() {
        None => return Err(AppError::Validation("raw_text is required".to_string())),
        Some(text) if text.trim().is_empty() => {
            return Err(AppError::Validation("raw_text cannot be empty".to_string()))
        }
        Some(text) => text,
    };

    let output = parse_resume(raw_text, state.llm.as_ref()).await?;

    Ok(Json(output))
}
