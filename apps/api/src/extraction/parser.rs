//! Extraction core: classifies the raw input, renders the prompt, makes one
//! completion call, and decodes the model's JSON payload strictly.

use serde_json::Value;
use tracing::debug;

use crate::errors::AppError;
use crate::extraction::normalize::normalize_structured;
use crate::extraction::prompts::{EXTRACTION_PROMPT_TEMPLATE, EXTRACTION_SYSTEM};
use crate::llm_client::{CompletionBackend, LlmError};
use crate::models::resume::ResumeOutput;

/// Keys searched, in order, for an embedded free-text payload.
const TEXT_KEYS: [&str; 4] = ["raw_text", "text", "resume", "content"];

/// Keys that mark an input document as already structured.
const SCHEMA_KEYS: [&str; 4] = ["skills", "experience", "education", "projects"];

/// How a raw input string is handled.
#[derive(Debug, PartialEq)]
enum InputKind {
    /// Plain text, or JSON we cannot do better with: send to the model as is.
    FreeText,
    /// A JSON object carrying the resume text under a known key.
    EmbeddedText(String),
    /// A JSON object that already has schema keys: normalize, no model call.
    Structured(Value),
}

/// Parses raw resume input into a structured document.
///
/// The single entry point of the extraction flow. Callers have already
/// validated that `raw_text` is non-empty.
pub async fn parse_resume(
    raw_text: &str,
    llm: &dyn CompletionBackend,
) -> Result<ResumeOutput, AppError> {
    match classify_input(raw_text) {
        InputKind::EmbeddedText(text) => extract_via_llm(&text, llm).await,
        InputKind::Structured(value) => {
            debug!("Input already structured; normalizing without a model call");
            Ok(normalize_structured(&value))
        }
        InputKind::FreeText => extract_via_llm(raw_text, llm).await,
    }
}

fn classify_input(raw_text: &str) -> InputKind {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw_text) else {
        return InputKind::FreeText;
    };

    if let Some(text) = find_text_payload(&map) {
        return InputKind::EmbeddedText(text);
    }

    if SCHEMA_KEYS.iter().any(|key| map.contains_key(*key)) {
        return InputKind::Structured(Value::Object(map));
    }

    InputKind::FreeText
}

/// Searches a JSON object for a likely free-form resume text payload,
/// recursing into nested objects and arrays.
fn find_text_payload(obj: &serde_json::Map<String, Value>) -> Option<String> {
    for key in TEXT_KEYS {
        match obj.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.clone()),
            Some(Value::Object(nested)) => {
                if let Some(found) = find_text_payload(nested) {
                    return Some(found);
                }
            }
            Some(Value::Array(items)) => {
                for item in items {
                    match item {
                        Value::Object(nested) => {
                            if let Some(found) = find_text_payload(nested) {
                                return Some(found);
                            }
                        }
                        Value::String(s) if !s.trim().is_empty() => return Some(s.clone()),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    None
}

async fn extract_via_llm(
    raw_text: &str,
    llm: &dyn CompletionBackend,
) -> Result<ResumeOutput, AppError> {
    let prompt = EXTRACTION_PROMPT_TEMPLATE.replace("{raw_text}", raw_text);

    let completion = llm
        .complete(&prompt, EXTRACTION_SYSTEM)
        .await
        .map_err(|e| match e {
            LlmError::EmptyContent => {
                AppError::Schema("model returned an empty completion".to_string())
            }
            other => AppError::Upstream(other.to_string()),
        })?;

    decode_completion(&completion)
}

/// Decodes a model completion into a `ResumeOutput`. The JSON payload may be
/// fenced or surrounded by prose; once located it is decoded strictly, so a
/// missing section or entry field fails the request.
fn decode_completion(completion: &str) -> Result<ResumeOutput, AppError> {
    let text = strip_json_fences(completion);
    let payload = extract_json_object(text)
        .ok_or_else(|| AppError::Schema("completion contains no JSON object".to_string()))?;

    serde_json::from_str(payload)
        .map_err(|e| AppError::Schema(format!("completion does not match the resume schema: {e}")))
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

/// Slices from the first `{` to the last `}`, the widest candidate object.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    const FULL_COMPLETION: &str = r#"{
        "skills": ["Python", "AWS", "Docker"],
        "experience": [{"company": "Acme Inc", "role": "Software Engineer", "years": "2020-2023"}],
        "education": [{"degree": "BSc Computer Science", "institution": "XYZ University", "years": "2016-2020"}],
        "projects": [{"name": "Cool App", "description": "Built X", "tech": ["React", "FastAPI"]}]
    }"#;

    /// Returns a fixed completion and records what it was asked.
    struct CannedBackend {
        completion: &'static str,
        called: AtomicBool,
        last_prompt: Mutex<Option<String>>,
    }

    impl CannedBackend {
        fn new(completion: &'static str) -> Self {
            Self {
                completion,
                called: AtomicBool::new(false),
                last_prompt: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl CompletionBackend for CannedBackend {
        async fn complete(&self, prompt: &str, _system: &str) -> Result<String, LlmError> {
            self.called.store(true, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
            Ok(self.completion.to_string())
        }
    }

    /// Fails the way an unreachable upstream would.
    struct FailingBackend;

    #[async_trait]
    impl CompletionBackend for FailingBackend {
        async fn complete(&self, _prompt: &str, _system: &str) -> Result<String, LlmError> {
            Err(LlmError::Api {
                status: 503,
                message: "model overloaded".to_string(),
            })
        }
    }

    /// Succeeds at the HTTP level but yields no usable text part.
    struct EmptyBackend;

    #[async_trait]
    impl CompletionBackend for EmptyBackend {
        async fn complete(&self, _prompt: &str, _system: &str) -> Result<String, LlmError> {
            Err(LlmError::EmptyContent)
        }
    }

    fn as_map(json: &str) -> serde_json::Map<String, Value> {
        match serde_json::from_str(json).unwrap() {
            Value::Object(map) => map,
            other => panic!("fixture is not an object: {other}"),
        }
    }

    // ── input classification ────────────────────────────────────────────────

    #[test]
    fn test_plain_text_is_free_text() {
        assert_eq!(
            classify_input("John Doe, software engineer, ten years of Python"),
            InputKind::FreeText
        );
    }

    #[test]
    fn test_json_with_raw_text_is_embedded() {
        let input = r#"{"raw_text": "John Doe, software engineer"}"#;
        assert_eq!(
            classify_input(input),
            InputKind::EmbeddedText("John Doe, software engineer".to_string())
        );
    }

    #[test]
    fn test_json_with_schema_keys_is_structured() {
        assert!(matches!(
            classify_input(r#"{"skills": ["Rust"]}"#),
            InputKind::Structured(_)
        ));
    }

    #[test]
    fn test_embedded_text_wins_over_schema_keys() {
        // When both are present, the text payload is extracted fresh rather
        // than passing the stale structure through.
        let input = r#"{"skills": ["stale"], "raw_text": "fresh resume text"}"#;
        assert_eq!(
            classify_input(input),
            InputKind::EmbeddedText("fresh resume text".to_string())
        );
    }

    #[test]
    fn test_unrecognized_json_object_is_free_text() {
        assert_eq!(classify_input(r#"{"foo": "bar"}"#), InputKind::FreeText);
    }

    #[test]
    fn test_json_array_is_free_text() {
        assert_eq!(classify_input(r#"["just", "a", "list"]"#), InputKind::FreeText);
    }

    // ── payload discovery ───────────────────────────────────────────────────

    #[test]
    fn test_find_text_payload_prefers_key_order() {
        let map = as_map(r#"{"text": "second choice", "raw_text": "first choice"}"#);
        assert_eq!(find_text_payload(&map), Some("first choice".to_string()));
    }

    #[test]
    fn test_find_text_payload_recurses_into_objects() {
        let map = as_map(r#"{"resume": {"content": "deep text"}}"#);
        assert_eq!(find_text_payload(&map), Some("deep text".to_string()));
    }

    #[test]
    fn test_find_text_payload_recurses_into_arrays() {
        let map = as_map(r#"{"content": [{"text": "from a list"}]}"#);
        assert_eq!(find_text_payload(&map), Some("from a list".to_string()));
    }

    #[test]
    fn test_find_text_payload_takes_first_nonblank_list_string() {
        let map = as_map(r#"{"text": ["   ", "plain item"]}"#);
        assert_eq!(find_text_payload(&map), Some("plain item".to_string()));
    }

    #[test]
    fn test_find_text_payload_skips_blank_values() {
        let map = as_map(r#"{"raw_text": "   ", "text": "real text"}"#);
        assert_eq!(find_text_payload(&map), Some("real text".to_string()));
    }

    #[test]
    fn test_find_text_payload_none_when_absent() {
        let map = as_map(r#"{"name": "John", "age": 40}"#);
        assert_eq!(find_text_payload(&map), None);
    }

    // ── payload location ────────────────────────────────────────────────────

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_extract_json_object_slices_widest_braces() {
        assert_eq!(
            extract_json_object("prose {\"a\": 1} trailing"),
            Some("{\"a\": 1}")
        );
    }

    #[test]
    fn test_extract_json_object_none_without_braces() {
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn test_extract_json_object_none_when_reversed() {
        assert_eq!(extract_json_object("} backwards {"), None);
    }

    // ── completion decoding ─────────────────────────────────────────────────

    #[test]
    fn test_decode_full_completion() {
        let output = decode_completion(FULL_COMPLETION).unwrap();
        assert_eq!(output.skills, vec!["Python", "AWS", "Docker"]);
        assert_eq!(output.experience[0].company, "Acme Inc");
    }

    #[test]
    fn test_decode_fenced_completion() {
        let fenced = format!("```json\n{FULL_COMPLETION}\n```");
        let output = decode_completion(&fenced).unwrap();
        assert_eq!(output.projects[0].name, "Cool App");
    }

    #[test]
    fn test_decode_prose_wrapped_completion() {
        let wrapped = format!("Here is the extraction you asked for:\n{FULL_COMPLETION}\nAnything else?");
        let output = decode_completion(&wrapped).unwrap();
        assert_eq!(output.education[0].institution, "XYZ University");
    }

    #[test]
    fn test_decode_non_json_is_schema_error() {
        let result = decode_completion("I am sorry, I cannot help with that.");
        assert!(matches!(result, Err(AppError::Schema(_))));
    }

    #[test]
    fn test_decode_missing_section_is_schema_error() {
        // valid JSON, but no "projects"
        let partial = r#"{"skills": [], "experience": [], "education": []}"#;
        let result = decode_completion(partial);
        assert!(matches!(result, Err(AppError::Schema(_))));
    }

    // ── end to end against mock backends ────────────────────────────────────

    #[tokio::test]
    async fn test_parse_resume_extracts_skills_via_mock() {
        let backend = CannedBackend::new(FULL_COMPLETION);
        let output = parse_resume("Python, AWS and Docker veteran", &backend)
            .await
            .unwrap();

        for skill in ["Python", "AWS", "Docker"] {
            assert!(output.skills.iter().any(|s| s == skill), "missing {skill}");
        }
    }

    #[tokio::test]
    async fn test_parse_resume_embeds_input_in_prompt() {
        let backend = CannedBackend::new(FULL_COMPLETION);
        parse_resume("ten years of Rust", &backend).await.unwrap();

        let prompt = backend.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("INPUT:"));
        assert!(prompt.contains("ten years of Rust"));
        assert!(prompt.ends_with("OUTPUT JSON:"));
    }

    #[tokio::test]
    async fn test_parse_resume_unwraps_embedded_payload() {
        let backend = CannedBackend::new(FULL_COMPLETION);
        let input = r#"{"resume": {"text": "inner resume text"}}"#;
        parse_resume(input, &backend).await.unwrap();

        let prompt = backend.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("inner resume text"));
        assert!(!prompt.contains("resume\":"));
    }

    #[tokio::test]
    async fn test_parse_resume_non_json_completion_is_schema_error() {
        let backend = CannedBackend::new("Sure! Skills: Python, AWS, Docker.");
        let result = parse_resume("some resume", &backend).await;
        assert!(matches!(result, Err(AppError::Schema(_))));
    }

    #[tokio::test]
    async fn test_parse_resume_upstream_failure_is_upstream_error() {
        let result = parse_resume("some resume", &FailingBackend).await;
        assert!(matches!(result, Err(AppError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_parse_resume_empty_completion_is_schema_error() {
        let result = parse_resume("some resume", &EmptyBackend).await;
        assert!(matches!(result, Err(AppError::Schema(_))));
    }

    #[tokio::test]
    async fn test_structured_input_skips_model_call() {
        let backend = CannedBackend::new("never used");
        let input = r#"{"skills": ["Rust"], "experience": []}"#;
        let output = parse_resume(input, &backend).await.unwrap();

        assert_eq!(output.skills, vec!["Rust"]);
        assert!(output.projects.is_empty());
        assert!(!backend.called.load(Ordering::SeqCst));
    }
}
