//! Lenient shaping for structured pass-through input.
//!
//! A caller may submit a document that already carries the schema keys.
//! Such input is normalized here instead of being sent to the model:
//! absent or mistyped sections become empty, non-object entries are
//! dropped, and scalar fields are coerced to strings. Model output never
//! goes through this path; it is decoded strictly in `parser`.

use serde_json::{Map, Value};

use crate::models::resume::{EducationEntry, ExperienceEntry, ProjectEntry, ResumeOutput};

pub fn normalize_structured(value: &Value) -> ResumeOutput {
    ResumeOutput {
        skills: string_list(value.get("skills")),
        experience: entry_list(value.get("experience"), experience_entry),
        education: entry_list(value.get("education"), education_entry),
        projects: entry_list(value.get("projects"), project_entry),
    }
}

fn experience_entry(obj: &Map<String, Value>) -> ExperienceEntry {
    ExperienceEntry {
        company: field_string(obj, "company"),
        role: field_string(obj, "role"),
        years: field_string(obj, "years"),
    }
}

fn education_entry(obj: &Map<String, Value>) -> EducationEntry {
    EducationEntry {
        degree: field_string(obj, "degree"),
        institution: field_string(obj, "institution"),
        years: field_string(obj, "years"),
    }
}

fn project_entry(obj: &Map<String, Value>) -> ProjectEntry {
    ProjectEntry {
        name: field_string(obj, "name"),
        description: field_string(obj, "description"),
        tech: string_list(obj.get("tech")),
    }
}

/// Coerces a sequence value to a list of strings.
/// Non-arrays normalize to empty rather than failing.
fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().map(coerce_string).collect())
        .unwrap_or_default()
}

fn entry_list<T>(value: Option<&Value>, build: fn(&Map<String, Value>) -> T) -> Vec<T> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(build)
                .collect()
        })
        .unwrap_or_default()
}

fn field_string(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key).map(coerce_string).unwrap_or_default()
}

/// Strings pass through; numbers and booleans render; anything else is empty.
fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}
