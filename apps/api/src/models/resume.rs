//! Transient value objects for the resume extraction schema.
//! No identity, no persistence; they live for a single request.

use serde::{Deserialize, Serialize};

/// Structured document returned to the caller.
///
/// Every section is required. Decoding a model completion that omits one
/// fails, which the extraction flow surfaces as a schema error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeOutput {
    pub skills: Vec<String>,
    pub experience: Vec<ExperienceEntry>,
    pub education: Vec<EducationEntry>,
    pub projects: Vec<ProjectEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperienceEntry {
    pub company: String,
    pub role: String,
    /// Free-form range, e.g. "2020-2023".
    pub years: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EducationEntry {
    pub degree: String,
    pub institution: String,
    pub years: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectEntry {
    pub name: String,
    pub description: String,
    pub tech: Vec<String>,
}
