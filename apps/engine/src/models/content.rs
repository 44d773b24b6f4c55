//! Canonical content objects — the fully validated, defaulted representation
//! used by every downstream stage.
//!
//! These are the ONLY shapes allowed past the recovery/grounding boundary.
//! Every field carries a default and every field always serializes, so an
//! accepted object never omits keys. Once a draft is accepted it is
//! immutable; rejection loops and review edits replace it wholesale.

use serde::{Deserialize, Serialize};

use crate::models::request::DocumentType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ResumeContent {
    pub professional_summary: String,
    pub experience: Vec<ExperienceEntry>,
    pub education: Vec<EducationEntry>,
    pub projects: Vec<ProjectEntry>,
    pub skills: Vec<SkillCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ExperienceEntry {
    pub company: String,
    pub role: String,
    pub location: String,
    pub start_date: String,
    /// `None` means the position is current.
    pub end_date: Option<String>,
    pub highlights: Vec<String>,
    pub technologies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct EducationEntry {
    pub institution: String,
    pub degree: String,
    pub field: String,
    pub start_date: String,
    pub end_date: String,
    pub details: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectEntry {
    pub name: String,
    pub description: String,
    pub url: String,
    pub technologies: Vec<String>,
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SkillCategory {
    pub category: String,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CoverLetterContent {
    pub greeting: String,
    pub body_paragraphs: Vec<String>,
    pub closing: String,
    pub signature: String,
}

/// A canonical document of either type — the currency stored in request
/// drafts and handed to the artifact renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DocumentContent {
    Resume(ResumeContent),
    CoverLetter(CoverLetterContent),
}

impl DocumentContent {
    pub fn doc_type(&self) -> DocumentType {
        match self {
            DocumentContent::Resume(_) => DocumentType::Resume,
            DocumentContent::CoverLetter(_) => DocumentType::CoverLetter,
        }
    }
}
