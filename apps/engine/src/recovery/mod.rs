//! Output Validator/Recoverer — turns raw backend text into a canonical,
//! schema-conformant content object, or a classified failure.
//!
//! Pipeline: unwrap the calling tool's envelope → extract the first
//! balanced JSON object when the text does not already start with `{` →
//! parse → targeted repairs (see `repairs`) → strict validation into the
//! immutable canonical type. Only a JSON parse failure is unconditionally
//! fatal; every other anomaly is repaired, not rejected. The repair list is
//! observability only — it never drives control flow.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::models::content::{CoverLetterContent, ResumeContent};

mod repairs;

/// Which targeted repair fired, in order. Logged and surfaced in step
/// results, never branched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairAction {
    UnwrappedEnvelope,
    ExtractedJsonObject,
    ExpandedSkillList,
    NormalizedSkillCategories,
    MappedExperienceFields,
    CoercedPresentEndDate,
    MappedSummaryField,
    NormalizedBodyParagraphs,
    UsedFallbackBodyKey,
}

impl std::fmt::Display for RepairAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RepairAction::UnwrappedEnvelope => "unwrapped_envelope",
            RepairAction::ExtractedJsonObject => "extracted_json_object",
            RepairAction::ExpandedSkillList => "expanded_skill_list",
            RepairAction::NormalizedSkillCategories => "normalized_skill_categories",
            RepairAction::MappedExperienceFields => "mapped_experience_fields",
            RepairAction::CoercedPresentEndDate => "coerced_present_end_date",
            RepairAction::MappedSummaryField => "mapped_summary_field",
            RepairAction::NormalizedBodyParagraphs => "normalized_body_paragraphs",
            RepairAction::UsedFallbackBodyKey => "used_fallback_body_key",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("model output is not valid JSON: {0}")]
    Parse(String),

    #[error("recovered output does not fit the {doc} schema: {detail}")]
    Schema { doc: &'static str, detail: String },
}

/// A successfully recovered canonical object plus the repairs that fired.
#[derive(Debug, Clone)]
pub struct Recovered<T> {
    pub content: T,
    pub repairs: Vec<RepairAction>,
}

pub fn recover_resume(raw: &str) -> Result<Recovered<ResumeContent>, RecoveryError> {
    let (mut value, mut repairs) = parse_payload(raw)?;
    repairs::repair_resume(&mut value, &mut repairs);
    let content: ResumeContent = serde_json::from_value(value).map_err(|err| {
        RecoveryError::Schema {
            doc: "resume",
            detail: err.to_string(),
        }
    })?;
    log_repairs("resume", &repairs);
    Ok(Recovered { content, repairs })
}

pub fn recover_cover_letter(raw: &str) -> Result<Recovered<CoverLetterContent>, RecoveryError> {
    let (mut value, mut repairs) = parse_payload(raw)?;
    repairs::repair_cover_letter(&mut value, &mut repairs);
    let content: CoverLetterContent = serde_json::from_value(value).map_err(|err| {
        RecoveryError::Schema {
            doc: "cover letter",
            detail: err.to_string(),
        }
    })?;
    log_repairs("cover letter", &repairs);
    Ok(Recovered { content, repairs })
}

fn log_repairs(doc: &str, repairs: &[RepairAction]) {
    for repair in repairs {
        debug!(doc, repair = %repair, "output repair applied");
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Envelope unwrap + JSON extraction
// ────────────────────────────────────────────────────────────────────────────

/// Keys that mark a top-level object as actual document content rather
/// than a tool envelope.
const CONTENT_KEYS: &[&str] = &[
    "professionalSummary",
    "summary",
    "experience",
    "education",
    "projects",
    "skills",
    "greeting",
    "bodyParagraphs",
    "body",
    "paragraphs",
];

/// Envelope payload keys, tried in order.
const ENVELOPE_KEYS: &[&str] = &["result", "output", "response", "text"];

fn parse_payload(raw: &str) -> Result<(Value, Vec<RepairAction>), RecoveryError> {
    let mut repairs = Vec::new();

    let text = match unwrap_envelope(raw) {
        Some(inner) => {
            repairs.push(RepairAction::UnwrappedEnvelope);
            inner
        }
        None => raw.to_string(),
    };

    let trimmed = text.trim();
    let json_slice = if trimmed.starts_with('{') {
        trimmed
    } else {
        let slice = extract_balanced_object(trimmed).ok_or_else(|| {
            RecoveryError::Parse("no JSON object found in output".to_string())
        })?;
        repairs.push(RepairAction::ExtractedJsonObject);
        slice
    };

    let value: Value =
        serde_json::from_str(json_slice).map_err(|err| RecoveryError::Parse(err.to_string()))?;
    Ok((value, repairs))
}

/// Detects a calling tool's JSON envelope (`{"type":"result","result":"…"}`
/// and friends, or an Anthropic-style content-block array) and returns the
/// inner text. Objects already carrying content keys are never unwrapped.
fn unwrap_envelope(raw: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw.trim()).ok()?;
    let obj = value.as_object()?;

    if CONTENT_KEYS.iter().any(|key| obj.contains_key(*key)) {
        return None;
    }

    for key in ENVELOPE_KEYS {
        if let Some(Value::String(inner)) = obj.get(*key) {
            return Some(inner.clone());
        }
    }

    if let Some(Value::Array(blocks)) = obj.get("content") {
        if let Some(text) = blocks
            .iter()
            .find_map(|block| block.get("text").and_then(Value::as_str))
        {
            return Some(text.to_string());
        }
    }

    None
}

/// First balanced `{…}` region, honoring JSON string and escape rules.
fn extract_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, byte) in text.as_bytes().iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if *byte == b'\\' {
                escaped = true;
            } else if *byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=offset]);
                }
            }
            _ => {}
        }
    }
    None
}
