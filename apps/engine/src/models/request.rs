//! Generation request records — the persisted unit of work.
//!
//! A request is created on submission, mutated only by the workflow engine,
//! and retained indefinitely for audit and artifact linkage. Step state is
//! part of the record itself, so there is no transient in-memory workflow
//! state to reclaim.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::content::DocumentContent;
use crate::models::profile::Profile;

// ────────────────────────────────────────────────────────────────────────────
// Document types and sets
// ────────────────────────────────────────────────────────────────────────────

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum DocumentType {
    Resume,
    CoverLetter,
}

impl DocumentType {
    /// URL/step-id-safe identifier.
    pub fn slug(&self) -> &'static str {
        match self {
            DocumentType::Resume => "resume",
            DocumentType::CoverLetter => "cover-letter",
        }
    }

    /// Task category used to pick the agent fallback chain.
    pub fn task_category(&self) -> &'static str {
        match self {
            DocumentType::Resume => "resume_generation",
            DocumentType::CoverLetter => "cover_letter_generation",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentType::Resume => write!(f, "resume"),
            DocumentType::CoverLetter => write!(f, "cover letter"),
        }
    }
}

/// Which documents a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentSet {
    Resume,
    CoverLetter,
    Both,
}

impl DocumentSet {
    /// Requested types in generation order. Resumes generate first.
    pub fn types(&self) -> Vec<DocumentType> {
        match self {
            DocumentSet::Resume => vec![DocumentType::Resume],
            DocumentSet::CoverLetter => vec![DocumentType::CoverLetter],
            DocumentSet::Both => vec![DocumentType::Resume, DocumentType::CoverLetter],
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Request lifecycle
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Processing,
    AwaitingReview,
    Completed,
    Failed,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Structured, user-safe error recorded on a failed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepError {
    pub code: String,
    pub message: String,
}

/// One unit of the fixed per-request pipeline.
///
/// Steps execute strictly in template order; at most one step is
/// `in_progress` at any observed instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub description: String,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<StepError>,
}

impl Step {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Step {
            id: id.into(),
            description: description.into(),
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    /// Wall-clock duration, available once the step has both timestamps.
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Request payload types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TargetJob {
    pub role: String,
    pub company: String,
    pub site: Option<String>,
    pub posting_url: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GenerationPreferences {
    pub tone: Option<String>,
    pub emphasis: Vec<String>,
    /// Per-request model override passed through to the orchestrator.
    pub model: Option<String>,
}

/// Identity snapshot captured once during collect-data, so later steps and
/// rendered artifacts see a consistent view even if the profile changes
/// mid-request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PersonalInfo {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub location: String,
    pub website: String,
    pub linkedin: String,
    pub github: String,
}

impl From<&Profile> for PersonalInfo {
    fn from(profile: &Profile) -> Self {
        PersonalInfo {
            name: profile.name.clone(),
            email: profile.email.clone(),
            phone: profile.phone.clone(),
            location: profile.location.clone(),
            website: profile.website.clone(),
            linkedin: profile.linkedin.clone(),
            github: profile.github.clone(),
        }
    }
}

/// Caller input for creating a request.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRequest {
    pub document_set: DocumentSet,
    pub job: TargetJob,
    #[serde(default)]
    pub preferences: Option<GenerationPreferences>,
    #[serde(default)]
    pub job_match_id: Option<Uuid>,
}

// ────────────────────────────────────────────────────────────────────────────
// The request record
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub id: Uuid,
    pub document_set: DocumentSet,
    pub job: TargetJob,
    pub preferences: Option<GenerationPreferences>,
    pub job_match_id: Option<Uuid>,
    pub status: RequestStatus,
    /// Public locator per rendered document type.
    pub outputs: BTreeMap<DocumentType, String>,
    pub personal_info: Option<PersonalInfo>,
    /// Intermediate (unrendered) content keyed by type. Superseded, not
    /// mutated, by review edits and rejection regenerations.
    pub drafts: BTreeMap<DocumentType, DocumentContent>,
    pub revision_attempts: BTreeMap<DocumentType, u32>,
    pub steps: Vec<Step>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationRequest {
    /// Index of the first pending step, if any.
    pub fn next_pending_step(&self) -> Option<usize> {
        self.steps.iter().position(|s| s.status == StepStatus::Pending)
    }

    /// The most recently completed step in template order, if any.
    pub fn last_completed_step(&self) -> Option<&Step> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .last()
    }
}

/// Partial update applied through `RequestStore::update`. Every field is
/// optional; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct RequestPatch {
    pub status: Option<RequestStatus>,
    pub steps: Option<Vec<Step>>,
    pub outputs: Option<BTreeMap<DocumentType, String>>,
    pub personal_info: Option<PersonalInfo>,
    pub drafts: Option<BTreeMap<DocumentType, DocumentContent>>,
    pub revision_attempts: Option<BTreeMap<DocumentType, u32>>,
}

impl RequestPatch {
    pub fn apply(self, request: &mut GenerationRequest) {
        if let Some(status) = self.status {
            request.status = status;
        }
        if let Some(steps) = self.steps {
            request.steps = steps;
        }
        if let Some(outputs) = self.outputs {
            request.outputs = outputs;
        }
        if let Some(personal_info) = self.personal_info {
            request.personal_info = Some(personal_info);
        }
        if let Some(drafts) = self.drafts {
            request.drafts = drafts;
        }
        if let Some(revision_attempts) = self.revision_attempts {
            request.revision_attempts = revision_attempts;
        }
        request.updated_at = Utc::now();
    }
}

/// Persisted record of one rendered artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub id: Uuid,
    pub request_id: Uuid,
    pub doc_type: DocumentType,
    pub filename: String,
    pub storage_path: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}
