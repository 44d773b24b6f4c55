//! Review sub-protocol: draft visibility, human approval, and the bounded
//! rejection loop.
//!
//! A draft is visible only while its review step is the most recently
//! completed step and the request is exactly `awaiting_review` — for a
//! `both` request, the resume draft disappears the moment cover-letter
//! generation begins. Rejections regenerate with the reviewer's feedback
//! embedded verbatim and are capped at 3 per (request, type).

use serde::Serialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::errors::{EngineError, EngineResult};
use crate::grounding::{ground_resume, scan_cover_letter};
use crate::models::content::DocumentContent;
use crate::models::request::{DocumentType, GenerationRequest, RequestStatus, Step};
use crate::recovery::{recover_cover_letter, recover_resume};
use crate::workflow::prompts::{
    COVER_LETTER_FORMAT_CONTRACT, JSON_ONLY_GUARD, RESUME_FORMAT_CONTRACT,
    REVISION_PROMPT_TEMPLATE,
};
use crate::workflow::{doc_type_from_slug, storage_err, WorkflowEngine};

/// Rejections allowed per (request, type); the next call fails loudly.
pub const MAX_REVISION_ATTEMPTS: u32 = 3;

/// The draft pending human review.
#[derive(Debug, Clone, Serialize)]
pub struct DraftView {
    pub doc_type: DocumentType,
    pub content: DocumentContent,
    pub revision_attempts: u32,
}

/// The review step whose draft is currently pending, if any: the request
/// must be exactly `awaiting_review` and the matching review step must be
/// the most recently completed one.
fn pending_review(request: &GenerationRequest) -> Option<(DocumentType, &DocumentContent)> {
    if request.status != RequestStatus::AwaitingReview {
        return None;
    }
    let last = request.last_completed_step()?;
    let doc_type = last.id.strip_prefix("review-").and_then(doc_type_from_slug)?;
    let content = request.drafts.get(&doc_type)?;
    Some((doc_type, content))
}

impl WorkflowEngine {
    /// Returns the draft pending review, or `None` when nothing is
    /// reviewable right now.
    pub async fn get_draft_content(&self, id: Uuid) -> EngineResult<Option<DraftView>> {
        let request = self.load(id).await?;
        Ok(pending_review(&request).map(|(doc_type, content)| DraftView {
            doc_type,
            content: content.clone(),
            revision_attempts: request
                .revision_attempts
                .get(&doc_type)
                .copied()
                .unwrap_or(0),
        }))
    }

    /// Accepts the (possibly edited) draft, flips the request back to
    /// `processing`, and immediately advances one step.
    pub async fn submit_review(
        &self,
        id: Uuid,
        doc_type: DocumentType,
        edited: DocumentContent,
    ) -> EngineResult<Option<Step>> {
        let mut request = self.load(id).await?;

        let (pending_type, _) = pending_review(&request).ok_or_else(|| {
            EngineError::InvalidState("request is not awaiting review".to_string())
        })?;
        if pending_type != doc_type {
            return Err(EngineError::InvalidState(format!(
                "the pending review is for the {pending_type} draft"
            )));
        }
        if edited.doc_type() != doc_type {
            return Err(EngineError::Precondition(
                "submitted content does not match the document type under review".to_string(),
            ));
        }

        request.drafts.insert(doc_type, edited);
        request.status = RequestStatus::Processing;
        self.persist(&request).await?;
        info!(request_id = %id, %doc_type, "review submitted; resuming pipeline");

        self.run_next_step(id).await
    }

    /// Regenerates the pending draft with the reviewer feedback embedded
    /// verbatim. The request stays `awaiting_review` with the new draft.
    /// Succeeds at most [`MAX_REVISION_ATTEMPTS`] times per (request,
    /// type); the next call fails with a revision-limit error.
    pub async fn reject_review(
        &self,
        id: Uuid,
        doc_type: DocumentType,
        feedback: &str,
    ) -> EngineResult<DraftView> {
        let mut request = self.load(id).await?;

        let (pending_type, current) = pending_review(&request).ok_or_else(|| {
            EngineError::InvalidState("request is not awaiting review".to_string())
        })?;
        if pending_type != doc_type {
            return Err(EngineError::InvalidState(format!(
                "the pending review is for the {pending_type} draft"
            )));
        }

        let attempts = request
            .revision_attempts
            .get(&doc_type)
            .copied()
            .unwrap_or(0);
        if attempts >= MAX_REVISION_ATTEMPTS {
            return Err(EngineError::RevisionLimit { doc_type, attempts });
        }

        let draft_json = serde_json::to_string_pretty(current).map_err(|err| {
            EngineError::Internal(anyhow::anyhow!("serializing draft for revision: {err}"))
        })?;
        let format_contract = match doc_type {
            DocumentType::Resume => RESUME_FORMAT_CONTRACT,
            DocumentType::CoverLetter => COVER_LETTER_FORMAT_CONTRACT,
        };
        let prompt = REVISION_PROMPT_TEMPLATE
            .replace("{doc_type}", &doc_type.to_string())
            .replace("{feedback}", feedback)
            .replace("{draft_json}", &draft_json)
            .replace("{format_contract}", format_contract)
            .replace("{json_guard}", JSON_ONLY_GUARD);

        let model_override = request
            .preferences
            .as_ref()
            .and_then(|preferences| preferences.model.clone());
        let execution = self
            .orchestrator
            .execute(doc_type.task_category(), &prompt, model_override.as_deref())
            .await?;

        let items = self
            .profiles
            .list_content_items(None)
            .await
            .map_err(storage_err)?;

        let content = match doc_type {
            DocumentType::Resume => {
                let recovered = recover_resume(&execution.text)?;
                let (grounded, _) = ground_resume(recovered.content, &items);
                DocumentContent::Resume(grounded)
            }
            DocumentType::CoverLetter => {
                let recovered = recover_cover_letter(&execution.text)?;
                scan_cover_letter(&recovered.content, &items, &request.job);
                DocumentContent::CoverLetter(recovered.content)
            }
        };

        let attempts = attempts + 1;
        request.drafts.insert(doc_type, content.clone());
        request.revision_attempts.insert(doc_type, attempts);

        // Record the regeneration on the review step result for audit.
        if let Some(step) = request
            .steps
            .iter_mut()
            .find(|step| step.id == format!("review-{}", doc_type.slug()))
        {
            step.result = Some(json!({
                "awaitingReview": doc_type.slug(),
                "revisionAttempts": attempts,
            }));
        }

        self.persist(&request).await?;
        info!(
            request_id = %id,
            %doc_type,
            attempts,
            "draft regenerated from reviewer feedback"
        );

        Ok(DraftView {
            doc_type,
            content,
            revision_attempts: attempts,
        })
    }
}
