//! Workflow Engine — the top-level state machine.
//!
//! Flow per request: collect-data → generate-<type> → review-<type>
//! (per requested type) → render-pdf. Steps execute strictly in template
//! order, one at a time; the review pause is a hard stop released only by
//! `submit_review`/`reject_review`. Step state lives on the persisted
//! request record, so a request can always be resumed from the store.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agents::AgentOrchestrator;
use crate::errors::{EngineError, EngineResult};
use crate::fit::{build_trim_prompt, FitEstimate, FitEstimator, PageBudget, TrimBudgets};
use crate::grounding::{ground_resume, scan_cover_letter};
use crate::models::content::{DocumentContent, ResumeContent};
use crate::models::profile::ContentItem;
use crate::models::request::{
    ArtifactRecord, DocumentType, GenerationRequest, NewRequest, PersonalInfo, RequestPatch,
    RequestStatus, Step, StepError, StepStatus,
};
use crate::recovery::{recover_cover_letter, recover_resume};
use crate::stores::{ArtifactRenderer, ProfileStore, PromptStore, RenderMeta, RequestStore};

pub mod prompts;
mod review;

pub use review::{DraftView, MAX_REVISION_ATTEMPTS};

pub const STEP_COLLECT_DATA: &str = "collect-data";
pub const STEP_RENDER_PDF: &str = "render-pdf";

fn generate_step_id(doc_type: DocumentType) -> String {
    format!("generate-{}", doc_type.slug())
}

fn review_step_id(doc_type: DocumentType) -> String {
    format!("review-{}", doc_type.slug())
}

pub(crate) fn doc_type_from_slug(slug: &str) -> Option<DocumentType> {
    match slug {
        "resume" => Some(DocumentType::Resume),
        "cover-letter" => Some(DocumentType::CoverLetter),
        _ => None,
    }
}

/// Builds the fixed step list for a document set. Every requested type
/// gets a generate step and a review gate; collect and render bracket the
/// pipeline.
pub(crate) fn step_template(set: crate::models::request::DocumentSet) -> Vec<Step> {
    let mut steps = vec![Step::new(
        STEP_COLLECT_DATA,
        "Collect profile data and verify agent availability",
    )];
    for doc_type in set.types() {
        steps.push(Step::new(
            generate_step_id(doc_type),
            format!("Generate tailored {doc_type} content"),
        ));
        steps.push(Step::new(
            review_step_id(doc_type),
            format!("Await human review of the {doc_type} draft"),
        ));
    }
    steps.push(Step::new(
        STEP_RENDER_PDF,
        "Render approved documents and record artifacts",
    ));
    steps
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum StepKind {
    CollectData,
    Generate(DocumentType),
    Review(DocumentType),
    Render,
}

fn parse_step_id(id: &str) -> Option<StepKind> {
    match id {
        STEP_COLLECT_DATA => Some(StepKind::CollectData),
        STEP_RENDER_PDF => Some(StepKind::Render),
        _ => id
            .strip_prefix("generate-")
            .and_then(doc_type_from_slug)
            .map(StepKind::Generate)
            .or_else(|| {
                id.strip_prefix("review-")
                    .and_then(doc_type_from_slug)
                    .map(StepKind::Review)
            }),
    }
}

pub(crate) fn storage_err(err: anyhow::Error) -> EngineError {
    EngineError::Storage(format!("{err:#}"))
}

// ────────────────────────────────────────────────────────────────────────────
// The engine
// ────────────────────────────────────────────────────────────────────────────

pub struct WorkflowEngine {
    requests: Arc<dyn RequestStore>,
    profiles: Arc<dyn ProfileStore>,
    prompts: Arc<dyn PromptStore>,
    renderer: Arc<dyn ArtifactRenderer>,
    orchestrator: AgentOrchestrator,
    estimator: FitEstimator,
    trim_budgets: TrimBudgets,
}

impl WorkflowEngine {
    pub fn new(
        requests: Arc<dyn RequestStore>,
        profiles: Arc<dyn ProfileStore>,
        prompts: Arc<dyn PromptStore>,
        renderer: Arc<dyn ArtifactRenderer>,
        orchestrator: AgentOrchestrator,
    ) -> Self {
        WorkflowEngine {
            requests,
            profiles,
            prompts,
            renderer,
            orchestrator,
            estimator: FitEstimator::default(),
            trim_budgets: TrimBudgets::default(),
        }
    }

    pub fn with_page_budget(mut self, budget: PageBudget) -> Self {
        self.estimator = FitEstimator::new(budget);
        self
    }

    pub fn with_trim_budgets(mut self, budgets: TrimBudgets) -> Self {
        self.trim_budgets = budgets;
        self
    }

    /// Creates and persists a request with its full step template.
    pub async fn create_request(&self, input: NewRequest) -> EngineResult<GenerationRequest> {
        let now = Utc::now();
        let request = GenerationRequest {
            id: Uuid::new_v4(),
            document_set: input.document_set,
            job: input.job,
            preferences: input.preferences,
            job_match_id: input.job_match_id,
            status: RequestStatus::Processing,
            outputs: BTreeMap::new(),
            personal_info: None,
            drafts: BTreeMap::new(),
            revision_attempts: BTreeMap::new(),
            steps: step_template(input.document_set),
            created_at: now,
            updated_at: now,
        };
        self.requests
            .create(request.clone())
            .await
            .map_err(storage_err)?;
        info!(
            request_id = %request.id,
            document_set = ?request.document_set,
            company = %request.job.company,
            "generation request created"
        );
        Ok(request)
    }

    pub async fn get_request(&self, id: Uuid) -> EngineResult<GenerationRequest> {
        self.load(id).await
    }

    /// Runs the first pending step, if any.
    ///
    /// Returns the completed step, or `None` when nothing is pending (in
    /// which case a non-terminal request is finalized as `completed`;
    /// repeat calls are no-ops). A failed request stays failed. A request
    /// awaiting review refuses to advance until the review resolves.
    pub async fn run_next_step(&self, id: Uuid) -> EngineResult<Option<Step>> {
        let mut request = self.load(id).await?;

        match request.status {
            RequestStatus::Failed => return Ok(None),
            RequestStatus::AwaitingReview => {
                return Err(EngineError::InvalidState(
                    "request is awaiting review; submit or reject the pending draft first"
                        .to_string(),
                ));
            }
            RequestStatus::Processing | RequestStatus::Completed => {}
        }

        if request
            .steps
            .iter()
            .any(|s| s.status == StepStatus::InProgress)
        {
            return Err(EngineError::InvalidState(
                "another step is already in progress".to_string(),
            ));
        }

        let Some(index) = request.next_pending_step() else {
            if !request.status.is_terminal() {
                request.status = RequestStatus::Completed;
                self.persist(&request).await?;
                info!(request_id = %request.id, "request completed");
            }
            return Ok(None);
        };

        request.steps[index].status = StepStatus::InProgress;
        request.steps[index].started_at = Some(Utc::now());
        self.persist(&request).await?;

        let step_id = request.steps[index].id.clone();
        let kind = parse_step_id(&step_id);

        let outcome = match kind {
            Some(StepKind::CollectData) => self.run_collect_data(&mut request).await,
            Some(StepKind::Generate(doc_type)) => self.run_generate(&mut request, doc_type).await,
            Some(StepKind::Review(doc_type)) => self.run_review(&request, doc_type),
            Some(StepKind::Render) => self.run_render(&mut request).await,
            None => Err(EngineError::InvalidState(format!(
                "unrecognized step '{step_id}'"
            ))),
        };

        match outcome {
            Ok(result) => {
                {
                    let step = &mut request.steps[index];
                    step.status = StepStatus::Completed;
                    step.completed_at = Some(Utc::now());
                    step.result = Some(result);
                }
                if matches!(kind, Some(StepKind::Review(_))) {
                    request.status = RequestStatus::AwaitingReview;
                }
                self.persist(&request).await?;
                info!(request_id = %request.id, step = %step_id, "step completed");
                Ok(Some(request.steps[index].clone()))
            }
            Err(err) => {
                {
                    let step = &mut request.steps[index];
                    step.status = StepStatus::Failed;
                    step.completed_at = Some(Utc::now());
                    step.error = Some(StepError {
                        code: err.code().to_string(),
                        message: err.user_message(),
                    });
                }
                request.status = RequestStatus::Failed;
                self.persist(&request).await?;
                warn!(request_id = %request.id, step = %step_id, error = %err, "step failed");
                Err(err)
            }
        }
    }

    // ── step implementations ────────────────────────────────────────────────

    /// Orchestrator pre-check plus the one-time personal-info snapshot.
    /// Produces no content.
    async fn run_collect_data(
        &self,
        request: &mut GenerationRequest,
    ) -> EngineResult<serde_json::Value> {
        let profile = self
            .profiles
            .get_profile()
            .await
            .map_err(storage_err)?
            .ok_or_else(|| {
                EngineError::Precondition(
                    "No profile found. Create a profile before generating documents.".to_string(),
                )
            })?;

        for doc_type in request.document_set.types() {
            self.orchestrator
                .ensure_available(doc_type.task_category())
                .await?;
        }

        let items = self
            .profiles
            .list_content_items(None)
            .await
            .map_err(storage_err)?;

        request.personal_info = Some(PersonalInfo::from(&profile));

        Ok(json!({
            "profile": profile.name,
            "contentItems": items.len(),
        }))
    }

    /// Generate → recover → ground (→ fit/refit for resumes), storing the
    /// draft unrendered.
    async fn run_generate(
        &self,
        request: &mut GenerationRequest,
        doc_type: DocumentType,
    ) -> EngineResult<serde_json::Value> {
        let personal_info = request.personal_info.clone().ok_or_else(|| {
            EngineError::InvalidState(
                "personal info snapshot missing; collect-data has not run".to_string(),
            )
        })?;
        let items = self
            .profiles
            .list_content_items(None)
            .await
            .map_err(storage_err)?;
        let templates = self.prompts.get_templates().await.map_err(storage_err)?;
        let template = match doc_type {
            DocumentType::Resume => &templates.resume_generation,
            DocumentType::CoverLetter => &templates.cover_letter_generation,
        };
        let prompt =
            self.fill_generation_template(template, request, &personal_info, &items, doc_type)?;
        let model_override = request
            .preferences
            .as_ref()
            .and_then(|p| p.model.clone());

        let execution = self
            .orchestrator
            .execute(doc_type.task_category(), &prompt, model_override.as_deref())
            .await?;

        match doc_type {
            DocumentType::Resume => {
                let recovered = recover_resume(&execution.text)?;
                let (grounded, report) = ground_resume(recovered.content, &items);

                let first_estimate = self.estimator.estimate(&grounded);
                let (content, estimate, refit) = if first_estimate.fits {
                    (grounded, first_estimate, serde_json::Value::Null)
                } else {
                    self.refit_resume(grounded, first_estimate, &items, model_override.as_deref())
                        .await?
                };

                request
                    .drafts
                    .insert(doc_type, DocumentContent::Resume(content));
                Ok(json!({
                    "agentId": execution.agent_id,
                    "model": execution.model,
                    "repairs": recovered.repairs,
                    "grounding": report,
                    "fit": estimate,
                    "refit": refit,
                }))
            }
            DocumentType::CoverLetter => {
                let recovered = recover_cover_letter(&execution.text)?;
                let warnings = scan_cover_letter(&recovered.content, &items, &request.job);
                request
                    .drafts
                    .insert(doc_type, DocumentContent::CoverLetter(recovered.content));
                Ok(json!({
                    "agentId": execution.agent_id,
                    "model": execution.model,
                    "repairs": recovered.repairs,
                    "warnings": warnings,
                }))
            }
        }
    }

    /// One automatic trim round. The attempt with the smaller measured
    /// overflow wins; ties keep the trim. A refit that cannot be produced
    /// or recovered keeps the first attempt — a worse draft is still a
    /// draft, and the reviewer sees it next.
    async fn refit_resume(
        &self,
        first: ResumeContent,
        first_estimate: FitEstimate,
        items: &[ContentItem],
        model_override: Option<&str>,
    ) -> EngineResult<(ResumeContent, FitEstimate, serde_json::Value)> {
        info!(
            overflow = first_estimate.overflow_lines,
            "resume overflows the page estimate; running one trim round"
        );
        let trim_prompt = build_trim_prompt(&first, &first_estimate, &self.trim_budgets)?;

        let execution = match self
            .orchestrator
            .execute(
                DocumentType::Resume.task_category(),
                &trim_prompt,
                model_override,
            )
            .await
        {
            Ok(execution) => execution,
            Err(err) => {
                warn!(error = %err, "trim round failed; keeping the first attempt");
                return Ok((
                    first,
                    first_estimate,
                    json!({ "kept": "original", "reason": "trim_call_failed" }),
                ));
            }
        };

        match recover_resume(&execution.text) {
            Ok(recovered) => {
                let (grounded, _) = ground_resume(recovered.content, items);
                let estimate = self.estimator.estimate(&grounded);
                if estimate.overflow_lines <= first_estimate.overflow_lines {
                    let detail = json!({ "kept": "refit", "firstOverflow": first_estimate.overflow_lines });
                    Ok((grounded, estimate, detail))
                } else {
                    warn!(
                        first = first_estimate.overflow_lines,
                        refit = estimate.overflow_lines,
                        "trim round overflowed more than the original; keeping the first attempt"
                    );
                    let detail = json!({ "kept": "original", "refitOverflow": estimate.overflow_lines });
                    Ok((first, first_estimate, detail))
                }
            }
            Err(err) => {
                warn!(error = %err, "trim output unrecoverable; keeping the first attempt");
                Ok((
                    first,
                    first_estimate,
                    json!({ "kept": "original", "reason": "trim_output_unrecoverable" }),
                ))
            }
        }
    }

    /// Completes immediately; the caller flips the request to
    /// `awaiting_review`.
    fn run_review(
        &self,
        request: &GenerationRequest,
        doc_type: DocumentType,
    ) -> EngineResult<serde_json::Value> {
        if !request.drafts.contains_key(&doc_type) {
            return Err(EngineError::InvalidState(format!(
                "no {doc_type} draft available for review"
            )));
        }
        info!(request_id = %request.id, %doc_type, "draft parked for human review");
        Ok(json!({ "awaitingReview": doc_type.slug() }))
    }

    /// Renders every requested type's draft, records per-type locators and
    /// one artifact record per type. No automatic retry — a failure here
    /// fails the step and is resolved by caller resubmission.
    async fn run_render(
        &self,
        request: &mut GenerationRequest,
    ) -> EngineResult<serde_json::Value> {
        let name = request
            .personal_info
            .as_ref()
            .map(|info| info.name.clone())
            .unwrap_or_default();

        let mut locators = serde_json::Map::new();
        for doc_type in request.document_set.types() {
            let draft = request.drafts.get(&doc_type).ok_or_else(|| {
                EngineError::InvalidState(format!("no {doc_type} draft available to render"))
            })?;

            let meta = RenderMeta {
                name: name.clone(),
                company: request.job.company.clone(),
                role: request.job.role.clone(),
                doc_type,
            };
            let rendered = self
                .renderer
                .render(draft, &meta)
                .await
                .map_err(|err| EngineError::Render(format!("{err:#}")))?;

            let locator = format!("/artifacts/{}", rendered.filename);
            self.requests
                .add_artifact(ArtifactRecord {
                    id: Uuid::new_v4(),
                    request_id: request.id,
                    doc_type,
                    filename: rendered.filename,
                    storage_path: rendered.storage_path,
                    size_bytes: rendered.size_bytes,
                    created_at: Utc::now(),
                })
                .await
                .map_err(storage_err)?;

            request.outputs.insert(doc_type, locator.clone());
            locators.insert(doc_type.slug().to_string(), json!(locator));
        }

        Ok(serde_json::Value::Object(locators))
    }

    // ── shared plumbing ─────────────────────────────────────────────────────

    pub(crate) async fn load(&self, id: Uuid) -> EngineResult<GenerationRequest> {
        self.requests
            .get(id)
            .await
            .map_err(storage_err)?
            .ok_or(EngineError::RequestNotFound)
    }

    pub(crate) async fn persist(&self, request: &GenerationRequest) -> EngineResult<()> {
        let patch = RequestPatch {
            status: Some(request.status),
            steps: Some(request.steps.clone()),
            outputs: Some(request.outputs.clone()),
            personal_info: request.personal_info.clone(),
            drafts: Some(request.drafts.clone()),
            revision_attempts: Some(request.revision_attempts.clone()),
        };
        self.requests
            .update(request.id, patch)
            .await
            .map_err(storage_err)?
            .ok_or(EngineError::RequestNotFound)?;
        Ok(())
    }

    fn fill_generation_template(
        &self,
        template: &str,
        request: &GenerationRequest,
        personal_info: &PersonalInfo,
        items: &[ContentItem],
        doc_type: DocumentType,
    ) -> EngineResult<String> {
        let personal_json = serde_json::to_string_pretty(personal_info)
            .map_err(|err| EngineError::Internal(anyhow::anyhow!("serializing identity: {err}")))?;
        let items_json = serde_json::to_string_pretty(items).map_err(|err| {
            EngineError::Internal(anyhow::anyhow!("serializing content items: {err}"))
        })?;

        let job = &request.job;
        let mut job_context = String::new();
        if let Some(location) = &job.location {
            job_context.push_str(&format!("LOCATION: {location}\n"));
        }
        if let Some(url) = &job.posting_url {
            job_context.push_str(&format!("POSTING: {url}\n"));
        }
        if let Some(description) = &job.description {
            job_context.push_str(&format!("JOB DESCRIPTION:\n{description}\n"));
        }

        let preferences = match &request.preferences {
            Some(preferences) => serde_json::to_string(preferences).map_err(|err| {
                EngineError::Internal(anyhow::anyhow!("serializing preferences: {err}"))
            })?,
            None => "none".to_string(),
        };

        let format_contract = match doc_type {
            DocumentType::Resume => prompts::RESUME_FORMAT_CONTRACT,
            DocumentType::CoverLetter => prompts::COVER_LETTER_FORMAT_CONTRACT,
        };

        Ok(template
            .replace("{role}", &job.role)
            .replace("{company}", &job.company)
            .replace("{job_context}", job_context.trim_end())
            .replace("{personal_json}", &personal_json)
            .replace("{items_json}", &items_json)
            .replace("{preferences}", &preferences)
            .replace("{grounding_guard}", prompts::GROUNDING_GUARD)
            .replace("{format_contract}", format_contract)
            .replace("{json_guard}", prompts::JSON_ONLY_GUARD))
    }
}
