//! Narrow interfaces to the engine's external collaborators.
//!
//! Persistence, profile data, prompt templates and rendering are all
//! out-of-scope subsystems; the engine reaches them only through these
//! traits (held as `Arc<dyn …>`), so any backing implementation — SQL,
//! object storage, another service — can be wired in without touching the
//! core. Failures cross this boundary as `anyhow::Error` and are mapped
//! into the engine's own taxonomy by the workflow layer.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::content::DocumentContent;
use crate::models::profile::{ContentItem, ContentItemKind, Profile};
use crate::models::request::{
    ArtifactRecord, DocumentType, GenerationRequest, RequestPatch,
};

pub mod memory;

#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn create(&self, request: GenerationRequest) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<GenerationRequest>>;
    /// Partial update; returns the updated record, or `None` if the id is
    /// unknown.
    async fn update(&self, id: Uuid, patch: RequestPatch) -> Result<Option<GenerationRequest>>;
    async fn add_artifact(&self, artifact: ArtifactRecord) -> Result<()>;
    async fn list_artifacts(&self, request_id: Uuid) -> Result<Vec<ArtifactRecord>>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self) -> Result<Option<Profile>>;
    async fn list_content_items(
        &self,
        filter: Option<ContentItemKind>,
    ) -> Result<Vec<ContentItem>>;
}

/// Current named-placeholder prompt templates per document type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplates {
    pub resume_generation: String,
    pub cover_letter_generation: String,
}

#[async_trait]
pub trait PromptStore: Send + Sync {
    async fn get_templates(&self) -> Result<PromptTemplates>;
}

/// Identity metadata handed to the renderer alongside the canonical object.
#[derive(Debug, Clone)]
pub struct RenderMeta {
    pub name: String,
    pub company: String,
    pub role: String,
    pub doc_type: DocumentType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedArtifact {
    pub storage_path: String,
    pub filename: String,
    pub size_bytes: u64,
}

/// Opaque render/storage sink: canonical content in, storage locator out.
#[async_trait]
pub trait ArtifactRenderer: Send + Sync {
    async fn render(
        &self,
        content: &DocumentContent,
        meta: &RenderMeta,
    ) -> Result<RenderedArtifact>;
}
