//! Reference implementations of the collaborator traits: in-memory stores
//! for tests and local runs, plus a JSON file sink standing in for the real
//! PDF render/storage pipeline.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::content::DocumentContent;
use crate::models::profile::{ContentItem, ContentItemKind, Profile};
use crate::models::request::{ArtifactRecord, GenerationRequest, RequestPatch};
use crate::stores::{
    ArtifactRenderer, ProfileStore, PromptStore, PromptTemplates, RenderMeta, RenderedArtifact,
    RequestStore,
};
use crate::workflow::prompts::{DEFAULT_COVER_LETTER_TEMPLATE, DEFAULT_RESUME_TEMPLATE};

// ────────────────────────────────────────────────────────────────────────────
// Request store
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryRequestStore {
    requests: RwLock<HashMap<Uuid, GenerationRequest>>,
    artifacts: RwLock<Vec<ArtifactRecord>>,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn create(&self, request: GenerationRequest) -> Result<()> {
        self.requests.write().await.insert(request.id, request);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<GenerationRequest>> {
        Ok(self.requests.read().await.get(&id).cloned())
    }

    async fn update(&self, id: Uuid, patch: RequestPatch) -> Result<Option<GenerationRequest>> {
        let mut requests = self.requests.write().await;
        match requests.get_mut(&id) {
            Some(request) => {
                patch.apply(request);
                Ok(Some(request.clone()))
            }
            None => Ok(None),
        }
    }

    async fn add_artifact(&self, artifact: ArtifactRecord) -> Result<()> {
        self.artifacts.write().await.push(artifact);
        Ok(())
    }

    async fn list_artifacts(&self, request_id: Uuid) -> Result<Vec<ArtifactRecord>> {
        Ok(self
            .artifacts
            .read()
            .await
            .iter()
            .filter(|a| a.request_id == request_id)
            .cloned()
            .collect())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Profile store
// ────────────────────────────────────────────────────────────────────────────

pub struct InMemoryProfileStore {
    profile: Option<Profile>,
    items: Vec<ContentItem>,
}

impl InMemoryProfileStore {
    pub fn new(profile: Profile, items: Vec<ContentItem>) -> Self {
        InMemoryProfileStore {
            profile: Some(profile),
            items,
        }
    }

    /// A store with no profile at all — the missing-profile precondition.
    pub fn empty() -> Self {
        InMemoryProfileStore {
            profile: None,
            items: Vec::new(),
        }
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get_profile(&self) -> Result<Option<Profile>> {
        Ok(self.profile.clone())
    }

    async fn list_content_items(
        &self,
        filter: Option<ContentItemKind>,
    ) -> Result<Vec<ContentItem>> {
        Ok(self
            .items
            .iter()
            .filter(|item| filter.map_or(true, |kind| item.kind == kind))
            .cloned()
            .collect())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Prompt store
// ────────────────────────────────────────────────────────────────────────────

/// Serves a fixed template pair; defaults to the built-in templates.
pub struct StaticPromptStore {
    templates: PromptTemplates,
}

impl StaticPromptStore {
    pub fn new(templates: PromptTemplates) -> Self {
        StaticPromptStore { templates }
    }
}

impl Default for StaticPromptStore {
    fn default() -> Self {
        StaticPromptStore {
            templates: PromptTemplates {
                resume_generation: DEFAULT_RESUME_TEMPLATE.to_string(),
                cover_letter_generation: DEFAULT_COVER_LETTER_TEMPLATE.to_string(),
            },
        }
    }
}

#[async_trait]
impl PromptStore for StaticPromptStore {
    async fn get_templates(&self) -> Result<PromptTemplates> {
        Ok(self.templates.clone())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Artifact sink
// ────────────────────────────────────────────────────────────────────────────

/// Writes the canonical object as pretty-printed JSON into a directory.
///
/// Stands in for the real PDF pipeline during tests and local runs; the
/// engine only ever sees the `RenderedArtifact` locator either way.
pub struct JsonArtifactRenderer {
    dir: PathBuf,
}

impl JsonArtifactRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        JsonArtifactRenderer { dir: dir.into() }
    }
}

#[async_trait]
impl ArtifactRenderer for JsonArtifactRenderer {
    async fn render(
        &self,
        content: &DocumentContent,
        meta: &RenderMeta,
    ) -> Result<RenderedArtifact> {
        let filename = format!(
            "{}-{}-{}.json",
            sanitize(&meta.name),
            sanitize(&meta.company),
            meta.doc_type.slug()
        );
        let path = self.dir.join(&filename);

        let body = serde_json::to_vec_pretty(content).context("serializing document content")?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating artifact dir {}", self.dir.display()))?;
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("writing artifact {}", path.display()))?;

        Ok(RenderedArtifact {
            storage_path: path.display().to_string(),
            filename,
            size_bytes: body.len() as u64,
        })
    }
}

fn sanitize(s: &str) -> String {
    let slug: String = s
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "document".to_string()
    } else {
        slug
    }
}
