//! Authoritative profile records, as served by the out-of-scope profile
//! store. Content items are free-text by design — the grounding filter
//! normalizes and matches against them, it does not assume clean data.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical identity fields.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Profile {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub location: String,
    pub website: String,
    pub linkedin: String,
    pub github: String,
    pub headline: String,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentItemKind {
    Work,
    Education,
    Project,
    Skills,
    Narrative,
    Highlight,
}

/// One authoritative content item.
///
/// `title` carries the primary name for the kind: company for `work`,
/// institution for `education`, project name for `project`, category label
/// for `skills`. `highlight` items attach to a parent work/project item
/// through `parent_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: Uuid,
    pub kind: ContentItemKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub date_start: String,
    #[serde(default)]
    pub date_end: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

impl ContentItem {
    /// Bare item of a kind with a title — the fields every kind shares.
    pub fn new(kind: ContentItemKind, title: impl Into<String>) -> Self {
        ContentItem {
            id: Uuid::new_v4(),
            kind,
            title: title.into(),
            role: String::new(),
            location: String::new(),
            date_start: String::new(),
            date_end: String::new(),
            description: String::new(),
            skills: Vec::new(),
            website: String::new(),
            parent_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_item_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ContentItemKind::Highlight).unwrap(),
            "\"highlight\""
        );
    }

    #[test]
    fn test_content_item_deserializes_with_sparse_fields() {
        let json = serde_json::json!({
            "id": Uuid::new_v4(),
            "kind": "work",
            "title": "Acme Corp"
        });
        let item: ContentItem = serde_json::from_value(json).unwrap();
        assert_eq!(item.kind, ContentItemKind::Work);
        assert_eq!(item.title, "Acme Corp");
        assert!(item.skills.is_empty());
        assert!(item.parent_id.is_none());
    }
}
