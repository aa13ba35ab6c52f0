//! Notes as the remote store knows them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, ToSmolStr};

/// Title given to notes created without one.
pub const DEFAULT_TITLE: &str = "Untitled";

/// Suffix appended to the title of a duplicated note.
pub const COPY_SUFFIX: &str = " (copy)";

/// Opaque, stable note identifier assigned by the remote store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(SmolStr);

impl DocumentId {
    pub fn new(id: impl Into<SmolStr>) -> Self {
        Self(id.into())
    }

    /// A fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_smolstr())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// The signed-in user that owns notes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(SmolStr);

impl OwnerId {
    pub fn new(id: impl Into<SmolStr>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Blank ids name nobody.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A note. `content` is canonical Markdown.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub owner: OwnerId,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// A note created now.
    pub fn new(id: DocumentId, owner: OwnerId, title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            owner,
            title: title.into(),
            content: content.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply the fields a patch carries.
    pub fn apply(&mut self, patch: &DocumentPatch) {
        if let Some(content) = &patch.content {
            self.content = content.clone();
        }
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
    }
}

/// Partial update of a note. Absent fields are left alone.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl DocumentPatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            title: None,
        }
    }

    pub fn title(title: impl Into<String>) -> Self {
        Self {
            content: None,
            title: Some(title.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.title.is_none()
    }
}

/// Sort newest first, the order note lists are shown in.
pub fn sort_by_updated(documents: &mut [Document]) {
    documents.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_patch_applies_present_fields() {
        let mut doc = Document::new("a".into(), OwnerId::new("me"), "Title", "body");
        doc.apply(&DocumentPatch::title("Renamed"));
        assert_eq!((doc.title.as_str(), doc.content.as_str()), ("Renamed", "body"));
        doc.apply(&DocumentPatch::content("new body"));
        assert_eq!((doc.title.as_str(), doc.content.as_str()), ("Renamed", "new body"));
    }

    #[test]
    fn test_patch_wire_form_omits_absent_fields() {
        let json = serde_json::to_string(&DocumentPatch::title("t")).unwrap();
        assert_eq!(json, r#"{"title":"t"}"#);
    }

    #[test]
    fn test_sort_newest_first() {
        let mut old = Document::new("old".into(), OwnerId::new("me"), "", "");
        old.updated_at -= Duration::hours(1);
        let new = Document::new("new".into(), OwnerId::new("me"), "", "");
        let mut docs = vec![old, new];
        sort_by_updated(&mut docs);
        assert_eq!(docs[0].id.as_str(), "new");
    }

    #[test]
    fn test_generated_ids_differ() {
        assert_ne!(DocumentId::generate(), DocumentId::generate());
    }
}
