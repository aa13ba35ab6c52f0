//! Local key-value storage and the crash-recovery drafts kept in it.
//!
//! ## Storage key strategy
//!
//! Each note has at most one draft, stored under `"quire_draft:{id}"`. A
//! draft is a full overwrite of that key on every edit and is removed once
//! the remote store has acknowledged the same content.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::DocumentId;

/// Prefix for all draft storage keys.
pub const DRAFT_KEY_PREFIX: &str = "quire_draft:";

/// Local storage could not be read or written.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
#[error("local storage unavailable: {reason}")]
#[diagnostic(code(quire::storage::unavailable))]
pub struct StorageUnavailable {
    pub reason: String,
}

impl StorageUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for StorageUnavailable {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// String key-value storage in the manner of a browser's `localStorage`.
pub trait LocalStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageUnavailable>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageUnavailable>;
    fn remove_item(&self, key: &str) -> Result<(), StorageUnavailable>;
    fn keys(&self) -> Result<Vec<String>, StorageUnavailable>;
}

// === In memory ===

/// Shared in-memory storage. Clones see the same map.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    items: Rc<RefCell<BTreeMap<String, String>>>,
    unavailable: Rc<Cell<bool>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail, as a full or disabled browser storage would.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.set(unavailable);
    }

    fn check(&self) -> Result<(), StorageUnavailable> {
        if self.unavailable.get() {
            return Err(StorageUnavailable::new("storage disabled"));
        }
        Ok(())
    }
}

impl LocalStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageUnavailable> {
        self.check()?;
        Ok(self.items.borrow().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageUnavailable> {
        self.check()?;
        self.items.borrow_mut().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageUnavailable> {
        self.check()?;
        self.items.borrow_mut().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageUnavailable> {
        self.check()?;
        Ok(self.items.borrow().keys().cloned().collect())
    }
}

// === On disk ===

/// One file per key in a directory. Writes go through a temporary file in
/// the same directory and a rename, so a crash never leaves half a value.
#[derive(Clone, Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Storage rooted at `dir`, created if missing.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageUnavailable> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(encode_key(key))
    }
}

impl LocalStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageUnavailable> {
        match fs::read_to_string(self.path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageUnavailable> {
        let mut file = tempfile::NamedTempFile::new_in(&self.dir)?;
        file.write_all(value.as_bytes())?;
        file.persist(self.path(key))
            .map_err(|err| StorageUnavailable::from(err.error))?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageUnavailable> {
        match fs::remove_file(self.path(key)) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StorageUnavailable> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            // Temporary files from interrupted writes have no decodable name.
            if let Some(key) = entry.file_name().to_str().and_then(decode_key) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Keys become file names: alphanumerics, `-` and `_` stay, every other
/// byte is written as `%XX`, and a `.kv` extension marks the file as ours.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 3);
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out.push_str(".kv");
    out
}

fn decode_key(name: &str) -> Option<String> {
    let encoded = name.strip_suffix(".kv")?;
    let mut bytes = Vec::with_capacity(encoded.len());
    let mut iter = encoded.bytes();
    while let Some(byte) = iter.next() {
        if byte == b'%' {
            let hi = (iter.next()? as char).to_digit(16)?;
            let lo = (iter.next()? as char).to_digit(16)?;
            bytes.push((hi * 16 + lo) as u8);
        } else {
            bytes.push(byte);
        }
    }
    String::from_utf8(bytes).ok()
}

// === Drafts ===

/// The last edited content of a note that may not have reached the remote
/// store yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDraft {
    pub id: DocumentId,
    pub content: String,
    pub captured_at: DateTime<Utc>,
}

impl PendingDraft {
    pub fn new(id: DocumentId, content: impl Into<String>) -> Self {
        Self {
            id,
            content: content.into(),
            captured_at: Utc::now(),
        }
    }
}

/// Build the full storage key for a note's draft.
pub fn draft_key(id: &DocumentId) -> String {
    format!("{DRAFT_KEY_PREFIX}{id}")
}

/// Drafts on top of any [`LocalStorage`].
#[derive(Clone, Debug, Default)]
pub struct DraftStore<L> {
    storage: L,
}

impl<L: LocalStorage> DraftStore<L> {
    pub fn new(storage: L) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &L {
        &self.storage
    }

    pub fn save(&self, draft: &PendingDraft) -> Result<(), StorageUnavailable> {
        let json = serde_json::to_string(draft).map_err(|err| StorageUnavailable::new(err.to_string()))?;
        self.storage.set_item(&draft_key(&draft.id), &json)
    }

    /// The stored draft for `id`. An unreadable entry counts as none.
    pub fn load(&self, id: &DocumentId) -> Result<Option<PendingDraft>, StorageUnavailable> {
        let Some(json) = self.storage.get_item(&draft_key(id))? else {
            return Ok(None);
        };
        match serde_json::from_str(&json) {
            Ok(draft) => Ok(Some(draft)),
            Err(err) => {
                tracing::debug!(target: "quire::drafts", %id, error = %err, "ignoring unreadable draft");
                Ok(None)
            }
        }
    }

    pub fn clear(&self, id: &DocumentId) -> Result<(), StorageUnavailable> {
        self.storage.remove_item(&draft_key(id))
    }

    /// Clear the draft only while it still holds `content`. Returns whether
    /// it was cleared.
    pub fn clear_if_matches(&self, id: &DocumentId, content: &str) -> Result<bool, StorageUnavailable> {
        match self.load(id)? {
            Some(draft) if draft.content == content => {
                self.clear(id)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Every readable draft, oldest capture first.
    pub fn list(&self) -> Result<Vec<PendingDraft>, StorageUnavailable> {
        let mut drafts = Vec::new();
        for key in self.storage.keys()? {
            let Some(id) = key.strip_prefix(DRAFT_KEY_PREFIX) else {
                continue;
            };
            if let Some(draft) = self.load(&DocumentId::new(id))? {
                drafts.push(draft);
            }
        }
        drafts.sort_by_key(|d| d.captured_at);
        Ok(drafts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_key_format() {
        assert_eq!(draft_key(&DocumentId::new("abc")), "quire_draft:abc");
    }

    #[test]
    fn test_memory_drafts_round_trip() {
        let drafts = DraftStore::new(MemoryStorage::new());
        let id = DocumentId::new("n1");
        let draft = PendingDraft::new(id.clone(), "text");
        drafts.save(&draft).unwrap();
        assert_eq!(drafts.load(&id).unwrap(), Some(draft));

        assert!(!drafts.clear_if_matches(&id, "other").unwrap());
        assert!(drafts.load(&id).unwrap().is_some());
        assert!(drafts.clear_if_matches(&id, "text").unwrap());
        assert!(drafts.load(&id).unwrap().is_none());
    }

    #[test]
    fn test_unavailable_storage_errors() {
        let storage = MemoryStorage::new();
        storage.set_unavailable(true);
        let drafts = DraftStore::new(storage);
        let err = drafts.save(&PendingDraft::new(DocumentId::new("x"), "")).unwrap_err();
        assert_eq!(err.reason, "storage disabled");
    }

    #[test]
    fn test_garbage_draft_is_ignored() {
        let storage = MemoryStorage::new();
        storage.set_item("quire_draft:x", "not json").unwrap();
        storage.set_item("unrelated", "1").unwrap();
        let drafts = DraftStore::new(storage);
        assert_eq!(drafts.load(&DocumentId::new("x")).unwrap(), None);
        assert!(drafts.list().unwrap().is_empty());
    }

    #[test]
    fn test_file_storage() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("drafts")).unwrap();
        storage.set_item("quire_draft:a/b", "one").unwrap();
        storage.set_item("quire_draft:a/b", "two").unwrap();
        assert_eq!(storage.get_item("quire_draft:a/b").unwrap().as_deref(), Some("two"));
        assert_eq!(storage.keys().unwrap(), vec!["quire_draft:a/b".to_string()]);

        storage.remove_item("quire_draft:a/b").unwrap();
        storage.remove_item("quire_draft:a/b").unwrap();
        assert_eq!(storage.get_item("quire_draft:a/b").unwrap(), None);
        assert!(storage.keys().unwrap().is_empty());
    }

    #[test]
    fn test_file_drafts_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = DocumentId::new("note-1");
        {
            let drafts = DraftStore::new(FileStorage::open(dir.path()).unwrap());
            drafts.save(&PendingDraft::new(id.clone(), "unsaved")).unwrap();
        }
        let drafts = DraftStore::new(FileStorage::open(dir.path()).unwrap());
        let listed = drafts.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].content, "unsaved");
    }

    #[test]
    fn test_key_encoding_round_trips() {
        for key in ["quire_draft:abc", "a b/c%d", "ünï"] {
            assert_eq!(decode_key(&encode_key(key)).as_deref(), Some(key));
        }
        assert_eq!(decode_key(".tmpXYZ"), None);
    }
}
