//! In-memory [`RemoteStore`] with failure injection and a call log.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

use chrono::Utc;

use crate::document::{Document, DocumentId, DocumentPatch, OwnerId, sort_by_updated};
use crate::gateway::{RemoteStore, UploadError, UploadOptions, WriteError};

/// Which store method a call or injected failure refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Create,
    Update,
    Delete,
    Upload,
}

/// A recorded call, in the order the store received it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    List(OwnerId),
    Create {
        owner: OwnerId,
        title: String,
        content: String,
    },
    Update {
        id: DocumentId,
        patch: DocumentPatch,
    },
    Delete(DocumentId),
    Upload {
        path: String,
        overwrite: bool,
    },
}

#[derive(Default)]
struct Inner {
    documents: Vec<Document>,
    blobs: BTreeMap<String, Vec<u8>>,
    calls: Vec<Call>,
    failing: HashSet<Operation>,
    latency: HashMap<Operation, Duration>,
}

/// Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Rc<RefCell<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(documents: Vec<Document>) -> Self {
        let store = Self::new();
        store.inner.borrow_mut().documents = documents;
        store
    }

    /// Make every later call of `operation` fail until [`recover`](Self::recover).
    pub fn fail(&self, operation: Operation) {
        self.inner.borrow_mut().failing.insert(operation);
    }

    pub fn recover(&self, operation: Operation) {
        self.inner.borrow_mut().failing.remove(&operation);
    }

    /// Delay every call of `operation` by `latency` (tokio time).
    pub fn set_latency(&self, operation: Operation, latency: Duration) {
        self.inner.borrow_mut().latency.insert(operation, latency);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.borrow().calls.clone()
    }

    /// Content writes, in call order.
    pub fn content_writes(&self) -> Vec<(DocumentId, String)> {
        self.inner
            .borrow()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Update { id, patch } => Some((id.clone(), patch.content.clone()?)),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.inner.borrow_mut().calls.clear();
    }

    pub fn document(&self, id: &DocumentId) -> Option<Document> {
        self.inner
            .borrow()
            .documents
            .iter()
            .find(|d| &d.id == id)
            .cloned()
    }

    pub fn documents(&self) -> Vec<Document> {
        self.inner.borrow().documents.clone()
    }

    pub fn blob(&self, path: &str) -> Option<Vec<u8>> {
        self.inner.borrow().blobs.get(path).cloned()
    }

    /// Record the call, then report whether it should fail.
    async fn enter(&self, operation: Operation, call: Call) -> Result<(), String> {
        let latency = {
            let mut inner = self.inner.borrow_mut();
            inner.calls.push(call);
            inner.latency.get(&operation).copied()
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.inner.borrow().failing.contains(&operation) {
            return Err(format!("injected {operation:?} failure"));
        }
        Ok(())
    }
}

impl RemoteStore for MemoryStore {
    async fn list(&self, owner: &OwnerId) -> Result<Vec<Document>, WriteError> {
        self.enter(Operation::List, Call::List(owner.clone()))
            .await
            .map_err(WriteError::Unreachable)?;
        let mut documents: Vec<Document> = self
            .inner
            .borrow()
            .documents
            .iter()
            .filter(|d| &d.owner == owner)
            .cloned()
            .collect();
        sort_by_updated(&mut documents);
        Ok(documents)
    }

    async fn create(&self, owner: &OwnerId, title: &str, content: &str) -> Result<Document, WriteError> {
        let call = Call::Create {
            owner: owner.clone(),
            title: title.to_string(),
            content: content.to_string(),
        };
        self.enter(Operation::Create, call)
            .await
            .map_err(WriteError::Unreachable)?;
        let document = Document::new(DocumentId::generate(), owner.clone(), title, content);
        self.inner.borrow_mut().documents.push(document.clone());
        Ok(document)
    }

    async fn update(&self, id: &DocumentId, patch: DocumentPatch) -> Result<(), WriteError> {
        let call = Call::Update {
            id: id.clone(),
            patch: patch.clone(),
        };
        self.enter(Operation::Update, call)
            .await
            .map_err(WriteError::Unreachable)?;
        let mut inner = self.inner.borrow_mut();
        let document = inner
            .documents
            .iter_mut()
            .find(|d| &d.id == id)
            .ok_or_else(|| WriteError::NotFound(id.clone()))?;
        document.apply(&patch);
        document.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: &DocumentId) -> Result<(), WriteError> {
        self.enter(Operation::Delete, Call::Delete(id.clone()))
            .await
            .map_err(WriteError::Unreachable)?;
        let mut inner = self.inner.borrow_mut();
        let before = inner.documents.len();
        inner.documents.retain(|d| &d.id != id);
        if inner.documents.len() == before {
            return Err(WriteError::NotFound(id.clone()));
        }
        Ok(())
    }

    async fn upload_binary(
        &self,
        path: &str,
        bytes: Vec<u8>,
        options: UploadOptions,
    ) -> Result<String, UploadError> {
        let call = Call::Upload {
            path: path.to_string(),
            overwrite: options.overwrite,
        };
        self.enter(Operation::Upload, call)
            .await
            .map_err(UploadError::Failed)?;
        let mut inner = self.inner.borrow_mut();
        if !options.overwrite && inner.blobs.contains_key(path) {
            return Err(UploadError::AlreadyExists {
                path: path.to_string(),
            });
        }
        inner.blobs.insert(path.to_string(), bytes);
        Ok(format!("memory://{path}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_update_list() {
        let store = MemoryStore::new();
        let owner = OwnerId::new("me");
        let doc = store.create(&owner, "T", "").await.unwrap();
        store.update(&doc.id, DocumentPatch::content("hi")).await.unwrap();

        let listed = store.list(&owner).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].content, "hi");
        assert!(store.list(&OwnerId::new("other")).await.unwrap().is_empty());
        assert_eq!(store.content_writes(), vec![(doc.id, "hi".to_string())]);
    }

    #[tokio::test]
    async fn test_injected_failure_is_recorded() {
        let store = MemoryStore::new();
        store.fail(Operation::Update);
        let id = DocumentId::new("x");
        let err = store.update(&id, DocumentPatch::content("a")).await.unwrap_err();
        assert!(matches!(err, WriteError::Unreachable(_)));
        assert_eq!(store.calls().len(), 1);

        store.recover(Operation::Update);
        let err = store.update(&id, DocumentPatch::content("a")).await.unwrap_err();
        assert_eq!(err, WriteError::NotFound(id));
    }

    #[tokio::test]
    async fn test_upload_respects_overwrite() {
        let store = MemoryStore::new();
        let url = store
            .upload_binary("a/b.png", vec![1], UploadOptions::default())
            .await
            .unwrap();
        assert_eq!(url, "memory://a/b.png");
        let err = store
            .upload_binary("a/b.png", vec![2], UploadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::AlreadyExists { .. }));
        store
            .upload_binary("a/b.png", vec![2], UploadOptions { overwrite: true })
            .await
            .unwrap();
        assert_eq!(store.blob("a/b.png"), Some(vec![2]));
    }
}
