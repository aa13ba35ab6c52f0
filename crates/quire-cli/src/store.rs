//! A [`RemoteStore`] backed by a JSON file in the data directory.
//!
//! All notes live in `notes.json`; uploaded binaries go under `blobs/`.
//! The notes file is rewritten whole through a temp file and rename.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use quire_sync::{Document, DocumentId, DocumentPatch, OwnerId, RemoteStore, UploadError, UploadOptions, WriteError};

pub const NOTES_FILE: &str = "notes.json";
pub const BLOBS_DIR: &str = "blobs";
/// Uploads above this size are refused.
pub const DEFAULT_MAX_UPLOAD: usize = 10 * 1024 * 1024;

fn unreachable(err: impl std::fmt::Display) -> WriteError {
    WriteError::Unreachable(err.to_string())
}

pub struct JsonFileStore {
    dir: PathBuf,
    max_upload: usize,
}

impl JsonFileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            max_upload: DEFAULT_MAX_UPLOAD,
        }
    }

    pub fn with_max_upload(mut self, limit: usize) -> Self {
        self.max_upload = limit;
        self
    }

    pub fn notes_path(&self) -> PathBuf {
        self.dir.join(NOTES_FILE)
    }

    async fn read(&self) -> Result<Vec<Document>, WriteError> {
        let path = self.notes_path();
        match tokio::fs::read_to_string(&path).await {
            Ok(src) => serde_json::from_str(&src)
                .map_err(|err| WriteError::Rejected(format!("{} is not a notes file: {err}", path.display()))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(unreachable(err)),
        }
    }

    async fn write(&self, documents: &[Document]) -> Result<(), WriteError> {
        let json = serde_json::to_string_pretty(documents).map_err(|err| WriteError::Rejected(err.to_string()))?;
        tokio::fs::create_dir_all(&self.dir).await.map_err(unreachable)?;
        let temp = tempfile::NamedTempFile::new_in(&self.dir).map_err(unreachable)?;
        tokio::fs::write(temp.path(), json).await.map_err(unreachable)?;
        temp.persist(self.notes_path())
            .map_err(|err| unreachable(err.error))?;
        Ok(())
    }

    /// Where `path` lands under the blobs directory, if it stays inside it.
    fn blob_path(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path);
        let inside = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        (inside && !path.is_empty()).then(|| self.dir.join(BLOBS_DIR).join(relative))
    }
}

impl RemoteStore for JsonFileStore {
    async fn list(&self, owner: &OwnerId) -> Result<Vec<Document>, WriteError> {
        let mut documents = self.read().await?;
        documents.retain(|d| &d.owner == owner);
        quire_sync::document::sort_by_updated(&mut documents);
        Ok(documents)
    }

    async fn create(&self, owner: &OwnerId, title: &str, content: &str) -> Result<Document, WriteError> {
        let mut documents = self.read().await?;
        let document = Document::new(DocumentId::generate(), owner.clone(), title, content);
        documents.push(document.clone());
        self.write(&documents).await?;
        Ok(document)
    }

    async fn update(&self, id: &DocumentId, patch: DocumentPatch) -> Result<(), WriteError> {
        let mut documents = self.read().await?;
        let document = documents
            .iter_mut()
            .find(|d| &d.id == id)
            .ok_or_else(|| WriteError::NotFound(id.clone()))?;
        document.apply(&patch);
        document.updated_at = Utc::now();
        self.write(&documents).await
    }

    async fn delete(&self, id: &DocumentId) -> Result<(), WriteError> {
        let mut documents = self.read().await?;
        let before = documents.len();
        documents.retain(|d| &d.id != id);
        if documents.len() == before {
            return Err(WriteError::NotFound(id.clone()));
        }
        self.write(&documents).await
    }

    async fn upload_binary(
        &self,
        path: &str,
        bytes: Vec<u8>,
        options: UploadOptions,
    ) -> Result<String, UploadError> {
        if bytes.len() > self.max_upload {
            return Err(UploadError::TooLarge {
                size: bytes.len(),
                limit: self.max_upload,
            });
        }
        let dest = self
            .blob_path(path)
            .ok_or_else(|| UploadError::Failed(format!("invalid upload path `{path}`")))?;
        if !options.overwrite && tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            return Err(UploadError::AlreadyExists {
                path: path.to_string(),
            });
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| UploadError::Failed(err.to_string()))?;
        }
        tokio::fs::write(&dest, bytes)
            .await
            .map_err(|err| UploadError::Failed(err.to_string()))?;
        let absolute = std::path::absolute(&dest).unwrap_or(dest);
        Ok(format!("file://{}", absolute.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let owner = OwnerId::new("me");
        assert!(store.list(&owner).await.unwrap().is_empty());

        let doc = store.create(&owner, "Plans", "- [ ] ship").await.unwrap();
        store
            .update(&doc.id, DocumentPatch::title("Roadmap"))
            .await
            .unwrap();

        let reopened = JsonFileStore::new(dir.path());
        let listed = reopened.list(&owner).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "Roadmap");
        assert_eq!(listed[0].content, "- [ ] ship");
        assert!(reopened.list(&OwnerId::new("else")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_document_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let id = DocumentId::new("nope");
        assert_eq!(store.delete(&id).await, Err(WriteError::NotFound(id.clone())));
        assert_eq!(
            store.update(&id, DocumentPatch::content("x")).await,
            Err(WriteError::NotFound(id))
        );
    }

    #[tokio::test]
    async fn test_corrupt_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(NOTES_FILE), "{ not json").unwrap();
        let store = JsonFileStore::new(dir.path());
        let err = store.list(&OwnerId::new("me")).await.unwrap_err();
        assert!(matches!(err, WriteError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_upload_limits_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).with_max_upload(4);

        let err = store
            .upload_binary("a.bin", vec![0; 5], UploadOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, UploadError::TooLarge { size: 5, limit: 4 });

        let url = store
            .upload_binary("img/a.bin", vec![1, 2], UploadOptions::default())
            .await
            .unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("a.bin"));
        assert_eq!(std::fs::read(dir.path().join("blobs/img/a.bin")).unwrap(), vec![1, 2]);

        let err = store
            .upload_binary("img/a.bin", vec![3], UploadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::AlreadyExists { .. }));
        store
            .upload_binary("img/a.bin", vec![3], UploadOptions { overwrite: true })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_upload_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        for path in ["../x", "/etc/x", ""] {
            let err = store
                .upload_binary(path, vec![1], UploadOptions::default())
                .await
                .unwrap_err();
            assert!(matches!(err, UploadError::Failed(_)), "{path}");
        }
    }
}
