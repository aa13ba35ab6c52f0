//! The boundary to the remote database and file storage.

use std::future::Future;

use miette::Diagnostic;
use thiserror::Error;

use crate::document::{Document, DocumentId, DocumentPatch, OwnerId};

/// A remote persistence call failed.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum WriteError {
    #[error("remote store unreachable: {0}")]
    #[diagnostic(code(quire::sync::unreachable))]
    Unreachable(String),

    #[error("document {0} not found in the remote store")]
    #[diagnostic(code(quire::sync::not_found))]
    NotFound(DocumentId),

    #[error("not allowed to modify document {0}")]
    #[diagnostic(code(quire::sync::denied), help("sign in as the note's owner"))]
    Denied(DocumentId),

    #[error("remote store rejected the request: {0}")]
    #[diagnostic(code(quire::sync::rejected))]
    Rejected(String),
}

/// A binary upload failed. Nothing was stored.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum UploadError {
    #[error("a file already exists at {path}")]
    #[diagnostic(code(quire::upload::exists), help("upload with overwrite enabled to replace it"))]
    AlreadyExists { path: String },

    #[error("upload of {size} bytes exceeds the {limit} byte limit")]
    #[diagnostic(code(quire::upload::too_large))]
    TooLarge { size: usize, limit: usize },

    #[error("upload failed: {0}")]
    #[diagnostic(code(quire::upload::failed))]
    Failed(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// Replace an existing file at the same path.
    pub overwrite: bool,
}

/// Remote note storage plus binary uploads.
///
/// Futures are not required to be `Send`: the driver runs them on a
/// single-threaded runtime.
pub trait RemoteStore {
    /// All notes of `owner`, most recently updated first.
    fn list(&self, owner: &OwnerId) -> impl Future<Output = Result<Vec<Document>, WriteError>>;

    fn create(
        &self,
        owner: &OwnerId,
        title: &str,
        content: &str,
    ) -> impl Future<Output = Result<Document, WriteError>>;

    fn update(
        &self,
        id: &DocumentId,
        patch: DocumentPatch,
    ) -> impl Future<Output = Result<(), WriteError>>;

    fn delete(&self, id: &DocumentId) -> impl Future<Output = Result<(), WriteError>>;

    /// Store `bytes` at `path`, returning the public URL.
    fn upload_binary(
        &self,
        path: &str,
        bytes: Vec<u8>,
        options: UploadOptions,
    ) -> impl Future<Output = Result<String, UploadError>>;
}
