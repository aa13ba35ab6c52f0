//! User-facing failure notices.
//!
//! The coordinator queues these; the presentation layer drains and shows
//! them however it likes.

use std::fmt;

use crate::document::DocumentId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    LoadFailed,
    WriteFailed,
    CreateFailed,
    RenameFailed,
    DeleteFailed,
    UploadFailed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    /// The note concerned, when there is one.
    pub document: Option<DocumentId>,
    pub message: String,
}

impl Notice {
    pub fn new(kind: NoticeKind, document: Option<DocumentId>, message: impl Into<String>) -> Self {
        Self {
            kind,
            document,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            NoticeKind::LoadFailed => "Could not load notes",
            NoticeKind::WriteFailed => "Could not save note",
            NoticeKind::CreateFailed => "Could not create note",
            NoticeKind::RenameFailed => "Could not rename note",
            NoticeKind::DeleteFailed => "Could not delete note",
            NoticeKind::UploadFailed => "Could not upload file",
        };
        write!(f, "{what}: {}", self.message)
    }
}
