//! quire-sync: getting editor content into the remote store without losing it.
//!
//! - `document` - notes, ids and patches
//! - `gateway` - the `RemoteStore` boundary and its errors
//! - `memory` - an in-memory `RemoteStore` for tests and tooling
//! - `storage` - local key-value storage and crash-recovery drafts
//! - `coordinator` - the sans-IO save and lifecycle state machine
//! - `runtime` - the Tokio driver executing coordinator effects
//! - `session` - one editor wired to a driver
//! - `title` - the title field reducer

pub mod coordinator;
pub mod document;
pub mod gateway;
pub mod memory;
pub mod notice;
pub mod runtime;
pub mod session;
pub mod status;
pub mod storage;
pub mod title;

pub use coordinator::{Completion, Coordinator, CoordinatorConfig, Effect, LifecycleError, Ticket};
pub use document::{Document, DocumentId, DocumentPatch, OwnerId};
pub use gateway::{RemoteStore, UploadError, UploadOptions, WriteError};
pub use memory::MemoryStore;
pub use notice::{Notice, NoticeKind};
pub use runtime::Driver;
pub use session::EditorSession;
pub use status::SaveStatus;
pub use storage::{DraftStore, FileStorage, LocalStorage, MemoryStorage, PendingDraft, StorageUnavailable};
pub use title::{TitleEvent, TitleField};
