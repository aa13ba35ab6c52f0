//! The persistence coordinator.
//!
//! Owns the notes collection and the active note id, and decides when the
//! remote store gets written. It performs no IO: every method takes the
//! current instant and returns [`Effect`]s, each tagged with a [`Ticket`].
//! A driver executes them and reports the outcome through
//! [`Coordinator::complete`]. Timers are deadlines the driver waits for
//! before calling [`Coordinator::tick`].
//!
//! Edit cycle of the active note:
//!
//! ```text
//! clean --edit--> dirty (deadline armed) --deadline--> saving --ack--> saved --flash--> clean
//! ```
//!
//! Every edit updates memory, overwrites the crash-recovery draft and
//! re-arms the deadline. Writes in flight are never cancelled; the newest
//! edit schedules its own write.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use miette::Diagnostic;
use quire_common::Config;
use thiserror::Error;
use web_time::Instant;

use crate::document::{COPY_SUFFIX, DEFAULT_TITLE, Document, DocumentId, DocumentPatch, OwnerId, sort_by_updated};
use crate::gateway::WriteError;
use crate::notice::{Notice, NoticeKind};
use crate::status::SaveStatus;
use crate::storage::{DraftStore, LocalStorage, PendingDraft};

/// Timing knobs of the save pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Quiet time after the last edit before a write is dispatched.
    pub debounce: Duration,
    /// How long `Saved` is shown before reverting to `Idle`.
    pub saved_flash: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1000),
            saved_flash: Duration::from_millis(2000),
        }
    }
}

impl From<&Config> for CoordinatorConfig {
    fn from(config: &Config) -> Self {
        Self {
            debounce: Duration::from_millis(config.debounce_ms),
            saved_flash: Duration::from_millis(config.saved_flash_ms),
        }
    }
}

/// Caller misuse of the coordinator.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LifecycleError {
    #[error("no owner is signed in")]
    #[diagnostic(code(quire::sync::no_owner), help("sign in before creating notes"))]
    NoOwner,

    #[error("unknown document {0}")]
    #[diagnostic(code(quire::sync::unknown_document))]
    UnknownDocument(DocumentId),

    #[error("nothing to restore")]
    #[diagnostic(code(quire::sync::nothing_to_restore))]
    NothingToRestore,
}

/// Identifies one remote call from dispatch to completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(u64);

/// A remote call the driver must perform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    List {
        ticket: Ticket,
        owner: OwnerId,
    },
    Create {
        ticket: Ticket,
        owner: OwnerId,
        title: String,
        content: String,
    },
    Update {
        ticket: Ticket,
        id: DocumentId,
        patch: DocumentPatch,
    },
    Delete {
        ticket: Ticket,
        id: DocumentId,
    },
}

impl Effect {
    pub fn ticket(&self) -> Ticket {
        match self {
            Effect::List { ticket, .. }
            | Effect::Create { ticket, .. }
            | Effect::Update { ticket, .. }
            | Effect::Delete { ticket, .. } => *ticket,
        }
    }
}

/// Outcome of an [`Effect`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion {
    Listed(Result<Vec<Document>, WriteError>),
    Created(Result<Document, WriteError>),
    Updated(Result<(), WriteError>),
    Deleted(Result<(), WriteError>),
}

#[derive(Debug)]
enum CreateKind {
    New,
    Duplicate,
    Restore(Document),
}

#[derive(Debug)]
enum Request {
    List,
    Create(CreateKind),
    /// `cycle` is set for debounced writes of the active note, unset for
    /// switch flushes.
    Save {
        id: DocumentId,
        content: String,
        cycle: Option<u64>,
    },
    Rename {
        id: DocumentId,
        title: String,
    },
    Delete {
        id: DocumentId,
    },
}

#[derive(Debug)]
struct Debounce {
    id: DocumentId,
    deadline: Instant,
}

#[derive(Debug)]
struct Flash {
    deadline: Instant,
    cycle: u64,
}

pub struct Coordinator<L> {
    config: CoordinatorConfig,
    drafts: DraftStore<L>,
    owner: Option<OwnerId>,
    notes: Vec<Document>,
    active: Option<DocumentId>,
    status: SaveStatus,
    /// Bumped each time a debounced write is dispatched.
    cycle: u64,
    debounce: Option<Debounce>,
    flash: Option<Flash>,
    requests: HashMap<Ticket, Request>,
    next_ticket: u64,
    last_deleted: Option<Document>,
    notices: Vec<Notice>,
}

impl<L: LocalStorage> Coordinator<L> {
    pub fn new(config: CoordinatorConfig, storage: L) -> Self {
        Self {
            config,
            drafts: DraftStore::new(storage),
            owner: None,
            notes: Vec::new(),
            active: None,
            status: SaveStatus::Idle,
            cycle: 0,
            debounce: None,
            flash: None,
            requests: HashMap::new(),
            next_ticket: 0,
            last_deleted: None,
            notices: Vec::new(),
        }
    }

    // === Queries ===

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn drafts(&self) -> &DraftStore<L> {
        &self.drafts
    }

    pub fn owner(&self) -> Option<&OwnerId> {
        self.owner.as_ref().filter(|o| !o.is_blank())
    }

    /// Notes in display order.
    pub fn notes(&self) -> &[Document] {
        &self.notes
    }

    pub fn note(&self, id: &DocumentId) -> Option<&Document> {
        self.notes.iter().find(|d| &d.id == id)
    }

    pub fn active_id(&self) -> Option<&DocumentId> {
        self.active.as_ref()
    }

    pub fn active_document(&self) -> Option<&Document> {
        self.note(self.active.as_ref()?)
    }

    pub fn status(&self) -> SaveStatus {
        self.status
    }

    /// An edit is waiting for its debounce deadline.
    pub fn is_dirty(&self) -> bool {
        self.debounce.is_some()
    }

    /// Remote calls dispatched but not yet completed.
    pub fn in_flight(&self) -> usize {
        self.requests.len()
    }

    /// The last deleted note, while it can still be restored.
    pub fn last_deleted(&self) -> Option<&Document> {
        self.last_deleted.as_ref()
    }

    /// Earliest instant at which [`tick`](Self::tick) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        let debounce = self.debounce.as_ref().map(|d| d.deadline);
        let flash = self.flash.as_ref().map(|f| f.deadline);
        match (debounce, flash) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn push_notice(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    // === Inputs ===

    /// Sign in and load the owner's notes.
    pub fn sign_in(&mut self, owner: OwnerId) -> Vec<Effect> {
        if owner.is_blank() {
            tracing::warn!(target: "quire::sync", "blank owner id, staying signed out");
            self.owner = None;
            return Vec::new();
        }
        tracing::debug!(target: "quire::sync", %owner, "signing in");
        self.owner = Some(owner.clone());
        let ticket = self.issue(Request::List);
        vec![Effect::List { ticket, owner }]
    }

    /// Flush any pending edit and forget the collection.
    pub fn sign_out(&mut self) -> Vec<Effect> {
        let effects = self.activate(None);
        self.owner = None;
        self.notes.clear();
        self.last_deleted = None;
        effects
    }

    /// Re-list the owner's notes.
    pub fn reload(&mut self) -> Result<Vec<Effect>, LifecycleError> {
        let owner = self.owner().cloned().ok_or(LifecycleError::NoOwner)?;
        Ok(self.sign_in(owner))
    }

    /// The active note's content changed.
    pub fn edit(&mut self, content: String, now: Instant) {
        let Some(id) = self.active.clone() else {
            tracing::debug!(target: "quire::sync", "edit without an active note ignored");
            return;
        };
        let Some(note) = self.notes.iter_mut().find(|d| d.id == id) else {
            return;
        };
        note.content.clone_from(&content);
        self.store_draft(&id, content);
        let deadline = now + self.config.debounce;
        tracing::trace!(target: "quire::sync", %id, "debounce armed");
        self.debounce = Some(Debounce { id, deadline });
    }

    /// Fire whatever deadlines have passed.
    pub fn tick(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();

        if let Some(Debounce { id, .. }) = self.debounce.take_if(|d| d.deadline <= now) {
            if let Some(content) = self.note(&id).map(|d| d.content.clone()) {
                self.cycle += 1;
                if self.is_active(&id) {
                    self.status = SaveStatus::Saving;
                    self.flash = None;
                }
                tracing::debug!(target: "quire::sync", %id, cycle = self.cycle, "debounce elapsed, saving");
                effects.push(self.save(id, content, Some(self.cycle)));
            }
        }

        if let Some(flash) = self.flash.take_if(|f| f.deadline <= now) {
            if flash.cycle == self.cycle && self.status == SaveStatus::Saved {
                self.status = SaveStatus::Idle;
            }
        }

        effects
    }

    /// Make `id` the active note.
    pub fn switch(&mut self, id: &DocumentId) -> Result<Vec<Effect>, LifecycleError> {
        if self.active.as_ref() == Some(id) {
            return Ok(Vec::new());
        }
        if self.note(id).is_none() {
            return Err(LifecycleError::UnknownDocument(id.clone()));
        }
        Ok(self.activate(Some(id.clone())))
    }

    /// Create an untitled, empty note.
    pub fn create(&mut self) -> Result<Vec<Effect>, LifecycleError> {
        self.create_with(DEFAULT_TITLE, "")
    }

    pub fn create_with(&mut self, title: &str, content: &str) -> Result<Vec<Effect>, LifecycleError> {
        self.dispatch_create(CreateKind::New, title.to_string(), content.to_string())
    }

    /// Create a copy of `id` with its current title and content.
    pub fn duplicate(&mut self, id: &DocumentId) -> Result<Vec<Effect>, LifecycleError> {
        let source = self
            .note(id)
            .ok_or_else(|| LifecycleError::UnknownDocument(id.clone()))?;
        let title = format!("{}{COPY_SUFFIX}", source.title);
        let content = source.content.clone();
        self.dispatch_create(CreateKind::Duplicate, title, content)
    }

    /// Re-create the last deleted note under a new id.
    pub fn undo_delete(&mut self) -> Result<Vec<Effect>, LifecycleError> {
        if self.owner().is_none() {
            return Err(LifecycleError::NoOwner);
        }
        let deleted = self.last_deleted.take().ok_or(LifecycleError::NothingToRestore)?;
        let (title, content) = (deleted.title.clone(), deleted.content.clone());
        self.dispatch_create(CreateKind::Restore(deleted), title, content)
    }

    /// Rename remotely; the local title follows on success.
    pub fn rename(&mut self, id: &DocumentId, title: &str) -> Result<Vec<Effect>, LifecycleError> {
        if self.note(id).is_none() {
            return Err(LifecycleError::UnknownDocument(id.clone()));
        }
        let ticket = self.issue(Request::Rename {
            id: id.clone(),
            title: title.to_string(),
        });
        Ok(vec![Effect::Update {
            ticket,
            id: id.clone(),
            patch: DocumentPatch::title(title),
        }])
    }

    /// Delete remotely; the local note goes on success.
    pub fn delete(&mut self, id: &DocumentId) -> Result<Vec<Effect>, LifecycleError> {
        if self.note(id).is_none() {
            return Err(LifecycleError::UnknownDocument(id.clone()));
        }
        let ticket = self.issue(Request::Delete { id: id.clone() });
        Ok(vec![Effect::Delete {
            ticket,
            id: id.clone(),
        }])
    }

    /// A stored draft of `id` whose content differs from what is in memory.
    pub fn recoverable_draft(&self, id: &DocumentId) -> Option<PendingDraft> {
        let note = self.note(id)?;
        match self.drafts.load(id) {
            Ok(Some(draft)) if draft.content != note.content => Some(draft),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(target: "quire::sync", %id, error = %err, "could not read draft");
                None
            }
        }
    }

    /// Activate `id` and apply its recoverable draft as an edit.
    pub fn restore_draft(&mut self, id: &DocumentId, now: Instant) -> Result<Vec<Effect>, LifecycleError> {
        let draft = self
            .recoverable_draft(id)
            .ok_or(LifecycleError::NothingToRestore)?;
        let effects = self.switch(id)?;
        tracing::info!(target: "quire::sync", %id, captured_at = %draft.captured_at, "restoring draft");
        self.edit(draft.content, now);
        Ok(effects)
    }

    /// Feed back the outcome of an effect.
    pub fn complete(&mut self, ticket: Ticket, completion: Completion, now: Instant) -> Vec<Effect> {
        let Some(request) = self.requests.remove(&ticket) else {
            tracing::warn!(target: "quire::sync", ?ticket, "completion for unknown ticket");
            return Vec::new();
        };
        match (request, completion) {
            (Request::List, Completion::Listed(result)) => self.on_listed(result),
            (Request::Create(kind), Completion::Created(result)) => self.on_created(kind, result),
            (Request::Save { id, content, cycle }, Completion::Updated(result)) => {
                self.on_saved(id, content, cycle, result, now);
                Vec::new()
            }
            (Request::Rename { id, title }, Completion::Updated(result)) => {
                self.on_renamed(id, title, result);
                Vec::new()
            }
            (Request::Delete { id }, Completion::Deleted(result)) => self.on_deleted(id, result),
            (request, completion) => {
                tracing::warn!(target: "quire::sync", ?request, ?completion, "completion does not match request");
                Vec::new()
            }
        }
    }

    // === Internals ===

    fn issue(&mut self, request: Request) -> Ticket {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        self.requests.insert(ticket, request);
        ticket
    }

    fn is_active(&self, id: &DocumentId) -> bool {
        self.active.as_ref() == Some(id)
    }

    fn save(&mut self, id: DocumentId, content: String, cycle: Option<u64>) -> Effect {
        let patch = DocumentPatch::content(content.clone());
        let ticket = self.issue(Request::Save {
            id: id.clone(),
            content,
            cycle,
        });
        Effect::Update { ticket, id, patch }
    }

    fn dispatch_create(
        &mut self,
        kind: CreateKind,
        title: String,
        content: String,
    ) -> Result<Vec<Effect>, LifecycleError> {
        let Some(owner) = self.owner().cloned() else {
            if let CreateKind::Restore(deleted) = kind {
                self.last_deleted = Some(deleted);
            }
            return Err(LifecycleError::NoOwner);
        };
        let ticket = self.issue(Request::Create(kind));
        Ok(vec![Effect::Create {
            ticket,
            owner,
            title,
            content,
        }])
    }

    /// The switch protocol: cancel the outgoing note's debounce, write its
    /// last content once if one was pending, then activate `target`.
    fn activate(&mut self, target: Option<DocumentId>) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(Debounce { id, .. }) = self.debounce.take() {
            if let Some(content) = self.note(&id).map(|d| d.content.clone()) {
                tracing::debug!(target: "quire::sync", %id, "flushing pending edit");
                self.clear_draft(&id);
                effects.push(self.save(id, content, None));
            }
        }
        self.active = target;
        self.status = SaveStatus::Idle;
        self.flash = None;
        effects
    }

    fn store_draft(&self, id: &DocumentId, content: String) {
        if let Err(err) = self.drafts.save(&PendingDraft::new(id.clone(), content)) {
            tracing::warn!(target: "quire::sync", %id, error = %err, "could not store draft");
        }
    }

    fn clear_draft(&self, id: &DocumentId) {
        if let Err(err) = self.drafts.clear(id) {
            tracing::warn!(target: "quire::sync", %id, error = %err, "could not clear draft");
        }
    }

    fn on_listed(&mut self, result: Result<Vec<Document>, WriteError>) -> Vec<Effect> {
        match result {
            Ok(mut documents) => {
                sort_by_updated(&mut documents);
                let first = documents.first().map(|d| d.id.clone());
                let effects = self.activate(first);
                tracing::info!(target: "quire::sync", count = documents.len(), "notes loaded");
                self.notes = documents;
                effects
            }
            Err(err) => {
                tracing::warn!(target: "quire::sync", error = %err, "listing notes failed");
                self.push_notice(Notice::new(NoticeKind::LoadFailed, None, err.to_string()));
                Vec::new()
            }
        }
    }

    fn on_created(&mut self, kind: CreateKind, result: Result<Document, WriteError>) -> Vec<Effect> {
        match result {
            Ok(document) => {
                let id = document.id.clone();
                tracing::info!(target: "quire::sync", %id, title = %document.title, ?kind, "note created");
                self.notes.insert(0, document);
                self.activate(Some(id))
            }
            Err(err) => {
                tracing::warn!(target: "quire::sync", error = %err, ?kind, "creating note failed");
                if let CreateKind::Restore(deleted) = kind {
                    self.last_deleted.get_or_insert(deleted);
                }
                self.push_notice(Notice::new(NoticeKind::CreateFailed, None, err.to_string()));
                Vec::new()
            }
        }
    }

    fn on_saved(
        &mut self,
        id: DocumentId,
        content: String,
        cycle: Option<u64>,
        result: Result<(), WriteError>,
        now: Instant,
    ) {
        let current = cycle.is_some() && cycle == Some(self.cycle) && self.is_active(&id);
        match result {
            Ok(()) => {
                match self.drafts.clear_if_matches(&id, &content) {
                    Ok(cleared) => {
                        tracing::debug!(target: "quire::sync", %id, draft_cleared = cleared, "note saved")
                    }
                    Err(err) => {
                        tracing::warn!(target: "quire::sync", %id, error = %err, "could not clear draft")
                    }
                }
                if let Some(note) = self.notes.iter_mut().find(|d| d.id == id) {
                    note.updated_at = Utc::now();
                }
                if current {
                    self.status = SaveStatus::Saved;
                    self.flash = Some(Flash {
                        deadline: now + self.config.saved_flash,
                        cycle: self.cycle,
                    });
                }
            }
            Err(err) => {
                tracing::warn!(target: "quire::sync", %id, error = %err, "saving note failed");
                if current {
                    self.status = SaveStatus::Idle;
                }
                // A switch flush cleared the draft up front; put it back.
                if matches!(self.drafts.load(&id), Ok(None)) {
                    self.store_draft(&id, content);
                }
                self.push_notice(Notice::new(NoticeKind::WriteFailed, Some(id), err.to_string()));
            }
        }
    }

    fn on_renamed(&mut self, id: DocumentId, title: String, result: Result<(), WriteError>) {
        match result {
            Ok(()) => {
                tracing::info!(target: "quire::sync", %id, %title, "note renamed");
                if let Some(note) = self.notes.iter_mut().find(|d| d.id == id) {
                    note.title = title;
                }
            }
            Err(err) => {
                tracing::warn!(target: "quire::sync", %id, error = %err, "renaming note failed");
                self.push_notice(Notice::new(NoticeKind::RenameFailed, Some(id), err.to_string()));
            }
        }
    }

    fn on_deleted(&mut self, id: DocumentId, result: Result<(), WriteError>) -> Vec<Effect> {
        if let Err(err) = result {
            tracing::warn!(target: "quire::sync", %id, error = %err, "deleting note failed");
            self.push_notice(Notice::new(NoticeKind::DeleteFailed, Some(id), err.to_string()));
            return Vec::new();
        }
        let Some(index) = self.notes.iter().position(|d| d.id == id) else {
            return Vec::new();
        };
        let removed = self.notes.remove(index);
        if self.debounce.as_ref().is_some_and(|d| d.id == id) {
            self.debounce = None;
        }
        self.clear_draft(&id);
        tracing::info!(target: "quire::sync", %id, "note deleted");
        self.last_deleted = Some(removed);
        if self.is_active(&id) {
            let next = self.notes.first().map(|d| d.id.clone());
            return self.activate(next);
        }
        Vec::new()
    }
}
