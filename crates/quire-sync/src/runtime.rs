//! Tokio driver for the [`Coordinator`].
//!
//! Runs on a current-thread runtime. Effects become boxed local futures in a
//! [`FuturesUnordered`]; [`Driver::step`] waits for the next completion or
//! timer deadline, whichever comes first, and feeds it back. Input methods
//! never wait on the network.

use std::rc::Rc;

use futures_util::future::LocalBoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, StreamExt};
use tokio::time::sleep_until;
use web_time::Instant;

use crate::coordinator::{Completion, Coordinator, CoordinatorConfig, Effect, LifecycleError, Ticket};
use crate::document::{DocumentId, OwnerId};
use crate::gateway::{RemoteStore, UploadError, UploadOptions};
use crate::notice::{Notice, NoticeKind};
use crate::storage::LocalStorage;

/// The current instant on the Tokio clock, so paused test time applies.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

pub struct Driver<R, L> {
    coordinator: Coordinator<L>,
    store: Rc<R>,
    pending: FuturesUnordered<LocalBoxFuture<'static, (Ticket, Completion)>>,
}

impl<R: RemoteStore + 'static, L: LocalStorage> Driver<R, L> {
    pub fn new(config: CoordinatorConfig, store: R, storage: L) -> Self {
        Self {
            coordinator: Coordinator::new(config, storage),
            store: Rc::new(store),
            pending: FuturesUnordered::new(),
        }
    }

    pub fn coordinator(&self) -> &Coordinator<L> {
        &self.coordinator
    }

    pub fn store(&self) -> &R {
        &self.store
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.coordinator.drain_notices()
    }

    // === Inputs ===

    pub fn sign_in(&mut self, owner: OwnerId) {
        let effects = self.coordinator.sign_in(owner);
        self.dispatch(effects);
    }

    pub fn sign_out(&mut self) {
        let effects = self.coordinator.sign_out();
        self.dispatch(effects);
    }

    pub fn reload(&mut self) -> Result<(), LifecycleError> {
        let effects = self.coordinator.reload()?;
        self.dispatch(effects);
        Ok(())
    }

    pub fn edit(&mut self, content: impl Into<String>) {
        self.coordinator.edit(content.into(), now());
    }

    pub fn switch(&mut self, id: &DocumentId) -> Result<(), LifecycleError> {
        let effects = self.coordinator.switch(id)?;
        self.dispatch(effects);
        Ok(())
    }

    pub fn create(&mut self) -> Result<(), LifecycleError> {
        let effects = self.coordinator.create()?;
        self.dispatch(effects);
        Ok(())
    }

    pub fn create_with(&mut self, title: &str, content: &str) -> Result<(), LifecycleError> {
        let effects = self.coordinator.create_with(title, content)?;
        self.dispatch(effects);
        Ok(())
    }

    pub fn duplicate(&mut self, id: &DocumentId) -> Result<(), LifecycleError> {
        let effects = self.coordinator.duplicate(id)?;
        self.dispatch(effects);
        Ok(())
    }

    pub fn rename(&mut self, id: &DocumentId, title: &str) -> Result<(), LifecycleError> {
        let effects = self.coordinator.rename(id, title)?;
        self.dispatch(effects);
        Ok(())
    }

    pub fn delete(&mut self, id: &DocumentId) -> Result<(), LifecycleError> {
        let effects = self.coordinator.delete(id)?;
        self.dispatch(effects);
        Ok(())
    }

    pub fn undo_delete(&mut self) -> Result<(), LifecycleError> {
        let effects = self.coordinator.undo_delete()?;
        self.dispatch(effects);
        Ok(())
    }

    pub fn restore_draft(&mut self, id: &DocumentId) -> Result<(), LifecycleError> {
        let effects = self.coordinator.restore_draft(id, now())?;
        self.dispatch(effects);
        Ok(())
    }

    /// Upload a binary. Failures are also queued as a notice.
    pub async fn upload(
        &mut self,
        path: &str,
        bytes: Vec<u8>,
        options: UploadOptions,
    ) -> Result<String, UploadError> {
        let size = bytes.len();
        match self.store.upload_binary(path, bytes, options).await {
            Ok(url) => {
                tracing::info!(target: "quire::sync", path, size, %url, "binary uploaded");
                Ok(url)
            }
            Err(err) => {
                tracing::warn!(target: "quire::sync", path, size, error = %err, "upload failed");
                self.coordinator
                    .push_notice(Notice::new(NoticeKind::UploadFailed, None, err.to_string()));
                Err(err)
            }
        }
    }

    // === Event loop ===

    /// Process the next completion or elapsed deadline.
    ///
    /// Returns `false` when there is nothing left to wait for.
    pub async fn step(&mut self) -> bool {
        let deadline = self.coordinator.next_deadline();
        let wake = tokio::time::Instant::from_std(deadline.unwrap_or_else(now));
        tokio::select! {
            Some((ticket, completion)) = self.pending.next(), if !self.pending.is_empty() => {
                let effects = self.coordinator.complete(ticket, completion, now());
                self.dispatch(effects);
                true
            }
            _ = sleep_until(wake), if deadline.is_some() => {
                let effects = self.coordinator.tick(now());
                self.dispatch(effects);
                true
            }
            else => false,
        }
    }

    /// Step until no edit is waiting and no call is in flight.
    pub async fn settle(&mut self) {
        while self.coordinator.is_dirty() || self.coordinator.in_flight() > 0 {
            if !self.step().await {
                break;
            }
        }
    }

    fn dispatch(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            let store = Rc::clone(&self.store);
            let ticket = effect.ticket();
            tracing::trace!(target: "quire::sync", ?ticket, "dispatching");
            let call = async move {
                let completion = match effect {
                    Effect::List { owner, .. } => Completion::Listed(store.list(&owner).await),
                    Effect::Create {
                        owner,
                        title,
                        content,
                        ..
                    } => Completion::Created(store.create(&owner, &title, &content).await),
                    Effect::Update { id, patch, .. } => Completion::Updated(store.update(&id, patch).await),
                    Effect::Delete { id, .. } => Completion::Deleted(store.delete(&id).await),
                };
                (ticket, completion)
            };
            self.pending.push(call.boxed_local());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::document::Document;
    use crate::memory::{MemoryStore, Operation};
    use crate::status::SaveStatus;
    use crate::storage::{DraftStore, MemoryStorage};

    fn owner() -> OwnerId {
        OwnerId::new("me")
    }

    async fn driver_with(notes: &[(&str, &str)]) -> (Driver<MemoryStore, MemoryStorage>, MemoryStore, MemoryStorage) {
        let mut documents = Vec::new();
        for (i, (id, content)) in notes.iter().enumerate() {
            let mut doc = Document::new(DocumentId::new(*id), owner(), id.to_uppercase(), *content);
            doc.updated_at -= chrono::Duration::minutes(i as i64);
            documents.push(doc);
        }
        let store = MemoryStore::with_documents(documents);
        let storage = MemoryStorage::new();
        let mut driver = Driver::new(CoordinatorConfig::default(), store.clone(), storage.clone());
        driver.sign_in(owner());
        driver.settle().await;
        store.clear_calls();
        (driver, store, storage)
    }

    fn id(s: &str) -> DocumentId {
        DocumentId::new(s)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_edits_writes_once_after_quiet_period() {
        let (mut driver, store, _) = driver_with(&[("a", ""), ("b", "")]).await;
        let start = tokio::time::Instant::now();
        for text in ["h", "he", "hel", "hell", "hello"] {
            driver.edit(text);
            tokio::time::advance(Duration::from_millis(200)).await;
        }
        driver.settle().await;

        assert_eq!(store.content_writes(), vec![(id("a"), "hello".to_string())]);
        assert!(tokio::time::Instant::now() - start >= Duration::from_millis(1800));
        assert_eq!(store.document(&id("a")).unwrap().content, "hello");
        assert_eq!(driver.coordinator().status(), SaveStatus::Saved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_flushes_outgoing_content() {
        let (mut driver, store, storage) = driver_with(&[("a", "old"), ("b", "")]).await;
        driver.edit("typed then switched");
        driver.switch(&id("b")).unwrap();
        driver.settle().await;

        assert_eq!(store.document(&id("a")).unwrap().content, "typed then switched");
        assert_eq!(store.content_writes().len(), 1);
        assert_eq!(DraftStore::new(storage).load(&id("a")).unwrap(), None);
        assert_eq!(driver.coordinator().active_id(), Some(&id("b")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_write_is_not_preempted() {
        let (mut driver, store, _) = driver_with(&[("a", "")]).await;
        store.set_latency(Operation::Update, Duration::from_millis(3000));
        driver.edit("one");
        tokio::time::advance(Duration::from_millis(1000)).await;
        assert!(driver.step().await);
        assert_eq!(driver.coordinator().in_flight(), 1);

        driver.edit("two");
        driver.settle().await;
        let writes: Vec<_> = store.content_writes().into_iter().map(|(_, c)| c).collect();
        assert_eq!(writes, vec!["one", "two"]);
        assert_eq!(store.document(&id("a")).unwrap().content, "two");
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_queues_notice_and_keeps_draft() {
        let (mut driver, store, storage) = driver_with(&[("a", "")]).await;
        store.fail(Operation::Update);
        driver.edit("unsent");
        driver.settle().await;

        assert_eq!(driver.coordinator().status(), SaveStatus::Idle);
        let notices = driver.drain_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::WriteFailed);
        let draft = DraftStore::new(storage).load(&id("a")).unwrap().unwrap();
        assert_eq!(draft.content, "unsent");
    }

    #[tokio::test(start_paused = true)]
    async fn test_saved_flash_reverts_to_idle() {
        let (mut driver, _, _) = driver_with(&[("a", "")]).await;
        driver.edit("x");
        driver.settle().await;
        assert_eq!(driver.coordinator().status(), SaveStatus::Saved);
        assert!(driver.step().await);
        assert_eq!(driver.coordinator().status(), SaveStatus::Idle);
        assert!(!driver.step().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_and_delete_move_active() {
        let (mut driver, store, _) = driver_with(&[("a", ""), ("b", "")]).await;
        driver.create().unwrap();
        driver.settle().await;
        let created = driver.coordinator().notes()[0].clone();
        assert_eq!(created.title, "Untitled");
        assert_eq!(driver.coordinator().active_id(), Some(&created.id));

        driver.delete(&created.id).unwrap();
        driver.settle().await;
        assert_eq!(driver.coordinator().active_id(), Some(&id("a")));
        assert!(store.document(&created.id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_undo_delete_restores_under_new_id() {
        let (mut driver, store, _) = driver_with(&[("a", "keep me")]).await;
        driver.delete(&id("a")).unwrap();
        driver.settle().await;
        assert_eq!(driver.coordinator().active_id(), None);

        driver.undo_delete().unwrap();
        driver.settle().await;
        let restored = driver.coordinator().active_document().unwrap();
        assert_eq!((restored.title.as_str(), restored.content.as_str()), ("A", "keep me"));
        assert_ne!(restored.id, id("a"));
        assert_eq!(store.documents().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rename_and_duplicate() {
        let (mut driver, _, _) = driver_with(&[("a", "body")]).await;
        driver.rename(&id("a"), "Renamed").unwrap();
        driver.settle().await;
        driver.duplicate(&id("a")).unwrap();
        driver.settle().await;
        let titles: Vec<_> = driver.coordinator().notes().iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["Renamed (copy)", "Renamed"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_upload_is_returned_and_noticed() {
        let (mut driver, store, _) = driver_with(&[]).await;
        store.fail(Operation::Upload);
        let err = driver
            .upload("img/a.png", vec![1, 2, 3], UploadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Failed(_)));
        assert_eq!(driver.drain_notices()[0].kind, NoticeKind::UploadFailed);
        assert_eq!(store.blob("img/a.png"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_failure_is_noticed() {
        let store = MemoryStore::new();
        store.fail(Operation::List);
        let mut driver = Driver::new(CoordinatorConfig::default(), store, MemoryStorage::new());
        driver.sign_in(owner());
        driver.settle().await;
        assert!(driver.coordinator().notes().is_empty());
        assert_eq!(driver.drain_notices()[0].kind, NoticeKind::LoadFailed);
    }
}
