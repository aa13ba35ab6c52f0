//! Glue between one [`Editor`] and the persistence [`Driver`].
//!
//! The editor is the source of truth for the open note's content: every
//! change it makes is forwarded as an edit. The note shown in the editor
//! follows the coordinator's active id, and the title field follows the
//! stored title through [`TitleEvent::External`].

use quire_editor_core::{Edit, Editor};

use crate::coordinator::{CoordinatorConfig, LifecycleError};
use crate::document::{DocumentId, OwnerId};
use crate::gateway::RemoteStore;
use crate::runtime::Driver;
use crate::storage::LocalStorage;
use crate::title::{TitleEvent, TitleField};

pub struct EditorSession<R, L> {
    editor: Editor,
    driver: Driver<R, L>,
    title: TitleField,
    /// The note currently loaded into the editor.
    loaded: Option<DocumentId>,
}

impl<R: RemoteStore + 'static, L: LocalStorage> EditorSession<R, L> {
    pub fn new(config: CoordinatorConfig, store: R, storage: L) -> Self {
        Self {
            editor: Editor::new(),
            driver: Driver::new(config, store, storage),
            title: TitleField::default(),
            loaded: None,
        }
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    pub fn driver(&self) -> &Driver<R, L> {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut Driver<R, L> {
        &mut self.driver
    }

    pub fn title(&self) -> &TitleField {
        &self.title
    }

    pub fn loaded(&self) -> Option<&DocumentId> {
        self.loaded.as_ref()
    }

    pub fn sign_in(&mut self, owner: OwnerId) {
        self.driver.sign_in(owner);
    }

    /// Run `f` against the editor and forward any text change.
    pub fn with_editor<T>(&mut self, f: impl FnOnce(&mut Editor) -> T) -> T {
        let before = self.editor.text().to_string();
        let out = f(&mut self.editor);
        if self.loaded.is_some() && self.editor.text() != before {
            self.driver.edit(self.editor.text());
        }
        out
    }

    pub fn apply(&mut self, edit: Edit) {
        self.with_editor(|editor| {
            editor.apply(edit);
        });
    }

    pub fn switch(&mut self, id: &DocumentId) -> Result<(), LifecycleError> {
        self.driver.switch(id)?;
        self.sync();
        Ok(())
    }

    /// Reopen `id` with its crash-recovery draft applied.
    pub fn restore_draft(&mut self, id: &DocumentId) -> Result<(), LifecycleError> {
        self.driver.restore_draft(id)?;
        self.loaded = None;
        self.sync();
        Ok(())
    }

    pub fn title_input(&mut self, text: impl Into<String>) {
        self.title.reduce(TitleEvent::Input(text.into()));
    }

    pub fn title_cancel(&mut self) {
        self.title.reduce(TitleEvent::Cancel);
    }

    /// Commit the title field, renaming the loaded note when it changed.
    pub fn title_commit(&mut self) -> Result<(), LifecycleError> {
        let Some(title) = self.title.reduce(TitleEvent::Commit) else {
            return Ok(());
        };
        match self.loaded.clone() {
            Some(id) => self.driver.rename(&id, &title),
            None => Ok(()),
        }
    }

    pub async fn step(&mut self) -> bool {
        let progressed = self.driver.step().await;
        self.sync();
        progressed
    }

    pub async fn settle(&mut self) {
        self.driver.settle().await;
        self.sync();
    }

    /// Bring the editor and title in line with the active note.
    fn sync(&mut self) {
        let coordinator = self.driver.coordinator();
        let active = coordinator.active_document();
        let active_id = active.map(|d| d.id.clone());
        if active_id != self.loaded {
            let (content, title) = active
                .map(|d| (d.content.clone(), d.title.clone()))
                .unwrap_or_default();
            tracing::debug!(target: "quire::session", id = ?active_id, "loading note into editor");
            self.editor.load(&content);
            self.title = TitleField::new(title);
            self.loaded = active_id;
        } else if let Some(document) = active {
            let title = document.title.clone();
            self.title.reduce(TitleEvent::External(title));
        }
    }
}
