//! The editor: a tree, a selection and the text they serialize to.
//!
//! Every change goes through [`Editor::apply`] (or [`Editor::apply_batch`]),
//! which records undo history, re-serializes the tree and hands the fresh
//! text to the change listener.

use quire_common::perf::TimingGuard;

use crate::commands::BlockCommand;
use crate::edit::{self, Edit, EditOutcome, apply_edit};
use crate::formatting::Formatting;
use crate::serializer::{MarkdownSerializer, Serializer};
use crate::tree::{Block, Tree};
use crate::types::{Position, Selection};
use crate::undo::{History, Snapshot, UndoManager};

type ChangeListener = Box<dyn FnMut(&str)>;

/// An editable document with a caret, undo history and a serializer.
pub struct Editor<S: Serializer = MarkdownSerializer> {
    tree: Tree,
    selection: Selection,
    serializer: S,
    text: String,
    history: History,
    listener: Option<ChangeListener>,
}

impl Default for Editor<MarkdownSerializer> {
    fn default() -> Self {
        Self::new()
    }
}

impl Editor<MarkdownSerializer> {
    /// An empty Markdown editor.
    pub fn new() -> Self {
        Self::with_serializer(MarkdownSerializer, "")
    }

    /// A Markdown editor holding `markdown`.
    pub fn with_content(markdown: &str) -> Self {
        Self::with_serializer(MarkdownSerializer, markdown)
    }
}

impl<S: Serializer> Editor<S> {
    pub fn with_serializer(serializer: S, content: &str) -> Self {
        let tree = serializer.load(content);
        let text = serializer.serialize(&tree);
        let selection = Selection::collapsed(start_of(&tree));
        Self {
            tree,
            selection,
            serializer,
            text,
            history: History::default(),
            listener: None,
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Move the selection. Positions outside any text block snap to the
    /// start of the document.
    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = clamp_selection(&self.tree, selection);
    }

    pub fn serializer(&self) -> &S {
        &self.serializer
    }

    /// Serialized form of the current tree.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Called with the fresh text after every change.
    pub fn on_change(&mut self, listener: impl FnMut(&str) + 'static) {
        self.listener = Some(Box::new(listener));
    }

    /// Apply one edit. Returns the text after it.
    pub fn apply(&mut self, edit: Edit) -> &str {
        self.apply_batch([edit])
    }

    /// Apply several edits as one undo step with one notification.
    pub fn apply_batch(&mut self, edits: impl IntoIterator<Item = Edit>) -> &str {
        let before = self.snapshot();
        let mut changed = false;
        let mut selection = None;
        for edit in edits {
            let EditOutcome {
                changed: c,
                selection: s,
            } = apply_edit(&mut self.tree, &edit);
            changed |= c;
            if s.is_some() {
                selection = s;
            }
        }
        if !changed {
            if let Some(selection) = selection {
                self.set_selection(selection);
            }
            return &self.text;
        }
        self.history.record(before);
        let selection = selection.unwrap_or_else(|| self.selection.clone());
        self.selection = clamp_selection(&self.tree, selection);
        self.refresh();
        &self.text
    }

    /// Replace the document without notifying and without history.
    pub fn load(&mut self, content: &str) {
        self.tree = self.serializer.load(content);
        self.selection = Selection::collapsed(start_of(&self.tree));
        self.text = self.serializer.serialize(&self.tree);
        self.history.clear();
    }

    /// Type at the caret, replacing any selected text.
    pub fn insert_text(&mut self, text: &str) -> &str {
        let at = self.selection.start().clone();
        let mut edits = self.delete_selection_edit();
        edits.push(Edit::InsertText {
            at,
            text: text.to_string(),
        });
        self.apply_batch(edits)
    }

    /// Backspace. Deletes the selection, or the character before the caret,
    /// or merges the block into the previous text block.
    pub fn delete_backward(&mut self) -> &str {
        if !self.selection.is_collapsed() {
            let edits = self.delete_selection_edit();
            return self.apply_batch(edits);
        }
        let cursor = self.selection.cursor().clone();
        if cursor.offset > 0 {
            let from = Position::new(cursor.block.clone(), cursor.offset - 1);
            return self.apply(Edit::Delete { from, to: cursor });
        }

        let previous = self
            .tree
            .textblock_paths()
            .into_iter()
            .take_while(|p| *p < cursor.block)
            .last();
        match previous {
            Some(path) => {
                let from = Position::new(path.clone(), self.tree.text_len(&path));
                self.apply(Edit::Delete { from, to: cursor })
            }
            None if !self.block_at_cursor().is_some_and(Block::is_paragraph) => {
                self.transform(BlockCommand::Paragraph)
            }
            None => &self.text,
        }
    }

    /// Enter.
    pub fn split_block(&mut self) -> &str {
        let at = self.selection.start().clone();
        let mut edits = self.delete_selection_edit();
        edits.push(Edit::SplitBlock { at });
        self.apply_batch(edits)
    }

    /// Run a structural command on the block at the caret.
    pub fn transform(&mut self, command: BlockCommand) -> &str {
        let at = self.selection.cursor().clone();
        self.apply(Edit::Transform { at, command })
    }

    /// The text block holding the caret.
    pub fn block_at_cursor(&self) -> Option<&Block> {
        self.tree.block(&self.selection.cursor().block)
    }

    /// Inline formatting over the current selection.
    pub fn formatting(&mut self) -> Formatting<'_, S> {
        Formatting::new(self)
    }

    fn delete_selection_edit(&self) -> Vec<Edit> {
        if self.selection.is_collapsed() {
            return Vec::new();
        }
        vec![Edit::Delete {
            from: self.selection.start().clone(),
            to: self.selection.end().clone(),
        }]
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            tree: self.tree.clone(),
            selection: self.selection.clone(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.tree = snapshot.tree;
        self.selection = clamp_selection(&self.tree, snapshot.selection);
        self.refresh();
    }

    fn refresh(&mut self) {
        let _timing = TimingGuard::new("editor::serialize");
        self.text = self.serializer.serialize(&self.tree);
        if let Some(listener) = self.listener.as_mut() {
            listener(&self.text);
        }
    }
}

impl<S: Serializer> UndoManager for Editor<S> {
    fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    fn undo(&mut self) -> bool {
        let current = self.snapshot();
        match self.history.undo(current) {
            Some(previous) => {
                self.restore(previous);
                true
            }
            None => false,
        }
    }

    fn redo(&mut self) -> bool {
        let current = self.snapshot();
        match self.history.redo(current) {
            Some(next) => {
                self.restore(next);
                true
            }
            None => false,
        }
    }

    fn clear_history(&mut self) {
        self.history.clear();
    }
}

fn start_of(tree: &Tree) -> Position {
    Position::start_of(tree.first_textblock().unwrap_or_else(|| vec![0]))
}

fn clamp_selection(tree: &Tree, selection: Selection) -> Selection {
    let fallback = || start_of(tree);
    let anchor = edit::clamp(tree, &selection.anchor).unwrap_or_else(fallback);
    let head = edit::clamp(tree, &selection.head).unwrap_or_else(fallback);
    Selection::new(anchor, head)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::markdown::Degradation;

    fn caret(block: &[usize], offset: usize) -> Selection {
        Selection::collapsed(Position::new(block.to_vec(), offset))
    }

    #[test]
    fn test_content_round_trips_on_open() {
        let editor = Editor::with_content("# Title\n\n- item");
        assert_eq!(editor.text(), "# Title\n\n- item");
        assert_eq!(editor.selection(), &caret(&[0], 0));
    }

    #[test]
    fn test_listener_sees_every_change() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut editor = Editor::new();
        let sink = seen.clone();
        editor.on_change(move |text| sink.borrow_mut().push(text.to_string()));

        editor.insert_text("hi");
        editor.insert_text("!");
        assert_eq!(*seen.borrow(), vec!["hi".to_string(), "hi!".to_string()]);
        assert_eq!(editor.selection(), &caret(&[0], 3));
    }

    #[test]
    fn test_load_is_silent() {
        let seen = Rc::new(RefCell::new(0));
        let mut editor = Editor::new();
        let sink = seen.clone();
        editor.on_change(move |_| *sink.borrow_mut() += 1);
        editor.insert_text("a");
        editor.load("other");
        assert_eq!(*seen.borrow(), 1);
        assert_eq!(editor.text(), "other");
        assert!(!editor.can_undo());
    }

    #[test]
    fn test_undo_and_redo_notify() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut editor = Editor::with_content("a");
        let sink = seen.clone();
        editor.on_change(move |text| sink.borrow_mut().push(text.to_string()));
        editor.set_selection(caret(&[0], 1));
        editor.insert_text("b");

        assert!(editor.undo());
        assert_eq!(editor.text(), "a");
        assert_eq!(editor.selection(), &caret(&[0], 1));
        assert!(editor.redo());
        assert_eq!(editor.text(), "ab");
        assert!(!editor.redo());
        assert_eq!(*seen.borrow(), vec!["ab", "a", "ab"]);
    }

    #[test]
    fn test_typing_replaces_selection_in_one_step() {
        let mut editor = Editor::with_content("hello world");
        editor.set_selection(Selection::in_block(vec![0], 6, 11));
        editor.insert_text("there");
        assert_eq!(editor.text(), "hello there");
        assert!(editor.undo());
        assert_eq!(editor.text(), "hello world");
    }

    #[test]
    fn test_backspace_merges_blocks() {
        let mut editor = Editor::with_content("# one\n\ntwo");
        editor.set_selection(caret(&[1], 0));
        editor.delete_backward();
        assert_eq!(editor.text(), "# onetwo");
        assert_eq!(editor.selection(), &caret(&[0], 3));
    }

    #[test]
    fn test_backspace_at_document_start_resets_block() {
        let mut editor = Editor::with_content("## head");
        editor.delete_backward();
        assert_eq!(editor.text(), "head");
        editor.delete_backward();
        assert_eq!(editor.text(), "head");
    }

    #[test]
    fn test_enter_then_type() {
        let mut editor = Editor::with_content("ab");
        editor.set_selection(caret(&[0], 1));
        editor.split_block();
        editor.insert_text("x");
        assert_eq!(editor.text(), "a\n\nxb");
    }

    #[test]
    fn test_selection_is_clamped() {
        let mut editor = Editor::with_content("abc");
        editor.set_selection(caret(&[0], 40));
        assert_eq!(editor.selection(), &caret(&[0], 3));
        editor.set_selection(caret(&[7], 1));
        assert_eq!(editor.selection(), &caret(&[0], 0));
    }

    /// Writes only the plain text of each block.
    struct PlainText;

    impl Serializer for PlainText {
        fn serialize(&self, tree: &Tree) -> String {
            tree.textblock_paths()
                .iter()
                .filter_map(|p| tree.plain_text(p))
                .collect::<Vec<_>>()
                .join("\n")
        }

        fn load_with_report(&self, text: &str) -> (Tree, Vec<Degradation>) {
            crate::markdown::load_with_report(text)
        }
    }

    #[test]
    fn test_custom_serializer() {
        let mut editor = Editor::with_serializer(PlainText, "# Title\n\n**body**");
        assert_eq!(editor.text(), "Title\nbody");
        editor.transform(BlockCommand::CodeBlock);
        assert_eq!(editor.text(), "Title\nbody");
        let _: &PlainText = editor.serializer();
    }
}
