//! Inline formatting over the editor's selection.

use std::ops::Range;

use crate::edit::{Edit, text_ranges};
use crate::editor::Editor;
use crate::inline;
use crate::serializer::Serializer;
use crate::tree::Block;
use crate::types::{BlockPath, Mark, Marks, Position};

/// Toolbar operations for the current selection, from [`Editor::formatting`].
pub struct Formatting<'a, S: Serializer> {
    editor: &'a mut Editor<S>,
}

impl<'a, S: Serializer> Formatting<'a, S> {
    pub(crate) fn new(editor: &'a mut Editor<S>) -> Self {
        Self { editor }
    }

    /// Formatting applies to non-empty selections that do not start or end
    /// inside a code block.
    pub fn is_available(&self) -> bool {
        let selection = self.editor.selection();
        let tree = self.editor.tree();
        let in_code = |block: &BlockPath| tree.block(block).is_some_and(Block::is_code_block);
        !selection.is_collapsed() && !in_code(&selection.anchor.block) && !in_code(&selection.head.block)
    }

    /// True when every selected character carries `mark`.
    pub fn is_active(&self, mark: Mark) -> bool {
        self.all_selected(|m| m.has(mark))
    }

    /// True when every selected character is inside a link.
    pub fn link_active(&self) -> bool {
        self.all_selected(|m| m.link.is_some())
    }

    /// Remove `mark` when the whole selection has it, otherwise apply it to
    /// the whole selection. Returns false when formatting is unavailable.
    pub fn toggle(&mut self, mark: Mark) -> bool {
        if !self.is_available() {
            return false;
        }
        let on = !self.is_active(mark);
        let (from, to) = self.bounds();
        tracing::debug!(target: "quire::formatting", ?mark, on, "toggle mark");
        self.editor.apply(Edit::SetMark { from, to, mark, on });
        true
    }

    /// Remove the link when the whole selection is linked. Otherwise ask
    /// `prompt` for a URL and apply it when it is non-empty after trimming.
    pub fn toggle_link(&mut self, prompt: impl FnOnce() -> Option<String>) -> bool {
        if !self.is_available() {
            return false;
        }
        let (from, to) = self.bounds();
        if self.link_active() {
            self.editor.apply(Edit::SetLink { from, to, url: None });
            return true;
        }
        let Some(url) = prompt()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
        else {
            return false;
        };
        self.editor.apply(Edit::SetLink {
            from,
            to,
            url: Some(url),
        });
        true
    }

    fn bounds(&self) -> (Position, Position) {
        let selection = self.editor.selection();
        (selection.start().clone(), selection.end().clone())
    }

    fn selected_ranges(&self) -> Vec<(BlockPath, Range<usize>)> {
        let tree = self.editor.tree();
        let selection = self.editor.selection();
        text_ranges(tree, selection.start(), selection.end())
            .into_iter()
            .filter(|(path, range)| {
                !range.is_empty() && !tree.block(path).is_some_and(Block::is_code_block)
            })
            .collect()
    }

    fn all_selected(&self, pred: impl Fn(&Marks) -> bool) -> bool {
        let ranges = self.selected_ranges();
        let tree = self.editor.tree();
        !ranges.is_empty()
            && ranges.into_iter().all(|(path, range)| {
                tree.content(&path)
                    .is_some_and(|content| inline::all_marks(content, range, &pred))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Selection;

    fn select(editor: &mut Editor, block: &[usize], start: usize, end: usize) {
        editor.set_selection(Selection::in_block(block.to_vec(), start, end));
    }

    #[test]
    fn test_toggle_bold_twice_restores() {
        let mut editor = Editor::with_content("plain *it* text");
        let before = editor.tree().clone();
        select(&mut editor, &[0], 0, 15);
        assert!(editor.formatting().toggle(Mark::Bold));
        assert_eq!(editor.text(), "**plain *it* text**");
        assert!(editor.formatting().is_active(Mark::Bold));
        assert!(editor.formatting().toggle(Mark::Bold));
        assert_eq!(editor.tree(), &before);
    }

    #[test]
    fn test_partial_mark_applies_to_all() {
        let mut editor = Editor::with_content("a **b** c");
        select(&mut editor, &[0], 0, 5);
        assert!(!editor.formatting().is_active(Mark::Bold));
        editor.formatting().toggle(Mark::Bold);
        assert_eq!(editor.text(), "**a b c**");
    }

    #[test]
    fn test_unavailable_without_selection_or_in_code() {
        let mut editor = Editor::with_content("text\n\n```\ncode\n```");
        assert!(!editor.formatting().is_available());
        assert!(!editor.formatting().toggle(Mark::Italic));

        editor.set_selection(Selection::new(
            Position::new(vec![0], 1),
            Position::new(vec![1], 2),
        ));
        assert!(!editor.formatting().is_available());
        assert_eq!(editor.text(), "text\n\n```\ncode\n```");
    }

    #[test]
    fn test_marks_across_blocks() {
        let mut editor = Editor::with_content("one\n\ntwo");
        editor.set_selection(Selection::new(
            Position::new(vec![1], 3),
            Position::new(vec![0], 0),
        ));
        editor.formatting().toggle(Mark::Strikethrough);
        assert_eq!(editor.text(), "~~one~~\n\n~~two~~");
    }

    #[test]
    fn test_link_prompt() {
        let mut editor = Editor::with_content("see docs");
        select(&mut editor, &[0], 4, 8);
        assert!(!editor.formatting().toggle_link(|| Some("   ".into())));
        assert!(!editor.formatting().toggle_link(|| None));
        assert_eq!(editor.text(), "see docs");

        assert!(editor.formatting().toggle_link(|| Some(" https://x.dev ".into())));
        assert_eq!(editor.text(), "see [docs](https://x.dev)");
        assert!(editor.formatting().link_active());

        let removed = editor
            .formatting()
            .toggle_link(|| panic!("prompt is not consulted when removing"));
        assert!(removed);
        assert_eq!(editor.text(), "see docs");
    }
}
