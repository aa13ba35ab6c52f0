//! Detects the command trigger (`/` by default) before the caret and drives
//! the block command menu.
//!
//! The detector is a small state machine: inactive, or open with a
//! [`MenuState`]. Content changes may open it; selection changes only keep it
//! open or close it. Confirming a candidate yields a [`Confirmation`] that
//! deletes the typed trigger and runs the command as one undo step.

use quire_common::Config;
use regex::Regex;
use smol_str::SmolStr;

use crate::commands::{BlockCommand, CommandSpec, filter_commands};
use crate::edit::Edit;
use crate::editor::Editor;
use crate::serializer::Serializer;
use crate::tree::{Block, Tree};
use crate::types::{BlockPath, Point, Position, Rect, Selection};

/// The typed trigger plus query, in characters within one block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplaceRange {
    pub block: BlockPath,
    pub start: usize,
    pub end: usize,
}

/// Everything the menu needs while open.
#[derive(Clone, Debug, PartialEq)]
pub struct MenuState {
    /// Screen position of the caret when the menu opened.
    pub anchor: Point,
    /// Text typed after the trigger character.
    pub query: SmolStr,
    pub highlighted: usize,
    pub replace: ReplaceRange,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuKey {
    Escape,
    Up,
    Down,
    Enter,
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyOutcome {
    /// The menu consumed the key.
    Handled,
    /// The editor should handle the key as usual.
    PassThrough,
    /// A candidate was chosen; apply it to the editor.
    Confirm(Confirmation),
}

/// A chosen command and the trigger text it replaces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Confirmation {
    pub command: BlockCommand,
    pub replace: ReplaceRange,
}

impl Confirmation {
    /// Delete the trigger text, then transform the block.
    pub fn edits(&self) -> Vec<Edit> {
        let start = Position::new(self.replace.block.clone(), self.replace.start);
        let end = Position::new(self.replace.block.clone(), self.replace.end);
        vec![
            Edit::Delete {
                from: start.clone(),
                to: end,
            },
            Edit::Transform {
                at: start,
                command: self.command,
            },
        ]
    }

    pub fn apply<'e, S: Serializer>(&self, editor: &'e mut Editor<S>) -> &'e str {
        tracing::debug!(target: "quire::trigger", command = ?self.command, "menu command confirmed");
        editor.apply_batch(self.edits())
    }
}

pub struct TriggerDetector {
    pattern: Regex,
    state: Option<MenuState>,
}

impl TriggerDetector {
    /// A detector for `trigger` followed by ASCII word characters at the caret.
    pub fn new(trigger: char) -> Result<Self, regex::Error> {
        let escaped = regex::escape(&trigger.to_string());
        Ok(Self {
            // Command names are ASCII, so a non-ASCII letter ends the query.
            pattern: Regex::new(&format!(r"{escaped}((?-u:\w)*)$"))?,
            state: None,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, regex::Error> {
        Self::new(config.trigger_char)
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    pub fn state(&self) -> Option<&MenuState> {
        self.state.as_ref()
    }

    /// Matching commands for the current query; empty while closed.
    pub fn candidates(&self) -> Vec<&'static CommandSpec> {
        match &self.state {
            Some(state) => filter_commands(&state.query),
            None => Vec::new(),
        }
    }

    /// Re-evaluate after the text changed. Opens the menu when the caret
    /// follows the trigger in a paragraph, closes it otherwise.
    pub fn on_content_change(&mut self, tree: &Tree, selection: &Selection, anchor: Point) {
        match self.evaluate(tree, selection) {
            Some((query, replace)) => self.update(query, replace, Some(anchor)),
            None => self.close(),
        }
    }

    /// Re-evaluate after the caret moved. Never opens the menu.
    pub fn on_selection_change(&mut self, tree: &Tree, selection: &Selection) {
        if self.state.is_none() {
            return;
        }
        match self.evaluate(tree, selection) {
            Some((query, replace)) => self.update(query, replace, None),
            None => self.close(),
        }
    }

    pub fn handle_key(&mut self, key: MenuKey) -> KeyOutcome {
        let Some(state) = self.state.as_mut() else {
            return KeyOutcome::PassThrough;
        };
        let count = filter_commands(&state.query).len();
        match key {
            MenuKey::Escape => {
                self.close();
                KeyOutcome::Handled
            }
            MenuKey::Down => {
                state.highlighted = (state.highlighted + 1).min(count.saturating_sub(1));
                KeyOutcome::Handled
            }
            MenuKey::Up => {
                state.highlighted = state.highlighted.saturating_sub(1);
                KeyOutcome::Handled
            }
            MenuKey::Enter => {
                let index = state.highlighted;
                match self.confirm(index) {
                    Some(confirmation) => KeyOutcome::Confirm(confirmation),
                    None => KeyOutcome::PassThrough,
                }
            }
            MenuKey::Other => KeyOutcome::PassThrough,
        }
    }

    /// Pointer click on candidate `index`.
    pub fn click(&mut self, index: usize) -> Option<Confirmation> {
        self.confirm(index)
    }

    /// Pointer press anywhere. Closes the menu when outside `bounds`.
    pub fn pointer_down(&mut self, point: Point, bounds: Rect) -> bool {
        if self.state.is_some() && !bounds.contains(point) {
            self.close();
            return true;
        }
        false
    }

    pub fn close(&mut self) {
        if self.state.take().is_some() {
            tracing::trace!(target: "quire::trigger", "menu closed");
        }
    }

    fn confirm(&mut self, index: usize) -> Option<Confirmation> {
        let state = self.state.take()?;
        let spec = filter_commands(&state.query).into_iter().nth(index)?;
        Some(Confirmation {
            command: spec.command,
            replace: state.replace,
        })
    }

    fn update(&mut self, query: SmolStr, replace: ReplaceRange, anchor: Option<Point>) {
        match self.state.as_mut() {
            Some(state) => {
                if state.query != query {
                    state.highlighted = 0;
                }
                state.query = query;
                state.replace = replace;
                if let Some(anchor) = anchor {
                    state.anchor = anchor;
                }
            }
            None => {
                let Some(anchor) = anchor else { return };
                tracing::trace!(target: "quire::trigger", %query, "menu opened");
                self.state = Some(MenuState {
                    anchor,
                    query,
                    highlighted: 0,
                    replace,
                });
            }
        }
    }

    fn evaluate(&self, tree: &Tree, selection: &Selection) -> Option<(SmolStr, ReplaceRange)> {
        if !selection.is_collapsed() {
            return None;
        }
        let cursor = selection.cursor();
        let block = tree.block(&cursor.block)?;
        if !matches!(block, Block::Paragraph { .. }) {
            return None;
        }
        let before: String = block.plain_text().chars().take(cursor.offset).collect();
        let captures = self.pattern.captures(&before)?;
        let whole = captures.get(0)?;
        let query = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        let start = before[..whole.start()].chars().count();
        let end = start + whole.as_str().chars().count();
        Some((
            SmolStr::new(query),
            ReplaceRange {
                block: cursor.block.clone(),
                start,
                end,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inline::Span;
    use crate::markdown::load;
    use crate::undo::UndoManager;

    fn caret(block: &[usize], offset: usize) -> Selection {
        Selection::collapsed(Position::new(block.to_vec(), offset))
    }

    fn labels(detector: &TriggerDetector) -> Vec<&'static str> {
        detector.candidates().iter().map(|c| c.label).collect()
    }

    fn opened(markdown: &str, selection: Selection) -> (Tree, TriggerDetector) {
        let tree = load(markdown);
        let mut detector = TriggerDetector::new('/').unwrap();
        detector.on_content_change(&tree, &selection, Point::new(10.0, 20.0));
        (tree, detector)
    }

    #[test]
    fn test_hello_head_becomes_heading() {
        let mut editor = Editor::with_content("Hello /head");
        editor.set_selection(caret(&[0], 11));
        let mut detector = TriggerDetector::new('/').unwrap();
        detector.on_content_change(editor.tree(), editor.selection(), Point::new(0.0, 0.0));

        let state = detector.state().unwrap();
        assert_eq!(state.query, "head");
        assert_eq!(
            state.replace,
            ReplaceRange {
                block: vec![0],
                start: 6,
                end: 11
            }
        );
        assert_eq!(labels(&detector), vec!["Heading 1", "Heading 2", "Heading 3"]);

        let KeyOutcome::Confirm(confirmation) = detector.handle_key(MenuKey::Enter) else {
            panic!("enter should confirm");
        };
        confirmation.apply(&mut editor);
        assert!(!detector.is_open());
        assert_eq!(
            editor.tree().blocks[0],
            Block::Heading {
                level: 1,
                content: vec![Span::plain("Hello ")],
            }
        );

        // One undo step restores the typed trigger.
        assert!(editor.undo());
        assert_eq!(editor.text(), "Hello /head");
    }

    #[test]
    fn test_empty_query_lists_everything() {
        let (_, detector) = opened("/", caret(&[0], 1));
        assert_eq!(detector.candidates().len(), 10);
        assert_eq!(detector.state().unwrap().anchor, Point::new(10.0, 20.0));
    }

    #[test]
    fn test_only_plain_paragraphs_open() {
        let (_, detector) = opened("# /h", caret(&[0], 3));
        assert!(!detector.is_open());
        let (_, detector) = opened("```\n/h\n```", caret(&[0], 2));
        assert!(!detector.is_open());
        let (_, detector) = opened("- /h", caret(&[0, 0, 0], 2));
        assert!(detector.is_open());
    }

    #[test]
    fn test_range_selection_does_not_open() {
        let (_, detector) = opened("/h", Selection::in_block(vec![0], 0, 2));
        assert!(!detector.is_open());
    }

    #[test]
    fn test_pattern_must_end_at_caret() {
        let (_, detector) = opened("/head more", caret(&[0], 10));
        assert!(!detector.is_open());
        let (_, detector) = opened("/head more", caret(&[0], 3));
        assert_eq!(detector.state().unwrap().query, "he");
    }

    #[test]
    fn test_selection_change_closes_but_never_opens() {
        let (tree, mut detector) = opened("ab /co", caret(&[0], 6));
        assert!(detector.is_open());
        detector.on_selection_change(&tree, &caret(&[0], 4));
        assert_eq!(detector.state().unwrap().query, "");
        detector.on_selection_change(&tree, &caret(&[0], 1));
        assert!(!detector.is_open());
        detector.on_selection_change(&tree, &caret(&[0], 6));
        assert!(!detector.is_open());
    }

    #[test]
    fn test_highlight_is_clamped_and_resets() {
        let (_, mut detector) = opened("/list", caret(&[0], 5));
        assert_eq!(detector.handle_key(MenuKey::Up), KeyOutcome::Handled);
        assert_eq!(detector.state().unwrap().highlighted, 0);
        for _ in 0..5 {
            detector.handle_key(MenuKey::Down);
        }
        assert_eq!(detector.state().unwrap().highlighted, 2);

        let tree = load("/lis");
        detector.on_content_change(&tree, &caret(&[0], 4), Point::new(0.0, 0.0));
        assert_eq!(detector.state().unwrap().highlighted, 0);
    }

    #[test]
    fn test_enter_without_candidates_passes_through() {
        let (_, mut detector) = opened("/zzz", caret(&[0], 4));
        assert!(detector.is_open());
        assert_eq!(detector.handle_key(MenuKey::Enter), KeyOutcome::PassThrough);
        assert!(!detector.is_open());
    }

    #[test]
    fn test_escape_and_other_keys() {
        let (_, mut detector) = opened("/q", caret(&[0], 2));
        assert_eq!(detector.handle_key(MenuKey::Other), KeyOutcome::PassThrough);
        assert!(detector.is_open());
        assert_eq!(detector.handle_key(MenuKey::Escape), KeyOutcome::Handled);
        assert!(!detector.is_open());
        assert_eq!(detector.handle_key(MenuKey::Escape), KeyOutcome::PassThrough);
    }

    #[test]
    fn test_click_and_outside_press() {
        let bounds = Rect::new(Point::new(0.0, 0.0), 100.0, 50.0);
        let (_, mut detector) = opened("/", caret(&[0], 1));
        assert!(!detector.pointer_down(Point::new(5.0, 5.0), bounds));
        assert!(detector.pointer_down(Point::new(500.0, 5.0), bounds));
        assert!(!detector.is_open());

        let (_, mut detector) = opened("x /", caret(&[0], 3));
        let confirmation = detector.click(9).unwrap();
        assert_eq!(confirmation.command, BlockCommand::HorizontalRule);
        assert_eq!(confirmation.replace.start, 2);
        assert!(detector.click(0).is_none());
    }

    #[test]
    fn test_divider_from_menu() {
        let mut editor = Editor::with_content("/");
        editor.set_selection(caret(&[0], 1));
        let mut detector = TriggerDetector::new('/').unwrap();
        detector.on_content_change(editor.tree(), editor.selection(), Point::new(0.0, 0.0));
        detector.click(9).unwrap().apply(&mut editor);
        assert_eq!(editor.text(), "---");
        assert_eq!(editor.selection(), &caret(&[1], 0));
    }

    #[test]
    fn test_custom_trigger_and_unicode_offsets() {
        let tree = load("héllo +code");
        let mut detector = TriggerDetector::new('+').unwrap();
        detector.on_content_change(&tree, &caret(&[0], 11), Point::new(0.0, 0.0));
        let state = detector.state().unwrap();
        assert_eq!(state.query, "code");
        assert_eq!((state.replace.start, state.replace.end), (6, 11));
        assert_eq!(detector.candidates()[0].label, "Code Block");
    }

    #[test]
    fn test_non_ascii_letters_end_the_query() {
        let tree = load("/çode");
        let mut detector = TriggerDetector::new('/').unwrap();
        detector.on_content_change(&tree, &caret(&[0], 5), Point::new(0.0, 0.0));
        assert!(!detector.is_open());

        let tree = load("/héading");
        detector.on_content_change(&tree, &caret(&[0], 2), Point::new(0.0, 0.0));
        assert_eq!(detector.state().unwrap().query, "h");
        detector.on_content_change(&tree, &caret(&[0], 3), Point::new(0.0, 0.0));
        assert!(!detector.is_open());
    }
}
