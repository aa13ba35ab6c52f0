//! Undo/redo management for editor operations.
//!
//! Provides:
//! - `UndoManager` trait for abstracting undo implementations
//! - `History` - bounded snapshot stacks of tree plus selection

use crate::tree::Tree;
use crate::types::Selection;

/// Trait for managing undo/redo operations.
///
/// Implementations must actually perform the undo/redo, not just track state.
pub trait UndoManager {
    /// Check if undo is available.
    fn can_undo(&self) -> bool;

    /// Check if redo is available.
    fn can_redo(&self) -> bool;

    /// Perform undo. Returns true if successful.
    fn undo(&mut self) -> bool;

    /// Perform redo. Returns true if successful.
    fn redo(&mut self) -> bool;

    /// Clear all undo/redo history.
    fn clear_history(&mut self);
}

/// Document state captured before an edit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub tree: Tree,
    pub selection: Selection,
}

/// Undo and redo stacks of snapshots.
///
/// Does not hold the current state itself; callers swap their state with
/// the returned snapshot.
#[derive(Clone, Debug)]
pub struct History {
    undo_stack: Vec<Snapshot>,
    redo_stack: Vec<Snapshot>,
    max_steps: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(100)
    }
}

impl History {
    pub fn new(max_steps: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_steps,
        }
    }

    /// Record the state before a new edit.
    pub fn record(&mut self, before: Snapshot) {
        // Clear redo stack on new edit
        self.redo_stack.clear();
        self.undo_stack.push(before);

        // Trim if over max
        if self.undo_stack.len() > self.max_steps {
            let excess = self.undo_stack.len() - self.max_steps;
            self.undo_stack.drain(..excess);
        }
    }

    /// Step back: `current` goes onto the redo stack, the previous state is
    /// returned.
    pub fn undo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let previous = self.undo_stack.pop()?;
        self.redo_stack.push(current);
        Some(previous)
    }

    /// Step forward again after an undo.
    pub fn redo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let next = self.redo_stack.pop()?;
        self.undo_stack.push(current);
        Some(next)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.undo_stack.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inline::Span;
    use crate::tree::Block;
    use crate::types::Position;

    fn snap(text: &str) -> Snapshot {
        Snapshot {
            tree: Tree::from_blocks(vec![Block::paragraph(vec![Span::plain(text)])]),
            selection: Selection::collapsed(Position::start_of(vec![0])),
        }
    }

    #[test]
    fn test_undo_redo_cycle() {
        let mut history = History::default();
        history.record(snap("a"));
        assert!(history.can_undo());
        assert!(!history.can_redo());

        let previous = history.undo(snap("ab")).unwrap();
        assert_eq!(previous, snap("a"));
        assert!(history.can_redo());

        let next = history.redo(snap("a")).unwrap();
        assert_eq!(next, snap("ab"));
        assert!(history.undo(snap("ab")).is_some());
        assert!(history.undo(snap("a")).is_none());
    }

    #[test]
    fn test_new_edit_clears_redo() {
        let mut history = History::default();
        history.record(snap("a"));
        history.undo(snap("ab"));
        history.record(snap("a"));
        assert!(!history.can_redo());
    }

    #[test]
    fn test_bounded() {
        let mut history = History::new(3);
        for i in 0..5 {
            history.record(snap(&i.to_string()));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.undo(snap("x")), Some(snap("4")));
    }
}
