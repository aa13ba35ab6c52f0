//! Serialization capability used by the editor.

use crate::markdown::{self, Degradation};
use crate::tree::Tree;

/// Converts between a tree and its persisted text form.
///
/// Implementations must be stable: serializing a loaded serialization gives
/// the same text back.
pub trait Serializer {
    /// Write the tree as text.
    fn serialize(&self, tree: &Tree) -> String;

    /// Read text into a tree. Never fails; unsupported input degrades.
    fn load(&self, text: &str) -> Tree {
        self.load_with_report(text).0
    }

    /// Read text and report what could not be represented.
    fn load_with_report(&self, text: &str) -> (Tree, Vec<Degradation>);
}

/// The canonical Markdown backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MarkdownSerializer;

impl Serializer for MarkdownSerializer {
    fn serialize(&self, tree: &Tree) -> String {
        markdown::serialize(tree)
    }

    fn load_with_report(&self, text: &str) -> (Tree, Vec<Degradation>) {
        markdown::load_with_report(text)
    }
}
