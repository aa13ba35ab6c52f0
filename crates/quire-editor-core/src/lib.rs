//! quire-editor-core: the block editor without any UI.
//!
//! This crate provides:
//! - `Tree` - the editable block document and its inline spans
//! - `markdown` - canonical Markdown loading and serialization
//! - `Edit` / `apply_edit` - every change the tree can undergo
//! - `Editor` - tree, selection, undo history and change notification
//! - `TriggerDetector` - the `/` command menu state machine
//! - `Formatting` - selection-scoped inline marks and links

pub mod commands;
pub mod edit;
pub mod editor;
pub mod formatting;
pub mod inline;
pub mod markdown;
pub mod serializer;
pub mod tree;
pub mod trigger;
pub mod types;
pub mod undo;

pub use commands::{BlockCommand, COMMANDS, CommandSpec, filter_commands};
pub use edit::{Edit, EditOutcome, apply_edit};
pub use editor::Editor;
pub use formatting::Formatting;
pub use inline::Span;
pub use markdown::{Degradation, DegradationReport, load, load_with_report, serialize};
pub use serializer::{MarkdownSerializer, Serializer};
pub use tree::{Block, ListItem, ListKind, Tree};
pub use trigger::{Confirmation, KeyOutcome, MenuKey, MenuState, ReplaceRange, TriggerDetector};
pub use types::{BlockPath, Mark, Marks, Point, Position, Rect, Selection};
pub use undo::UndoManager;
