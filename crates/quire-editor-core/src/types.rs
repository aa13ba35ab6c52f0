//! Core editor types: positions, selection, inline marks and screen geometry.
//!
//! These types are independent of any rendering layer; a UI maps its own
//! caret and coordinates onto them.

use serde::{Deserialize, Serialize};

/// Path from the document root to a block.
///
/// Top-level blocks are indexed directly. Stepping into a blockquote takes one
/// index (the child), stepping into a list takes two (the item, then the child
/// block inside that item).
pub type BlockPath = Vec<usize>;

/// A caret position inside a text block.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Path to a text block (paragraph, heading or code block).
    pub block: BlockPath,
    /// Character offset in the block's text (NOT byte offset!)
    pub offset: usize,
}

impl Position {
    pub fn new(block: BlockPath, offset: usize) -> Self {
        Self { block, offset }
    }

    /// Start of the given block.
    pub fn start_of(block: BlockPath) -> Self {
        Self { block, offset: 0 }
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Positions order in document order: text blocks are leaves, so comparing
/// paths lexicographically walks the tree depth-first.
impl Ord for Position {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.block
            .cmp(&other.block)
            .then(self.offset.cmp(&other.offset))
    }
}

/// Text selection with anchor and head positions.
///
/// The anchor is where the selection started, the head is where the cursor is now.
/// They may be in any order - use `start()` and `end()` for ordered bounds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    /// Where selection started
    pub anchor: Position,
    /// Where cursor is now
    pub head: Position,
}

impl Selection {
    pub fn new(anchor: Position, head: Position) -> Self {
        Self { anchor, head }
    }

    /// Create a collapsed selection (cursor position).
    pub fn collapsed(position: Position) -> Self {
        Self {
            anchor: position.clone(),
            head: position,
        }
    }

    /// Selection spanning a character range inside one block.
    pub fn in_block(block: BlockPath, start: usize, end: usize) -> Self {
        Self {
            anchor: Position::new(block.clone(), start),
            head: Position::new(block, end),
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.head
    }

    /// Get the start (lower bound) of the selection.
    pub fn start(&self) -> &Position {
        (&self.anchor).min(&self.head)
    }

    /// Get the end (upper bound) of the selection.
    pub fn end(&self) -> &Position {
        (&self.anchor).max(&self.head)
    }

    /// The caret, i.e. the head.
    pub fn cursor(&self) -> &Position {
        &self.head
    }
}

/// Inline formatting a span of text can carry, except links which hold a target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mark {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Code,
    Highlight,
}

impl Mark {
    pub const ALL: [Mark; 6] = [
        Mark::Bold,
        Mark::Italic,
        Mark::Underline,
        Mark::Strikethrough,
        Mark::Code,
        Mark::Highlight,
    ];
}

/// The set of marks on a text span.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Marks {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub strikethrough: bool,
    #[serde(default)]
    pub code: bool,
    #[serde(default)]
    pub highlight: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl Marks {
    pub fn has(&self, mark: Mark) -> bool {
        match mark {
            Mark::Bold => self.bold,
            Mark::Italic => self.italic,
            Mark::Underline => self.underline,
            Mark::Strikethrough => self.strikethrough,
            Mark::Code => self.code,
            Mark::Highlight => self.highlight,
        }
    }

    pub fn set(&mut self, mark: Mark, on: bool) {
        let slot = match mark {
            Mark::Bold => &mut self.bold,
            Mark::Italic => &mut self.italic,
            Mark::Underline => &mut self.underline,
            Mark::Strikethrough => &mut self.strikethrough,
            Mark::Code => &mut self.code,
            Mark::Highlight => &mut self.highlight,
        };
        *slot = on;
    }

    pub fn with(mut self, mark: Mark) -> Self {
        self.set(mark, true);
        self
    }

    pub fn with_link(mut self, url: impl Into<String>) -> Self {
        self.link = Some(url.into());
        self
    }

    /// No formatting at all.
    pub fn is_plain(&self) -> bool {
        *self == Marks::default()
    }
}

/// A point in the editor's viewport, in CSS pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in viewport coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub origin: Point,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(origin: Point, width: f32, height: f32) -> Self {
        Self {
            origin,
            width,
            height,
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.origin.x
            && point.x <= self.origin.x + self.width
            && point.y >= self.origin.y
            && point.y <= self.origin.y + self.height
    }
}
