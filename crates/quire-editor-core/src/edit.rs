//! Edits: every change to a [`Tree`] goes through [`apply_edit`].
//!
//! Positions that do not point into a text block make the edit a no-op, and
//! offsets past the end of a block are clamped. Nothing here fails.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::commands::BlockCommand;
use crate::inline::{self, Span};
use crate::tree::{Block, ListItem, ListKind, Parent, Tree};
use crate::types::{BlockPath, Mark, Marks, Position, Selection};

/// A single change to the document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Edit {
    /// Insert text at a position. A `\n` in a paragraph or heading is a hard
    /// line break, in a code block it is a newline.
    InsertText { at: Position, text: String },
    /// Delete between two positions, in either order. Crossing blocks merges
    /// the end block into the start block.
    Delete { from: Position, to: Position },
    /// Enter key.
    SplitBlock { at: Position },
    /// Structural transformation of the text block at `at`.
    Transform { at: Position, command: BlockCommand },
    /// Add or remove a mark over a range.
    SetMark {
        from: Position,
        to: Position,
        mark: Mark,
        on: bool,
    },
    /// Set (`Some`) or clear (`None`) a link over a range.
    SetLink {
        from: Position,
        to: Position,
        url: Option<String>,
    },
    /// Check or uncheck the task item holding `block`.
    SetTaskChecked { block: BlockPath, checked: bool },
    /// Replace the whole document.
    ReplaceAll { tree: Tree },
}

/// What an edit did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EditOutcome {
    /// Whether the tree changed at all.
    pub changed: bool,
    /// New selection, when the edit moves the caret.
    pub selection: Option<Selection>,
}

impl EditOutcome {
    fn unchanged() -> Self {
        Self::default()
    }

    fn changed() -> Self {
        Self {
            changed: true,
            selection: None,
        }
    }

    fn caret(position: Position) -> Self {
        Self {
            changed: true,
            selection: Some(Selection::collapsed(position)),
        }
    }
}

/// Apply `edit` to `tree` in place.
pub fn apply_edit(tree: &mut Tree, edit: &Edit) -> EditOutcome {
    let outcome = match edit {
        Edit::InsertText { at, text } => insert_text(tree, at, text),
        Edit::Delete { from, to } => delete(tree, from, to),
        Edit::SplitBlock { at } => split_block(tree, at),
        Edit::Transform { at, command } => transform(tree, at, *command),
        Edit::SetMark { from, to, mark, on } => {
            let (mark, on) = (*mark, *on);
            update_marks(tree, from, to, |m| m.set(mark, on))
        }
        Edit::SetLink { from, to, url } => update_marks(tree, from, to, |m| m.link = url.clone()),
        Edit::SetTaskChecked { block, checked } => set_task_checked(tree, block, *checked),
        Edit::ReplaceAll { tree: replacement } => {
            *tree = replacement.clone();
            tree.prune();
            match tree.first_textblock() {
                Some(first) => EditOutcome::caret(Position::start_of(first)),
                None => EditOutcome::changed(),
            }
        }
    };
    if !outcome.changed {
        tracing::trace!(target: "quire::edit", ?edit, "edit had no effect");
    }
    outcome
}

/// Clamp a position into its text block, or `None` when it is not in one.
pub fn clamp(tree: &Tree, position: &Position) -> Option<Position> {
    let content = tree.content(&position.block)?;
    Some(Position::new(
        position.block.clone(),
        position.offset.min(inline::text_len(content)),
    ))
}

/// Character range covered in every text block between two positions.
pub fn text_ranges(tree: &Tree, from: &Position, to: &Position) -> Vec<(BlockPath, Range<usize>)> {
    let (start, end) = if from <= to { (from, to) } else { (to, from) };
    tree.textblock_paths()
        .into_iter()
        .filter(|p| *p >= start.block && *p <= end.block)
        .map(|p| {
            let len = tree.text_len(&p);
            let lo = if p == start.block { start.offset.min(len) } else { 0 };
            let hi = if p == end.block { end.offset.min(len) } else { len };
            (p, lo..hi.max(lo))
        })
        .collect()
}

// === Text ===

fn insert_text(tree: &mut Tree, at: &Position, text: &str) -> EditOutcome {
    let Some(at) = clamp(tree, at) else {
        return EditOutcome::unchanged();
    };
    if text.is_empty() {
        return EditOutcome::unchanged();
    }
    let is_code = tree.block(&at.block).is_some_and(Block::is_code_block);
    let Some(content) = tree.content_mut(&at.block) else {
        return EditOutcome::unchanged();
    };
    let marks = is_code.then(Marks::default);
    inline::insert_text(content, at.offset, text, marks);
    let offset = at.offset + text.chars().count();
    EditOutcome::caret(Position::new(at.block, offset))
}

fn remove_block(tree: &mut Tree, path: &[usize]) -> Option<Block> {
    let ix = *path.last()?;
    let siblings = tree.siblings_mut(path)?;
    (ix < siblings.len()).then(|| siblings.remove(ix))
}

fn delete(tree: &mut Tree, from: &Position, to: &Position) -> EditOutcome {
    let (Some(a), Some(b)) = (clamp(tree, from), clamp(tree, to)) else {
        return EditOutcome::unchanged();
    };
    let (start, end) = if a <= b { (a, b) } else { (b, a) };
    if start == end {
        return EditOutcome::unchanged();
    }

    if start.block == end.block {
        if let Some(content) = tree.content_mut(&start.block) {
            inline::delete_range(content, start.offset..end.offset);
        }
        return EditOutcome::caret(start);
    }

    let tail = match tree.content_mut(&end.block) {
        Some(content) => inline::split_off(content, end.offset),
        None => Vec::new(),
    };
    let doomed: Vec<BlockPath> = tree
        .leaf_paths()
        .into_iter()
        .filter(|p| *p > start.block && *p <= end.block)
        .collect();
    for path in doomed.iter().rev() {
        remove_block(tree, path);
    }

    let into_code = tree.block(&start.block).is_some_and(Block::is_code_block);
    if let Some(content) = tree.content_mut(&start.block) {
        inline::split_off(content, start.offset);
        if into_code {
            let text = inline::plain_text(&tail);
            inline::insert_text(content, start.offset, &text, Some(Marks::default()));
        } else {
            content.extend(tail);
            inline::normalize(content);
        }
    }
    tree.prune();
    EditOutcome::caret(start)
}

fn update_marks(
    tree: &mut Tree,
    from: &Position,
    to: &Position,
    f: impl Fn(&mut Marks),
) -> EditOutcome {
    let mut changed = false;
    for (path, range) in text_ranges(tree, from, to) {
        if range.is_empty() || tree.block(&path).is_some_and(Block::is_code_block) {
            continue;
        }
        if let Some(content) = tree.content_mut(&path) {
            let before = content.clone();
            inline::update_marks(content, range, &f);
            changed |= *content != before;
        }
    }
    EditOutcome {
        changed,
        selection: None,
    }
}

fn set_task_checked(tree: &mut Tree, block: &[usize], checked: bool) -> EditOutcome {
    let Some(Parent::ListItem { list, item }) = tree.locate(block).map(|l| l.parent) else {
        return EditOutcome::unchanged();
    };
    let Some(Block::TaskList { items }) = tree.block_mut(&list) else {
        return EditOutcome::unchanged();
    };
    match items.get_mut(item) {
        Some(entry) if entry.checked != checked => {
            entry.checked = checked;
            EditOutcome::changed()
        }
        _ => EditOutcome::unchanged(),
    }
}

// === Block structure ===

fn sibling_path(path: &[usize], delta: usize) -> BlockPath {
    let mut next = path.to_vec();
    if let Some(last) = next.last_mut() {
        *last += delta;
    }
    next
}

/// A block of the same kind as `like`, holding `content`.
fn same_kind(like: &Block, content: Vec<Span>) -> Block {
    match like {
        Block::Heading { level, .. } => Block::Heading {
            level: *level,
            content,
        },
        Block::CodeBlock { language, .. } => Block::CodeBlock {
            language: language.clone(),
            content,
        },
        _ => Block::Paragraph { content },
    }
}

fn split_block(tree: &mut Tree, at: &Position) -> EditOutcome {
    let Some(at) = clamp(tree, at) else {
        return EditOutcome::unchanged();
    };
    let (is_code, is_paragraph) = match tree.block(&at.block) {
        Some(block) => (block.is_code_block(), block.is_paragraph()),
        None => return EditOutcome::unchanged(),
    };
    if is_code {
        return insert_text(tree, &at, "\n");
    }
    if is_paragraph {
        if let Some(outcome) = split_list_item(tree, &at) {
            return outcome;
        }
    }

    let Some(content) = tree.content_mut(&at.block) else {
        return EditOutcome::unchanged();
    };
    let tail = inline::split_off(content, at.offset);
    let ix = at.block.last().copied().unwrap_or(0);
    if let Some(siblings) = tree.siblings_mut(&at.block) {
        siblings.insert(ix + 1, Block::Paragraph { content: tail });
    }
    EditOutcome::caret(Position::start_of(sibling_path(&at.block, 1)))
}

/// Enter inside a paragraph that is a direct child of a list item. Returns
/// `None` when the paragraph is not in a list item.
fn split_list_item(tree: &mut Tree, at: &Position) -> Option<EditOutcome> {
    let location = tree.locate(&at.block)?;
    let Parent::ListItem { list, item } = location.parent else {
        return None;
    };
    let is_empty = tree.block(&at.block)?.is_empty_textblock();
    let list_block = tree.block(&list)?;
    let items = list_block.items()?;
    let is_last = item + 1 == items.len();
    let lone_child = items.get(item)?.children.len() == 1;

    if is_empty && is_last && lone_child {
        // Leave the list: the empty last item becomes a paragraph after it.
        let single = items.len() == 1;
        let list_ix = *list.last()?;
        if single {
            let siblings = tree.siblings_mut(&list)?;
            siblings[list_ix] = Block::empty_paragraph();
            return Some(EditOutcome::caret(Position::start_of(list)));
        }
        tree.block_mut(&list)?.items_mut()?.pop();
        let siblings = tree.siblings_mut(&list)?;
        siblings.insert(list_ix + 1, Block::empty_paragraph());
        return Some(EditOutcome::caret(Position::start_of(sibling_path(&list, 1))));
    }

    let tail = inline::split_off(tree.content_mut(&at.block)?, at.offset);
    let items = tree.block_mut(&list)?.items_mut()?;
    let current = items.get_mut(item)?;
    let mut children = vec![Block::Paragraph { content: tail }];
    children.extend(current.children.split_off(location.index + 1));
    items.insert(item + 1, ListItem::new(children));

    let mut caret = list;
    caret.extend([item + 1, 0]);
    Some(EditOutcome::caret(Position::start_of(caret)))
}

fn transform(tree: &mut Tree, at: &Position, command: BlockCommand) -> EditOutcome {
    let Some(at) = clamp(tree, at) else {
        return EditOutcome::unchanged();
    };
    match command {
        BlockCommand::Paragraph
        | BlockCommand::Heading1
        | BlockCommand::Heading2
        | BlockCommand::Heading3
        | BlockCommand::CodeBlock => retype(tree, at, command),
        BlockCommand::BulletList => wrap_in_list(tree, at, ListKind::Bullet),
        BlockCommand::OrderedList => wrap_in_list(tree, at, ListKind::Ordered),
        BlockCommand::TaskList => wrap_in_list(tree, at, ListKind::Task),
        BlockCommand::Blockquote => wrap_in_quote(tree, at),
        BlockCommand::HorizontalRule => insert_rule(tree, at),
    }
}

fn retype(tree: &mut Tree, at: Position, command: BlockCommand) -> EditOutcome {
    let Some(block) = tree.block_mut(&at.block) else {
        return EditOutcome::unchanged();
    };
    let before = block.clone();
    let content = block.take_content();
    *block = match command {
        BlockCommand::CodeBlock => {
            let text = inline::plain_text(&content);
            let language = match &before {
                Block::CodeBlock { language, .. } => language.clone(),
                _ => None,
            };
            Block::CodeBlock {
                language,
                content: if text.is_empty() {
                    Vec::new()
                } else {
                    vec![Span::plain(text)]
                },
            }
        }
        command => match command.heading_level() {
            Some(level) => Block::Heading { level, content },
            None => Block::Paragraph { content },
        },
    };
    if *block == before {
        return EditOutcome::unchanged();
    }
    EditOutcome::caret(at)
}

fn wrap_in_list(tree: &mut Tree, at: Position, kind: ListKind) -> EditOutcome {
    let Some(location) = tree.locate(&at.block) else {
        return EditOutcome::unchanged();
    };

    if let Parent::ListItem { list, .. } = &location.parent {
        let Some(list_block) = tree.block_mut(list) else {
            return EditOutcome::unchanged();
        };
        if list_block.list_kind() == Some(kind) {
            return EditOutcome::unchanged();
        }
        let items = list_block.items_mut().map(std::mem::take).unwrap_or_default();
        *list_block = kind.build(items);
        return EditOutcome::caret(at);
    }

    let Some(block) = remove_block(tree, &at.block) else {
        return EditOutcome::unchanged();
    };
    if let Some(siblings) = tree.siblings_mut(&at.block) {
        siblings.insert(location.index, kind.build(vec![ListItem::new(vec![block])]));
    }
    let mut caret = at.block;
    caret.extend([0, 0]);
    EditOutcome::caret(Position::new(caret, at.offset))
}

fn wrap_in_quote(tree: &mut Tree, at: Position) -> EditOutcome {
    if tree.is_quoted(&at.block) {
        return EditOutcome::unchanged();
    }
    let ix = at.block.last().copied().unwrap_or(0);
    let Some(block) = remove_block(tree, &at.block) else {
        return EditOutcome::unchanged();
    };
    if let Some(siblings) = tree.siblings_mut(&at.block) {
        siblings.insert(
            ix,
            Block::Blockquote {
                children: vec![block],
            },
        );
    }
    let mut caret = at.block;
    caret.push(0);
    EditOutcome::caret(Position::new(caret, at.offset))
}

fn insert_rule(tree: &mut Tree, at: Position) -> EditOutcome {
    let ix = at.block.last().copied().unwrap_or(0);
    let Some(block) = tree.block_mut(&at.block) else {
        return EditOutcome::unchanged();
    };

    if block.is_empty_textblock() {
        *block = Block::HorizontalRule;
        if let Some(siblings) = tree.siblings_mut(&at.block) {
            siblings.insert(ix + 1, Block::empty_paragraph());
        }
        return EditOutcome::caret(Position::start_of(sibling_path(&at.block, 1)));
    }

    let kind = block.clone();
    let tail = block
        .content_mut()
        .map(|c| inline::split_off(c, at.offset))
        .unwrap_or_default();
    let head_empty = block.is_empty_textblock();
    let Some(siblings) = tree.siblings_mut(&at.block) else {
        return EditOutcome::unchanged();
    };

    if head_empty {
        siblings[ix] = Block::HorizontalRule;
        siblings.insert(ix + 1, same_kind(&kind, tail));
        return EditOutcome::caret(Position::start_of(sibling_path(&at.block, 1)));
    }
    let after = if tail.is_empty() {
        Block::empty_paragraph()
    } else {
        same_kind(&kind, tail)
    };
    siblings.insert(ix + 1, Block::HorizontalRule);
    siblings.insert(ix + 2, after);
    EditOutcome::caret(Position::start_of(sibling_path(&at.block, 2)))
}
