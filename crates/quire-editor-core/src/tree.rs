//! The editable block tree.
//!
//! A [`Tree`] is a list of [`Block`]s. Text blocks (paragraph, heading, code
//! block) hold inline [`Span`]s and are the only places a caret can sit.
//! Containers (lists, blockquotes) hold further blocks. A horizontal rule is a
//! leaf with no text.

use serde::{Deserialize, Serialize};

use crate::inline::{self, Span};
use crate::types::BlockPath;

/// Root of an editable document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub blocks: Vec<Block>,
}

/// A block-level node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Paragraph {
        content: Vec<Span>,
    },
    /// Levels 1 to 3.
    Heading {
        level: u8,
        content: Vec<Span>,
    },
    /// Code text lives in unmarked spans.
    CodeBlock {
        language: Option<String>,
        content: Vec<Span>,
    },
    BulletList {
        items: Vec<ListItem>,
    },
    OrderedList {
        start: u64,
        items: Vec<ListItem>,
    },
    TaskList {
        items: Vec<ListItem>,
    },
    Blockquote {
        children: Vec<Block>,
    },
    HorizontalRule,
}

/// One item of a list. `checked` is only meaningful inside a task list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListItem {
    #[serde(default)]
    pub checked: bool,
    pub children: Vec<Block>,
}

impl ListItem {
    pub fn new(children: Vec<Block>) -> Self {
        Self {
            checked: false,
            children,
        }
    }

    /// An item holding one empty paragraph.
    pub fn empty() -> Self {
        Self::new(vec![Block::empty_paragraph()])
    }
}

/// The three kinds of list, used when wrapping or retyping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    Bullet,
    Ordered,
    Task,
}

impl ListKind {
    /// Wrap items in a list block of this kind.
    pub fn build(self, items: Vec<ListItem>) -> Block {
        match self {
            ListKind::Bullet => Block::BulletList { items },
            ListKind::Ordered => Block::OrderedList { start: 1, items },
            ListKind::Task => Block::TaskList { items },
        }
    }
}

/// Where a block sits relative to its container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Parent {
    Root,
    /// Path of the enclosing blockquote.
    Blockquote(BlockPath),
    /// Path of the enclosing list and the item index.
    ListItem { list: BlockPath, item: usize },
}

/// A block's container plus its index among the container's children.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub parent: Parent,
    pub index: usize,
}

impl Block {
    pub fn paragraph(content: Vec<Span>) -> Self {
        Block::Paragraph { content }
    }

    pub fn empty_paragraph() -> Self {
        Block::Paragraph {
            content: Vec::new(),
        }
    }

    pub fn is_textblock(&self) -> bool {
        matches!(
            self,
            Block::Paragraph { .. } | Block::Heading { .. } | Block::CodeBlock { .. }
        )
    }

    pub fn is_paragraph(&self) -> bool {
        matches!(self, Block::Paragraph { .. })
    }

    pub fn is_code_block(&self) -> bool {
        matches!(self, Block::CodeBlock { .. })
    }

    pub fn content(&self) -> Option<&Vec<Span>> {
        match self {
            Block::Paragraph { content }
            | Block::Heading { content, .. }
            | Block::CodeBlock { content, .. } => Some(content),
            _ => None,
        }
    }

    pub fn content_mut(&mut self) -> Option<&mut Vec<Span>> {
        match self {
            Block::Paragraph { content }
            | Block::Heading { content, .. }
            | Block::CodeBlock { content, .. } => Some(content),
            _ => None,
        }
    }

    /// Take the inline content out, leaving the block empty.
    pub fn take_content(&mut self) -> Vec<Span> {
        self.content_mut().map(std::mem::take).unwrap_or_default()
    }

    pub fn items(&self) -> Option<&Vec<ListItem>> {
        match self {
            Block::BulletList { items }
            | Block::OrderedList { items, .. }
            | Block::TaskList { items } => Some(items),
            _ => None,
        }
    }

    pub fn items_mut(&mut self) -> Option<&mut Vec<ListItem>> {
        match self {
            Block::BulletList { items }
            | Block::OrderedList { items, .. }
            | Block::TaskList { items } => Some(items),
            _ => None,
        }
    }

    pub fn list_kind(&self) -> Option<ListKind> {
        match self {
            Block::BulletList { .. } => Some(ListKind::Bullet),
            Block::OrderedList { .. } => Some(ListKind::Ordered),
            Block::TaskList { .. } => Some(ListKind::Task),
            _ => None,
        }
    }

    /// Plain text of a text block, empty for anything else.
    pub fn plain_text(&self) -> String {
        self.content().map(|c| inline::plain_text(c)).unwrap_or_default()
    }

    /// True for a text block with no characters.
    pub fn is_empty_textblock(&self) -> bool {
        self.content().is_some_and(|c| inline::text_len(c) == 0)
    }
}

// === Path navigation ===

fn resolve<'a>(blocks: &'a [Block], path: &[usize]) -> Option<&'a Block> {
    let (&first, rest) = path.split_first()?;
    let block = blocks.get(first)?;
    if rest.is_empty() {
        return Some(block);
    }
    match block {
        Block::Blockquote { children } => resolve(children, rest),
        _ => {
            let (&item, rest) = rest.split_first()?;
            let item = block.items()?.get(item)?;
            resolve(&item.children, rest)
        }
    }
}

fn resolve_mut<'a>(blocks: &'a mut [Block], path: &[usize]) -> Option<&'a mut Block> {
    let (&first, rest) = path.split_first()?;
    let block = blocks.get_mut(first)?;
    if rest.is_empty() {
        return Some(block);
    }
    match block {
        Block::Blockquote { children } => resolve_mut(children, rest),
        _ => {
            let (&item, rest) = rest.split_first()?;
            let item = block.items_mut()?.get_mut(item)?;
            resolve_mut(&mut item.children, rest)
        }
    }
}

fn siblings_mut<'a>(blocks: &'a mut Vec<Block>, path: &[usize]) -> Option<&'a mut Vec<Block>> {
    let (&first, rest) = path.split_first()?;
    if rest.is_empty() {
        return Some(blocks);
    }
    let block = blocks.get_mut(first)?;
    match block {
        Block::Blockquote { children } => siblings_mut(children, rest),
        _ => {
            let (&item, rest) = rest.split_first()?;
            let item = block.items_mut()?.get_mut(item)?;
            siblings_mut(&mut item.children, rest)
        }
    }
}

fn collect_leaves(blocks: &[Block], prefix: &mut BlockPath, out: &mut Vec<BlockPath>, text_only: bool) {
    for (i, block) in blocks.iter().enumerate() {
        prefix.push(i);
        match block {
            Block::Blockquote { children } => collect_leaves(children, prefix, out, text_only),
            Block::HorizontalRule => {
                if !text_only {
                    out.push(prefix.clone());
                }
            }
            b if b.is_textblock() => out.push(prefix.clone()),
            b => {
                for (j, item) in b.items().into_iter().flatten().enumerate() {
                    prefix.push(j);
                    collect_leaves(&item.children, prefix, out, text_only);
                    prefix.pop();
                }
            }
        }
        prefix.pop();
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// A document holding one empty paragraph.
    pub fn new() -> Self {
        Self {
            blocks: vec![Block::empty_paragraph()],
        }
    }

    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        let mut tree = Self { blocks };
        tree.ensure_textblock();
        tree
    }

    /// Block at `path`, if any.
    pub fn block(&self, path: &[usize]) -> Option<&Block> {
        resolve(&self.blocks, path)
    }

    pub fn block_mut(&mut self, path: &[usize]) -> Option<&mut Block> {
        resolve_mut(&mut self.blocks, path)
    }

    /// The children vector holding the block at `path`.
    pub fn siblings_mut(&mut self, path: &[usize]) -> Option<&mut Vec<Block>> {
        siblings_mut(&mut self.blocks, path)
    }

    /// Inline content of the text block at `path`.
    pub fn content(&self, path: &[usize]) -> Option<&Vec<Span>> {
        self.block(path)?.content()
    }

    pub fn content_mut(&mut self, path: &[usize]) -> Option<&mut Vec<Span>> {
        self.block_mut(path)?.content_mut()
    }

    /// Length of the text block at `path` in characters, zero when absent.
    pub fn text_len(&self, path: &[usize]) -> usize {
        self.content(path).map(|c| inline::text_len(c)).unwrap_or(0)
    }

    pub fn plain_text(&self, path: &[usize]) -> Option<String> {
        self.content(path).map(|c| inline::plain_text(c))
    }

    /// Paths of every text block in document order.
    pub fn textblock_paths(&self) -> Vec<BlockPath> {
        let mut out = Vec::new();
        collect_leaves(&self.blocks, &mut Vec::new(), &mut out, true);
        out
    }

    /// Paths of every leaf (text blocks and rules) in document order.
    pub fn leaf_paths(&self) -> Vec<BlockPath> {
        let mut out = Vec::new();
        collect_leaves(&self.blocks, &mut Vec::new(), &mut out, false);
        out
    }

    pub fn first_textblock(&self) -> Option<BlockPath> {
        self.textblock_paths().into_iter().next()
    }

    pub fn last_textblock(&self) -> Option<BlockPath> {
        self.textblock_paths().pop()
    }

    /// Work out which container holds the block at `path`.
    pub fn locate(&self, path: &[usize]) -> Option<Location> {
        let mut blocks: &[Block] = &self.blocks;
        let mut parent = Parent::Root;
        let mut prefix = Vec::new();
        let mut i = 0;
        loop {
            let ix = *path.get(i)?;
            let block = blocks.get(ix)?;
            if i == path.len() - 1 {
                return Some(Location { parent, index: ix });
            }
            prefix.push(ix);
            match block {
                Block::Blockquote { children } => {
                    parent = Parent::Blockquote(prefix.clone());
                    blocks = children;
                    i += 1;
                }
                _ => {
                    let item_ix = *path.get(i + 1)?;
                    let item = block.items()?.get(item_ix)?;
                    parent = Parent::ListItem {
                        list: prefix.clone(),
                        item: item_ix,
                    };
                    prefix.push(item_ix);
                    blocks = &item.children;
                    i += 2;
                }
            }
        }
    }

    /// True when any ancestor of `path` is a blockquote.
    pub fn is_quoted(&self, path: &[usize]) -> bool {
        (1..path.len()).any(|n| matches!(self.block(&path[..n]), Some(Block::Blockquote { .. })))
    }

    /// True when every text block is empty and there are no rules.
    pub fn is_empty(&self) -> bool {
        self.leaf_paths()
            .iter()
            .all(|p| self.block(p).is_some_and(Block::is_empty_textblock))
    }

    /// Remove containers left without children and guarantee at least one
    /// text block so the caret always has somewhere to go.
    pub fn prune(&mut self) {
        prune_blocks(&mut self.blocks);
        self.ensure_textblock();
    }

    fn ensure_textblock(&mut self) {
        if self.textblock_paths().is_empty() {
            self.blocks.push(Block::empty_paragraph());
        }
    }
}

fn prune_blocks(blocks: &mut Vec<Block>) {
    for block in blocks.iter_mut() {
        match block {
            Block::Blockquote { children } => prune_blocks(children),
            b => {
                if let Some(items) = b.items_mut() {
                    for item in items.iter_mut() {
                        prune_blocks(&mut item.children);
                    }
                    items.retain(|item| !item.children.is_empty());
                }
            }
        }
    }
    blocks.retain(|b| match b {
        Block::Blockquote { children } => !children.is_empty(),
        b => b.items().is_none_or(|items| !items.is_empty()),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Tree {
        Tree::from_blocks(vec![
            Block::paragraph(vec![Span::plain("intro")]),
            Block::BulletList {
                items: vec![
                    ListItem::new(vec![Block::paragraph(vec![Span::plain("one")])]),
                    ListItem::new(vec![
                        Block::paragraph(vec![Span::plain("two")]),
                        Block::Blockquote {
                            children: vec![Block::paragraph(vec![Span::plain("deep")])],
                        },
                    ]),
                ],
            },
            Block::HorizontalRule,
        ])
    }

    #[test]
    fn test_textblock_paths_in_order() {
        let tree = sample();
        assert_eq!(
            tree.textblock_paths(),
            vec![vec![0], vec![1, 0, 0], vec![1, 1, 0], vec![1, 1, 1, 0]]
        );
        assert_eq!(tree.leaf_paths().last(), Some(&vec![2]));
    }

    #[test]
    fn test_resolve_nested() {
        let tree = sample();
        assert_eq!(tree.plain_text(&[1, 1, 1, 0]).as_deref(), Some("deep"));
        assert!(tree.block(&[1, 5, 0]).is_none());
        assert!(tree.is_quoted(&[1, 1, 1, 0]));
        assert!(!tree.is_quoted(&[1, 1, 0]));
    }

    #[test]
    fn test_locate_list_child() {
        let tree = sample();
        let loc = tree.locate(&[1, 1, 0]).unwrap();
        assert_eq!(
            loc.parent,
            Parent::ListItem {
                list: vec![1],
                item: 1
            }
        );
        assert_eq!(loc.index, 0);
        let loc = tree.locate(&[1, 1, 1, 0]).unwrap();
        assert_eq!(loc.parent, Parent::Blockquote(vec![1, 1, 1]));
    }

    #[test]
    fn test_prune_removes_empty_containers() {
        let mut tree = Tree::from_blocks(vec![
            Block::BulletList {
                items: vec![ListItem::new(vec![])],
            },
            Block::Blockquote { children: vec![] },
        ]);
        tree.prune();
        assert_eq!(tree, Tree::new());
    }
}
