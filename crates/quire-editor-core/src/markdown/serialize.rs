//! Tree to canonical Markdown.

use quire_common::perf::TimingGuard;

use super::inline::{self, Emphasis};
use crate::inline::{self as spans, Span};
use crate::tree::{Block, ListItem, ListKind, Tree};

/// Write the canonical Markdown for a tree.
///
/// Blocks are separated by one blank line and the output has no trailing
/// newline. Empty paragraphs are not written.
pub fn serialize(tree: &Tree) -> String {
    let _timing = TimingGuard::new("markdown::serialize");
    render_blocks(&tree.blocks)
}

/// A block as written: adjacent lists of the same kind are one list, since
/// they would parse back that way.
enum Item<'a> {
    Block(&'a Block),
    List {
        first: &'a Block,
        items: Vec<&'a ListItem>,
    },
}

fn is_blank(block: &Block) -> bool {
    match block {
        Block::Paragraph { content } => content.iter().all(|s| s.text.chars().all(|c| c == '\n')),
        _ => false,
    }
}

fn visible(blocks: &[Block]) -> Vec<Item<'_>> {
    let mut out: Vec<Item<'_>> = Vec::new();
    for block in blocks.iter().filter(|b| !is_blank(b)) {
        let (Some(kind), Some(more)) = (block.list_kind(), block.items()) else {
            out.push(Item::Block(block));
            continue;
        };
        if let Some(Item::List { first, items }) = out.last_mut() {
            if first.list_kind() == Some(kind) {
                items.extend(more);
                continue;
            }
        }
        out.push(Item::List {
            first: block,
            items: more.iter().collect(),
        });
    }
    out
}

fn render_blocks(blocks: &[Block]) -> String {
    visible(blocks)
        .iter()
        .map(render_item)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_item(item: &Item<'_>) -> String {
    match item {
        Item::Block(block) => render_block(block),
        Item::List { first, items } => render_list(first, items),
    }
}

fn render_block(block: &Block) -> String {
    match block {
        Block::Paragraph { .. } | Block::Heading { .. } => render_textblock(block),
        Block::CodeBlock { language, content } => render_code(language.as_deref(), content),
        Block::Blockquote { children } => render_blocks(children)
            .split('\n')
            .map(|line| {
                if line.is_empty() {
                    ">".to_string()
                } else {
                    format!("> {line}")
                }
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Block::HorizontalRule => "---".to_string(),
        list => match list.items() {
            Some(items) => render_list(list, &items.iter().collect::<Vec<_>>()),
            None => String::new(),
        },
    }
}

fn render_code(language: Option<&str>, content: &[Span]) -> String {
    let text = spans::plain_text(content);
    let language = language.unwrap_or("");
    let fence_char = if language.contains('`') { '~' } else { '`' };
    let width = (inline::fence_run(&text, fence_char) + 1).max(3);
    let fence: String = std::iter::repeat_n(fence_char, width).collect();

    let mut out = String::with_capacity(text.len() + 2 * width + language.len() + 2);
    out.push_str(&fence);
    out.push_str(language);
    out.push('\n');
    if !text.is_empty() {
        out.push_str(&text);
        out.push('\n');
    }
    out.push_str(&fence);
    out
}

fn render_list(first: &Block, items: &[&ListItem]) -> String {
    let kind = first.list_kind().unwrap_or(ListKind::Bullet);
    let start = match first {
        Block::OrderedList { start, .. } => *start,
        _ => 1,
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| match kind {
            ListKind::Bullet => render_list_item("-", item, None),
            ListKind::Ordered => {
                let marker = format!("{}.", start + i as u64);
                render_list_item(&marker, item, None)
            }
            ListKind::Task => render_list_item("-", item, Some(item.checked)),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// A paragraph directly followed by a list inside an item is written without
/// a blank line, as long as the list may interrupt the paragraph.
fn joins_tight(prev: &Item<'_>, next: &Item<'_>) -> bool {
    let Item::Block(Block::Paragraph { .. }) = prev else {
        return false;
    };
    let Item::List { first, items } = next else {
        return false;
    };
    let opens_with_text = items.first().is_some_and(|item| starts_with_paragraph(&visible(&item.children)));
    let interrupts = match first {
        Block::OrderedList { start, .. } => *start == 1,
        _ => true,
    };
    opens_with_text && interrupts
}

fn starts_with_paragraph(children: &[Item<'_>]) -> bool {
    matches!(children.first(), Some(Item::Block(Block::Paragraph { .. })))
}

/// An item whose first child is not a paragraph gets its marker on a line of
/// its own, with the child on the very next line. On the marker line a rule
/// would read as `- ---`, and a blank line after a bare marker ends the item.
fn render_list_item(marker: &str, item: &ListItem, task: Option<bool>) -> String {
    let children = visible(&item.children);
    let mut text = String::new();
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            text.push_str(if joins_tight(&children[i - 1], child) {
                "\n"
            } else {
                "\n\n"
            });
        }
        text.push_str(&render_item(child));
    }

    let head = match task {
        Some(true) => format!("{marker} [x]"),
        Some(false) => format!("{marker} [ ]"),
        None => marker.to_string(),
    };
    if text.is_empty() {
        // A checkbox needs whitespace after it to count as one.
        return if task.is_some() { format!("{head} ") } else { head };
    }

    let indent = " ".repeat(marker.len() + 1);
    let mut lines = text.split('\n');
    let mut out = head;
    if starts_with_paragraph(&children) {
        out.push(' ');
        out.push_str(lines.next().unwrap_or_default());
    }
    for line in lines {
        out.push('\n');
        if !line.is_empty() {
            out.push_str(&indent);
        }
        out.push_str(line);
    }
    out
}

// === Text blocks ===

fn render_textblock_with(block: &Block, emphasis: Emphasis) -> String {
    match block {
        Block::Heading { level, content } => {
            let hashes = "#".repeat((*level).clamp(1, 3) as usize);
            let text = inline::render(content, true, emphasis);
            if text.is_empty() {
                hashes
            } else {
                format!("{hashes} {text}")
            }
        }
        Block::Paragraph { content } => inline::render(content, false, emphasis),
        _ => String::new(),
    }
}

/// Line breaks carry no marks of their own and vanish at block edges, so
/// compare content with those differences removed.
fn comparable(content: &[Span]) -> Vec<Span> {
    let mut out: Vec<Span> = Vec::new();
    for span in content {
        for (i, part) in span.text.split('\n').enumerate() {
            if i > 0 {
                out.push(Span::plain("\n"));
            }
            out.push(Span::new(part, span.marks.clone()));
        }
    }
    spans::normalize(&mut out);
    while out.first().is_some_and(|s| s.text == "\n") {
        out.remove(0);
    }
    while out.last().is_some_and(|s| s.text == "\n") {
        out.pop();
    }
    out
}

fn reparses(block: &Block, markdown: &str) -> bool {
    let tree = super::load(markdown);
    let [reloaded] = tree.blocks.as_slice() else {
        return false;
    };
    let same_kind = match (block, reloaded) {
        (Block::Paragraph { .. }, Block::Paragraph { .. }) => true,
        (Block::Heading { level: a, .. }, Block::Heading { level: b, .. }) => a == b,
        _ => false,
    };
    same_kind
        && match (block.content(), reloaded.content()) {
            (Some(a), Some(b)) => comparable(a) == comparable(b),
            _ => false,
        }
}

fn render_textblock(block: &Block) -> String {
    let text = render_textblock_with(block, Emphasis::Delimiters);
    let uses_delimiters = block
        .content()
        .is_some_and(|c| c.iter().any(|s| s.marks.bold || s.marks.italic || s.marks.strikethrough));
    if !uses_delimiters || reparses(block, &text) {
        return text;
    }
    let tagged = render_textblock_with(block, Emphasis::Tags);
    if !reparses(block, &tagged) {
        tracing::debug!(target: "quire::markdown", markdown = %tagged, "inline content does not round-trip");
    }
    tagged
}
