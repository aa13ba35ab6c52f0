//! Markdown to tree conversion, driven by pulldown-cmark events.

use std::ops::Range;

use miette::SourceSpan;
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

use super::Degradation;
use crate::inline::{self, Span};
use crate::tree::{Block, ListItem, Tree};
use crate::types::{Mark, Marks};

fn span_of(range: &Range<usize>) -> SourceSpan {
    SourceSpan::new(range.start.into(), range.end - range.start)
}

/// Kind of the text block being filled.
enum TextKind {
    Paragraph,
    Heading(u8),
    Code(Option<String>),
    /// Raw HTML block, degraded to a paragraph.
    Html,
}

struct TextFrame {
    kind: TextKind,
    content: Vec<Span>,
    /// Raw text for code and HTML blocks.
    raw: String,
    /// Opened for inline content in a tight list item, with no paragraph tag.
    implicit: bool,
}

enum Frame {
    Quote(Vec<Block>),
    List {
        start: Option<u64>,
        items: Vec<(Option<bool>, ListItem)>,
        range: Range<usize>,
    },
    Item {
        checked: Option<bool>,
        children: Vec<Block>,
    },
    Text(TextFrame),
}

/// An open inline construct.
enum InlineFrame {
    Mark(Mark),
    Link(String),
    /// An inline HTML tag understood as a mark, closed by its matching end tag.
    Html { name: String, mark: Mark },
}

enum HtmlTag {
    Open(String),
    Close(String),
    SelfClosing(String),
}

fn parse_html_tag(html: &str) -> Option<HtmlTag> {
    let inner = html.trim().strip_prefix('<')?.strip_suffix('>')?;
    let (closing, inner) = match inner.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, inner),
    };
    let name: String = inner
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    if name.is_empty() {
        return None;
    }
    Some(if closing {
        HtmlTag::Close(name)
    } else if inner.trim_end().ends_with('/') {
        HtmlTag::SelfClosing(name)
    } else {
        HtmlTag::Open(name)
    })
}

fn html_mark(name: &str) -> Option<Mark> {
    match name {
        "u" | "ins" => Some(Mark::Underline),
        "mark" => Some(Mark::Highlight),
        "strong" | "b" => Some(Mark::Bold),
        "em" | "i" => Some(Mark::Italic),
        "s" | "del" | "strike" => Some(Mark::Strikethrough),
        "code" => Some(Mark::Code),
        _ => None,
    }
}

/// Builds a [`Tree`] from a stream of parser events.
pub(super) struct TreeBuilder<'s> {
    source: &'s str,
    root: Vec<Block>,
    stack: Vec<Frame>,
    inline: Vec<InlineFrame>,
    /// Nesting depth of images being skipped.
    image_depth: usize,
    degradations: Vec<Degradation>,
}

impl<'s> TreeBuilder<'s> {
    pub(super) fn new(source: &'s str) -> Self {
        Self {
            source,
            root: Vec::new(),
            stack: Vec::new(),
            inline: Vec::new(),
            image_depth: 0,
            degradations: Vec::new(),
        }
    }

    pub(super) fn run(mut self) -> (Tree, Vec<Degradation>) {
        let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
        let source = self.source;
        for (event, range) in Parser::new_ext(source, options).into_offset_iter() {
            tracing::trace!(target: "quire::markdown", event = ?event, byte_range = ?range, "load event");
            self.process_event(event, range);
        }
        // Unbalanced input cannot happen with pulldown-cmark, but close anything
        // left open rather than dropping it.
        while let Some(frame) = self.stack.pop() {
            let blocks = self.finish_frame(frame);
            self.push_blocks(blocks);
        }
        (Tree::from_blocks(self.root), self.degradations)
    }

    fn process_event(&mut self, event: Event<'_>, range: Range<usize>) {
        if self.image_depth > 0 {
            match event {
                Event::Start(Tag::Image { .. }) => self.image_depth += 1,
                Event::End(TagEnd::Image) => self.image_depth -= 1,
                _ => {}
            }
            return;
        }
        match event {
            Event::Start(tag) => self.start_tag(tag, range),
            Event::End(tag) => self.end_tag(tag),
            Event::Text(text) => self.text(&text),
            Event::Code(text) => {
                let marks = self.current_marks().with(Mark::Code);
                self.push_span(&text, marks);
            }
            Event::InlineHtml(html) => self.inline_html(&html, range),
            Event::Html(html) => self.text(&html),
            Event::SoftBreak => self.text(" "),
            Event::HardBreak => self.text("\n"),
            Event::Rule => {
                self.close_implicit();
                self.push_blocks(vec![Block::HorizontalRule]);
            }
            Event::TaskListMarker(checked) => {
                if let Some(Frame::Item { checked: slot, .. }) = self
                    .stack
                    .iter_mut()
                    .rev()
                    .find(|f| matches!(f, Frame::Item { .. }))
                {
                    *slot = Some(checked);
                }
            }
            // Math and footnotes are not enabled, so anything else is unexpected.
            _ => {
                let raw = self.source[range.clone()].to_string();
                self.text(&raw);
                self.degradations.push(Degradation::Other {
                    span: span_of(&range),
                });
            }
        }
    }

    fn start_tag(&mut self, tag: Tag<'_>, range: Range<usize>) {
        match tag {
            Tag::Paragraph => {
                self.close_implicit();
                self.open_text(TextKind::Paragraph, false);
            }
            Tag::Heading { level, .. } => {
                self.close_implicit();
                let level = level as u8;
                if level <= 3 {
                    self.open_text(TextKind::Heading(level), false);
                } else {
                    self.open_text(TextKind::Paragraph, false);
                    self.push_span(&format!("{} ", "#".repeat(level as usize)), Marks::default());
                    self.degradations.push(Degradation::HeadingLevel {
                        level,
                        span: span_of(&range),
                    });
                }
            }
            Tag::CodeBlock(kind) => {
                self.close_implicit();
                let language = match kind {
                    CodeBlockKind::Fenced(info) => {
                        let info = info.trim();
                        (!info.is_empty()).then(|| info.to_string())
                    }
                    CodeBlockKind::Indented => None,
                };
                self.open_text(TextKind::Code(language), false);
            }
            Tag::HtmlBlock => {
                self.close_implicit();
                self.open_text(TextKind::Html, false);
                self.degradations.push(Degradation::HtmlBlock {
                    span: span_of(&range),
                });
            }
            Tag::BlockQuote(_) => {
                self.close_implicit();
                self.stack.push(Frame::Quote(Vec::new()));
            }
            Tag::List(start) => {
                self.close_implicit();
                self.stack.push(Frame::List {
                    start,
                    items: Vec::new(),
                    range,
                });
            }
            Tag::Item => {
                self.stack.push(Frame::Item {
                    checked: None,
                    children: Vec::new(),
                });
            }
            Tag::Emphasis => self.inline.push(InlineFrame::Mark(Mark::Italic)),
            Tag::Strong => self.inline.push(InlineFrame::Mark(Mark::Bold)),
            Tag::Strikethrough => self.inline.push(InlineFrame::Mark(Mark::Strikethrough)),
            Tag::Link { dest_url, .. } => self.inline.push(InlineFrame::Link(dest_url.to_string())),
            Tag::Image { .. } => {
                let raw = self.source[range.clone()].to_string();
                self.text(&raw);
                self.image_depth = 1;
                self.degradations.push(Degradation::Image {
                    span: span_of(&range),
                });
            }
            _ => {
                self.degradations.push(Degradation::Other {
                    span: span_of(&range),
                });
            }
        }
    }

    fn end_tag(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::CodeBlock | TagEnd::HtmlBlock => {
                if let Some(Frame::Text(_)) = self.stack.last() {
                    self.pop_and_push();
                }
                self.inline.clear();
            }
            TagEnd::BlockQuote(_) | TagEnd::List(_) => {
                self.close_implicit();
                self.pop_and_push();
            }
            TagEnd::Item => {
                self.close_implicit();
                self.finish_item();
            }
            TagEnd::Emphasis => self.close_inline(|f| matches!(f, InlineFrame::Mark(Mark::Italic))),
            TagEnd::Strong => self.close_inline(|f| matches!(f, InlineFrame::Mark(Mark::Bold))),
            TagEnd::Strikethrough => {
                self.close_inline(|f| matches!(f, InlineFrame::Mark(Mark::Strikethrough)))
            }
            TagEnd::Link => self.close_inline(|f| matches!(f, InlineFrame::Link(_))),
            _ => {}
        }
    }

    // === Inline content ===

    fn current_marks(&self) -> Marks {
        let mut marks = Marks::default();
        for frame in &self.inline {
            match frame {
                InlineFrame::Mark(mark) | InlineFrame::Html { mark, .. } => marks.set(*mark, true),
                InlineFrame::Link(url) => marks.link = Some(url.clone()),
            }
        }
        marks
    }

    fn close_inline(&mut self, pred: impl Fn(&InlineFrame) -> bool) {
        if let Some(ix) = self.inline.iter().rposition(pred) {
            self.inline.remove(ix);
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(Frame::Text(frame)) = self.stack.last_mut() {
            if matches!(frame.kind, TextKind::Code(_) | TextKind::Html) {
                frame.raw.push_str(text);
                return;
            }
        }
        let marks = self.current_marks();
        self.push_span(text, marks);
    }

    fn push_span(&mut self, text: &str, marks: Marks) {
        if !matches!(self.stack.last(), Some(Frame::Text(_))) {
            self.open_text(TextKind::Paragraph, true);
        }
        if let Some(Frame::Text(frame)) = self.stack.last_mut() {
            frame.content.push(Span::new(text, marks));
        }
    }

    fn inline_html(&mut self, html: &str, range: Range<usize>) {
        match parse_html_tag(html) {
            Some(HtmlTag::Open(name) | HtmlTag::SelfClosing(name)) if name == "br" => {
                self.text("\n");
            }
            Some(HtmlTag::Open(name)) if html_mark(&name).is_some() => {
                if let Some(mark) = html_mark(&name) {
                    self.inline.push(InlineFrame::Html { name, mark });
                }
            }
            Some(HtmlTag::Close(name))
                if self
                    .inline
                    .iter()
                    .any(|f| matches!(f, InlineFrame::Html { name: n, .. } if *n == name)) =>
            {
                self.close_inline(|f| matches!(f, InlineFrame::Html { name: n, .. } if *n == name));
            }
            _ => {
                self.degradations.push(Degradation::InlineHtml {
                    tag: html.trim().to_string(),
                    span: span_of(&range),
                });
                self.text(html);
            }
        }
    }

    // === Block structure ===

    fn open_text(&mut self, kind: TextKind, implicit: bool) {
        self.stack.push(Frame::Text(TextFrame {
            kind,
            content: Vec::new(),
            raw: String::new(),
            implicit,
        }));
    }

    fn close_implicit(&mut self) {
        if matches!(self.stack.last(), Some(Frame::Text(TextFrame { implicit: true, .. }))) {
            self.pop_and_push();
            self.inline.clear();
        }
    }

    fn pop_and_push(&mut self) {
        if let Some(frame) = self.stack.pop() {
            let blocks = self.finish_frame(frame);
            self.push_blocks(blocks);
        }
    }

    /// Move the item on top of the stack into its enclosing list.
    fn finish_item(&mut self) {
        if !matches!(self.stack.last(), Some(Frame::Item { .. })) {
            return;
        }
        let Some(Frame::Item { checked, children }) = self.stack.pop() else {
            return;
        };
        let item = ListItem {
            checked: false,
            children,
        };
        match self.stack.last_mut() {
            Some(Frame::List { items, .. }) => items.push((checked, item)),
            _ => {
                let blocks = self.finish_frame(Frame::Item {
                    checked,
                    children: item.children,
                });
                self.push_blocks(blocks);
            }
        }
    }

    fn push_blocks(&mut self, blocks: Vec<Block>) {
        match self.stack.last_mut() {
            Some(Frame::Quote(children)) | Some(Frame::Item { children, .. }) => {
                children.extend(blocks)
            }
            Some(Frame::List { items, .. }) => {
                // Blocks never sit directly in a list; wrap them in an item.
                items.push((None, ListItem::new(blocks)));
            }
            Some(Frame::Text(_)) => {
                // A block inside a text block only happens on malformed input;
                // close the text block first.
                self.pop_and_push();
                self.push_blocks(blocks);
            }
            None => self.root.extend(blocks),
        }
    }

    fn finish_frame(&mut self, frame: Frame) -> Vec<Block> {
        match frame {
            Frame::Text(text) => vec![finish_text(text)],
            Frame::Quote(mut children) => {
                if children.is_empty() {
                    children.push(Block::empty_paragraph());
                }
                vec![Block::Blockquote { children }]
            }
            Frame::Item { checked, children } => {
                // Only reachable when the stream ends mid-item.
                vec![Block::BulletList {
                    items: vec![ListItem {
                        checked: checked.unwrap_or(false),
                        children,
                    }],
                }]
            }
            Frame::List {
                start,
                items,
                range,
            } => self.finish_list(start, items, range),
        }
    }

    fn finish_list(
        &mut self,
        start: Option<u64>,
        items: Vec<(Option<bool>, ListItem)>,
        range: Range<usize>,
    ) -> Vec<Block> {
        let items = items.into_iter().map(|(checked, mut item)| {
            if item.children.is_empty() {
                item.children.push(Block::empty_paragraph());
            }
            (checked, item)
        });

        if let Some(start) = start {
            let mut ordered = Vec::new();
            for (checked, mut item) in items {
                if let Some(checked) = checked {
                    let marker = if checked { "[x] " } else { "[ ] " };
                    match item.children.first_mut().and_then(Block::content_mut) {
                        Some(content) => inline::insert_text(content, 0, marker, Some(Marks::default())),
                        None => item
                            .children
                            .insert(0, Block::paragraph(vec![Span::plain(marker.trim_end())])),
                    }
                    self.degradations.push(Degradation::OrderedTask {
                        span: span_of(&range),
                    });
                }
                ordered.push(item);
            }
            return vec![Block::OrderedList {
                start,
                items: ordered,
            }];
        }

        // A bullet list mixing plain and task items becomes consecutive runs.
        let mut blocks: Vec<Block> = Vec::new();
        for (checked, mut item) in items {
            let is_task = checked.is_some();
            item.checked = checked.unwrap_or(false);
            match blocks.last_mut() {
                Some(Block::TaskList { items }) if is_task => items.push(item),
                Some(Block::BulletList { items }) if !is_task => items.push(item),
                _ if is_task => blocks.push(Block::TaskList { items: vec![item] }),
                _ => blocks.push(Block::BulletList { items: vec![item] }),
            }
        }
        blocks
    }
}

fn finish_text(frame: TextFrame) -> Block {
    let TextFrame {
        kind,
        mut content,
        raw,
        ..
    } = frame;
    inline::normalize(&mut content);
    match kind {
        TextKind::Paragraph => Block::Paragraph { content },
        TextKind::Heading(level) => Block::Heading { level, content },
        TextKind::Code(language) => {
            let text = raw.strip_suffix('\n').unwrap_or(&raw);
            let content = if text.is_empty() {
                Vec::new()
            } else {
                vec![Span::plain(text)]
            };
            Block::CodeBlock { language, content }
        }
        TextKind::Html => {
            let text = raw.trim_end_matches('\n');
            let content = if text.is_empty() {
                Vec::new()
            } else {
                vec![Span::plain(text)]
            };
            Block::Paragraph { content }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::{load, load_with_report};

    #[test]
    fn test_empty_input_is_one_paragraph() {
        assert_eq!(load(""), Tree::new());
        assert_eq!(load("\n\n"), Tree::new());
    }

    #[test]
    fn test_inline_marks() {
        let tree = load("a **b** *c* ~~d~~ `e` <u>f</u> <mark>g</mark> [h](u)");
        let content = tree.content(&[0]).unwrap();
        let marked: Vec<(&str, &Marks)> = content.iter().map(|s| (s.text.as_str(), &s.marks)).collect();
        assert_eq!(marked[1], ("b", &Marks::default().with(Mark::Bold)));
        assert_eq!(marked[3], ("c", &Marks::default().with(Mark::Italic)));
        assert_eq!(marked[5], ("d", &Marks::default().with(Mark::Strikethrough)));
        assert_eq!(marked[7], ("e", &Marks::default().with(Mark::Code)));
        assert_eq!(marked[9], ("f", &Marks::default().with(Mark::Underline)));
        assert_eq!(marked[11], ("g", &Marks::default().with(Mark::Highlight)));
        assert_eq!(marked[13], ("h", &Marks::default().with_link("u")));
    }

    #[test]
    fn test_tight_list_items_get_paragraphs() {
        let tree = load("- one\n- two");
        let Block::BulletList { items } = &tree.blocks[0] else {
            panic!("expected a bullet list, got {:?}", tree.blocks[0]);
        };
        assert_eq!(items.len(), 2);
        assert_eq!(tree.plain_text(&[0, 1, 0]).as_deref(), Some("two"));
    }

    #[test]
    fn test_list_items_stay_one_level() {
        let tree = load("- a");
        assert_eq!(
            tree.blocks,
            vec![Block::BulletList {
                items: vec![ListItem::new(vec![Block::paragraph(vec![Span::plain("a")])])],
            }]
        );
        assert_eq!(crate::markdown::serialize(&tree), "- a");
        assert_eq!(crate::markdown::serialize(&load("- a")), "- a");

        let tree = load("- [x] done");
        assert_eq!(
            tree.blocks,
            vec![Block::TaskList {
                items: vec![ListItem {
                    checked: true,
                    children: vec![Block::paragraph(vec![Span::plain("done")])],
                }],
            }]
        );
        assert_eq!(crate::markdown::serialize(&tree), "- [x] done");
    }

    #[test]
    fn test_mixed_task_list_splits() {
        let tree = load("- plain\n- [x] done\n- [ ] open");
        assert!(matches!(tree.blocks[0], Block::BulletList { .. }));
        let Block::TaskList { items } = &tree.blocks[1] else {
            panic!("expected a task list");
        };
        assert!(items[0].checked);
        assert!(!items[1].checked);
    }

    #[test]
    fn test_deep_heading_degrades() {
        let (tree, report) = load_with_report("#### Deep");
        assert_eq!(tree.blocks[0], Block::paragraph(vec![Span::plain("#### Deep")]));
        assert!(matches!(report[0], Degradation::HeadingLevel { level: 4, .. }));
    }

    #[test]
    fn test_image_keeps_source() {
        let (tree, report) = load_with_report("see ![cat](cat.png) here");
        assert_eq!(tree.plain_text(&[0]).as_deref(), Some("see ![cat](cat.png) here"));
        assert_eq!(report.len(), 1);
    }

    #[test]
    fn test_unknown_inline_html_is_text() {
        let (tree, report) = load_with_report("a <span>b</span>");
        assert_eq!(tree.plain_text(&[0]).as_deref(), Some("a <span>b</span>"));
        assert_eq!(report.len(), 2);
    }

    #[test]
    fn test_html_block_is_paragraph() {
        let (tree, report) = load_with_report("<div>\nhi\n</div>");
        assert_eq!(tree.plain_text(&[0]).as_deref(), Some("<div>\nhi\n</div>"));
        assert!(matches!(report[0], Degradation::HtmlBlock { .. }));
    }

    #[test]
    fn test_code_block_language_and_text() {
        let tree = load("```rust\nfn main() {}\n```");
        assert_eq!(
            tree.blocks[0],
            Block::CodeBlock {
                language: Some("rust".into()),
                content: vec![Span::plain("fn main() {}")],
            }
        );
    }

    #[test]
    fn test_hard_break_and_br() {
        let tree = load("a\\\nb<br>c");
        assert_eq!(tree.plain_text(&[0]).as_deref(), Some("a\nb\nc"));
    }

    #[test]
    fn test_space_entity_survives() {
        let tree = load("&#32;&#32;x");
        assert_eq!(tree.plain_text(&[0]).as_deref(), Some("  x"));
    }
}
