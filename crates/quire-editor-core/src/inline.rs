//! Inline content: runs of text carrying a set of marks.
//!
//! A text block's content is a `Vec<Span>`. All offsets here are character
//! offsets and are clamped to the content length. Helpers that mutate keep the
//! run list normalized: no empty spans, no two neighbours with equal marks.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::types::Marks;

/// A run of text with uniform marks.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub text: String,
    #[serde(default, skip_serializing_if = "Marks::is_plain")]
    pub marks: Marks,
}

impl Span {
    pub fn new(text: impl Into<String>, marks: Marks) -> Self {
        Self {
            text: text.into(),
            marks,
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(text, Marks::default())
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Total length in characters.
pub fn text_len(spans: &[Span]) -> usize {
    spans.iter().map(Span::char_len).sum()
}

/// Concatenated text without marks.
pub fn plain_text(spans: &[Span]) -> String {
    spans.iter().map(|s| s.text.as_str()).collect()
}

/// Drop empty spans and merge neighbours that carry identical marks.
pub fn normalize(spans: &mut Vec<Span>) {
    let mut out: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans.drain(..) {
        if span.text.is_empty() {
            continue;
        }
        match out.last_mut() {
            Some(last) if last.marks == span.marks => last.text.push_str(&span.text),
            _ => out.push(span),
        }
    }
    *spans = out;
}

fn byte_index(text: &str, char_offset: usize) -> usize {
    text.char_indices()
        .nth(char_offset)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

/// Ensure a span boundary at `offset`, returning the index of the first span
/// starting at or after it.
fn boundary(spans: &mut Vec<Span>, offset: usize) -> usize {
    let mut pos = 0;
    for i in 0..spans.len() {
        let len = spans[i].char_len();
        if offset == pos {
            return i;
        }
        if offset < pos + len {
            let split = byte_index(&spans[i].text, offset - pos);
            let tail = spans[i].text.split_off(split);
            let marks = spans[i].marks.clone();
            spans.insert(i + 1, Span::new(tail, marks));
            return i + 1;
        }
        pos += len;
    }
    spans.len()
}

/// Marks of the character just before `offset`, or of the first character
/// when at the start. Links are not extended past their end.
pub fn marks_at(spans: &[Span], offset: usize) -> Marks {
    let mut pos = 0;
    for (i, span) in spans.iter().enumerate() {
        let len = span.char_len();
        if offset > pos && offset <= pos + len {
            let mut marks = span.marks.clone();
            if offset == pos + len && spans.get(i + 1).map(|n| &n.marks.link) != Some(&marks.link)
            {
                marks.link = None;
            }
            return marks;
        }
        pos += len;
    }
    let mut marks = spans.first().map(|s| s.marks.clone()).unwrap_or_default();
    marks.link = None;
    marks
}

/// Insert `text` at `offset`. Without explicit marks the text inherits the
/// marks at the insertion point.
pub fn insert_text(spans: &mut Vec<Span>, offset: usize, text: &str, marks: Option<Marks>) {
    if text.is_empty() {
        return;
    }
    let offset = offset.min(text_len(spans));
    let marks = marks.unwrap_or_else(|| marks_at(spans, offset));
    let at = boundary(spans, offset);
    spans.insert(at, Span::new(text, marks));
    normalize(spans);
}

/// Copy of the content in `range`.
pub fn slice(spans: &[Span], range: Range<usize>) -> Vec<Span> {
    let mut copy = spans.to_vec();
    let len = text_len(&copy);
    let end = range.end.min(len);
    let start = range.start.min(end);
    let hi = boundary(&mut copy, end);
    copy.truncate(hi);
    let lo = boundary(&mut copy, start);
    copy.drain(..lo);
    normalize(&mut copy);
    copy
}

/// Remove the content in `range`.
pub fn delete_range(spans: &mut Vec<Span>, range: Range<usize>) {
    let len = text_len(spans);
    let end = range.end.min(len);
    let start = range.start.min(end);
    if start == end {
        return;
    }
    let lo = boundary(spans, start);
    let hi = boundary(spans, end);
    spans.drain(lo..hi);
    normalize(spans);
}

/// Split the content at `offset`, returning everything after it.
pub fn split_off(spans: &mut Vec<Span>, offset: usize) -> Vec<Span> {
    let offset = offset.min(text_len(spans));
    let at = boundary(spans, offset);
    let mut tail = spans.split_off(at);
    normalize(spans);
    normalize(&mut tail);
    tail
}

/// Run `f` over the marks of every character in `range`.
pub fn update_marks(spans: &mut Vec<Span>, range: Range<usize>, f: impl Fn(&mut Marks)) {
    let len = text_len(spans);
    let end = range.end.min(len);
    let start = range.start.min(end);
    if start == end {
        return;
    }
    let lo = boundary(spans, start);
    let hi = boundary(spans, end);
    for span in &mut spans[lo..hi] {
        f(&mut span.marks);
    }
    normalize(spans);
}

/// True when every character in a non-empty `range` satisfies `pred`.
pub fn all_marks(spans: &[Span], range: Range<usize>, pred: impl Fn(&Marks) -> bool) -> bool {
    let end = range.end.min(text_len(spans));
    let start = range.start.min(end);
    if start == end {
        return false;
    }
    let mut pos = 0;
    for span in spans {
        let len = span.char_len();
        let overlaps = pos < end && pos + len > start;
        if overlaps && !pred(&span.marks) {
            return false;
        }
        pos += len;
    }
    true
}
