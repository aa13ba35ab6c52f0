//! Inline spans to Markdown text.
//!
//! Marks nest in a fixed order (link outermost, then bold, italic,
//! strikethrough, underline, highlight) and are closed at every line break.
//! Code spans are atomic and sit innermost. Bold, italic and strikethrough use
//! `**`, `*` and `~~` when the delimiters can open and close at that position,
//! and the `<strong>`, `<em>` and `<s>` tags otherwise.

use crate::inline::Span;
use crate::types::Marks;

/// How delimiter-based emphasis is written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Emphasis {
    /// `**`, `*` and `~~` wherever they re-parse, tags elsewhere.
    Delimiters,
    /// Always tags.
    Tags,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Key {
    Link(String),
    Bold,
    Italic,
    Strike,
    Underline,
    Highlight,
}

impl Key {
    fn delimiter(&self) -> Option<&'static str> {
        match self {
            Key::Bold => Some("**"),
            Key::Italic => Some("*"),
            Key::Strike => Some("~~"),
            _ => None,
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            Key::Bold => "strong",
            Key::Italic => "em",
            Key::Strike => "s",
            Key::Underline => "u",
            Key::Highlight => "mark",
            Key::Link(_) => "a",
        }
    }

    fn is_star(&self) -> bool {
        matches!(self, Key::Bold | Key::Italic)
    }
}

fn keys(marks: &Marks) -> Vec<Key> {
    let mut keys = Vec::new();
    if let Some(url) = &marks.link {
        keys.push(Key::Link(url.clone()));
    }
    if marks.bold {
        keys.push(Key::Bold);
    }
    if marks.italic {
        keys.push(Key::Italic);
    }
    if marks.strikethrough {
        keys.push(Key::Strike);
    }
    if marks.underline {
        keys.push(Key::Underline);
    }
    if marks.highlight {
        keys.push(Key::Highlight);
    }
    keys
}

#[derive(Debug)]
enum Tok<'a> {
    Open(Key),
    Close(Key),
    Text(&'a str),
    Code(&'a str),
}

/// What sits at a delimiter's edge, as far as flanking rules care.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Edge {
    Space,
    Punct,
    Word,
}

fn classify(c: char) -> Edge {
    if c.is_whitespace() {
        Edge::Space
    } else if c.is_alphanumeric() {
        Edge::Word
    } else {
        Edge::Punct
    }
}

/// Split spans into lines on `\n`, dropping empty lines at either end.
fn lines(spans: &[Span]) -> Vec<Vec<(&str, &Marks)>> {
    let mut lines: Vec<Vec<(&str, &Marks)>> = vec![Vec::new()];
    for span in spans {
        let mut parts = span.text.split('\n');
        if let Some(first) = parts.next() {
            if !first.is_empty() {
                if let Some(line) = lines.last_mut() {
                    line.push((first, &span.marks));
                }
            }
        }
        for part in parts {
            let mut line = Vec::new();
            if !part.is_empty() {
                line.push((part, &span.marks));
            }
            lines.push(line);
        }
    }
    while lines.first().is_some_and(Vec::is_empty) && lines.len() > 1 {
        lines.remove(0);
    }
    while lines.last().is_some_and(Vec::is_empty) && lines.len() > 1 {
        lines.pop();
    }
    lines
}

/// Render inline content. Headings cannot hold line breaks, so every break
/// there is written as `<br>`.
pub(super) fn render(spans: &[Span], heading: bool, emphasis: Emphasis) -> String {
    let lines = lines(spans);
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        out.push_str(&render_line(line, heading, emphasis));
        if let Some(next) = lines.get(i + 1) {
            if heading || next.is_empty() {
                out.push_str("<br>");
            } else {
                out.push_str("\\\n");
            }
        }
    }
    out
}

fn line_tokens<'a>(line: &[(&'a str, &Marks)]) -> Vec<Tok<'a>> {
    let mut toks = Vec::new();
    let mut stack: Vec<Key> = Vec::new();
    for &(text, marks) in line {
        let want = keys(marks);
        let keep = stack
            .iter()
            .zip(&want)
            .take_while(|(a, b)| a == b)
            .count();
        while stack.len() > keep {
            if let Some(key) = stack.pop() {
                toks.push(Tok::Close(key));
            }
        }
        for key in &want[keep..] {
            toks.push(Tok::Open(key.clone()));
            stack.push(key.clone());
        }
        toks.push(if marks.code {
            Tok::Code(text)
        } else {
            Tok::Text(text)
        });
    }
    while let Some(key) = stack.pop() {
        toks.push(Tok::Close(key));
    }
    toks
}

/// Index of the `Close` matching the `Open` at `open`.
fn matching_close(toks: &[Tok<'_>], open: usize) -> usize {
    let mut depth = 0usize;
    for (ix, tok) in toks.iter().enumerate().skip(open) {
        match tok {
            Tok::Open(_) => depth += 1,
            Tok::Close(_) => {
                depth -= 1;
                if depth == 0 {
                    return ix;
                }
            }
            _ => {}
        }
    }
    toks.len() - 1
}

fn first_edge(tok: Option<&Tok<'_>>) -> Edge {
    match tok {
        None => Edge::Space,
        Some(Tok::Text(t)) => t.chars().next().map(classify).unwrap_or(Edge::Space),
        Some(_) => Edge::Punct,
    }
}

fn last_edge(tok: Option<&Tok<'_>>) -> Edge {
    match tok {
        None => Edge::Space,
        Some(Tok::Text(t)) => t.chars().next_back().map(classify).unwrap_or(Edge::Space),
        Some(_) => Edge::Punct,
    }
}

fn star_neighbour(tok: Option<&Tok<'_>>) -> bool {
    matches!(tok, Some(Tok::Open(k) | Tok::Close(k)) if k.is_star())
}

/// Whether the run from `open` to `close` can use its delimiter form.
fn delimiters_fit(toks: &[Tok<'_>], open: usize, close: usize, key: &Key) -> bool {
    let before = open.checked_sub(1).and_then(|ix| toks.get(ix));
    let inner_first = toks.get(open + 1);
    let inner_last = toks.get(close - 1);
    let after = toks.get(close + 1);

    if key.is_star()
        && [before, inner_first, inner_last, after]
            .into_iter()
            .any(star_neighbour)
    {
        return false;
    }

    let can_open = match first_edge(inner_first) {
        Edge::Space => false,
        Edge::Word => true,
        Edge::Punct => last_edge(before) != Edge::Word,
    };
    let can_close = match last_edge(inner_last) {
        Edge::Space => false,
        Edge::Word => true,
        Edge::Punct => first_edge(after) != Edge::Word,
    };
    can_open && can_close
}

fn render_line(line: &[(&str, &Marks)], heading: bool, emphasis: Emphasis) -> String {
    let toks = line_tokens(line);

    // Decide delimiter or tag form once per run.
    let mut delimited = vec![false; toks.len()];
    if emphasis == Emphasis::Delimiters {
        for (ix, tok) in toks.iter().enumerate() {
            if let Tok::Open(key) = tok {
                if key.delimiter().is_some() {
                    let close = matching_close(&toks, ix);
                    let fits = delimiters_fit(&toks, ix, close, key);
                    delimited[ix] = fits;
                    delimited[close] = fits;
                }
            }
        }
    }

    let last = toks.len().saturating_sub(1);
    let mut out = String::new();
    for (ix, tok) in toks.iter().enumerate() {
        match tok {
            Tok::Open(Key::Link(_)) => out.push('['),
            Tok::Close(Key::Link(url)) => {
                out.push_str("](");
                out.push_str(&link_destination(url));
                out.push(')');
            }
            Tok::Open(key) => match key.delimiter() {
                Some(delim) if delimited[ix] => out.push_str(delim),
                _ => {
                    out.push('<');
                    out.push_str(key.tag());
                    out.push('>');
                }
            },
            Tok::Close(key) => match key.delimiter() {
                Some(delim) if delimited[ix] => out.push_str(delim),
                _ => {
                    out.push_str("</");
                    out.push_str(key.tag());
                    out.push('>');
                }
            },
            Tok::Text(text) => escape_text(&mut out, text, heading, ix == 0, ix == last),
            Tok::Code(text) => code_span(&mut out, text),
        }
    }
    out
}

fn is_edge_space(c: char) -> bool {
    c == ' ' || c == '\t'
}

fn push_entity(out: &mut String, c: char) {
    out.push_str("&#");
    out.push_str(&(c as u32).to_string());
    out.push(';');
}

/// Escape text so it re-parses as literal characters. Spaces and tabs at the
/// edges of a line become numeric entities since the parser strips them.
fn escape_text(out: &mut String, text: &str, heading: bool, line_start: bool, line_end: bool) {
    let chars: Vec<char> = text.chars().collect();
    let lead = if line_start {
        chars.iter().take_while(|c| is_edge_space(**c)).count()
    } else {
        0
    };
    let trail = if line_end {
        chars[lead..].iter().rev().take_while(|c| is_edge_space(**c)).count()
    } else {
        0
    };
    let at_start = line_start && lead == 0;

    for (i, &c) in chars.iter().enumerate() {
        if i < lead || i >= chars.len() - trail {
            push_entity(out, c);
            continue;
        }
        match c {
            '\r' => push_entity(out, c),
            '\\' | '*' | '_' | '`' | '[' | ']' | '<' | '>' | '~' | '&' => {
                out.push('\\');
                out.push(c);
            }
            '#' if heading || (at_start && i == 0) => out.push_str("\\#"),
            '-' | '+' | '=' if at_start && i == 0 => {
                out.push('\\');
                out.push(c);
            }
            '.' | ')' if at_start && i > 0 && i < 10 && chars[..i].iter().all(char::is_ascii_digit) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
}

fn longest_run(text: &str, needle: char) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if c == needle {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

fn code_span(out: &mut String, text: &str) {
    let fence = "`".repeat(longest_run(text, '`') + 1);
    let pad = text.starts_with('`')
        || text.ends_with('`')
        || (text.starts_with(' ') && text.ends_with(' ') && !text.chars().all(|c| c == ' '));
    out.push_str(&fence);
    if pad {
        out.push(' ');
    }
    out.push_str(text);
    if pad {
        out.push(' ');
    }
    out.push_str(&fence);
}

/// Longest run of `needle` anywhere in `text`.
pub(super) fn fence_run(text: &str, needle: char) -> usize {
    longest_run(text, needle)
}

fn link_destination(url: &str) -> String {
    let angle = url.chars().any(|c| c.is_whitespace() || c.is_control());
    let mut out = String::with_capacity(url.len() + 2);
    if angle {
        out.push('<');
    }
    for c in url.chars() {
        if matches!(c, '\\' | '(' | ')' | '<' | '>' | '&') {
            out.push('\\');
        }
        out.push(c);
    }
    if angle {
        out.push('>');
    }
    out
}
