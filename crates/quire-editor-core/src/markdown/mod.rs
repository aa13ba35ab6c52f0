//! Canonical Markdown codec for the block tree.
//!
//! [`load`] never fails: constructs the tree cannot represent are degraded to
//! paragraphs or plain text that keep a textual trace of the original, and
//! [`load_with_report`] lists every such degradation. [`serialize`] writes the
//! canonical form, which loads back to an identical string:
//!
//! ```
//! use quire_editor_core::markdown;
//!
//! let text = "# Title\n\n- **bold** item\n- [link](https://example.com)";
//! assert_eq!(markdown::serialize(&markdown::load(text)), text);
//! ```

mod inline;
mod parse;
mod serialize;

use miette::{Diagnostic, NamedSource, SourceSpan};
use quire_common::perf::measure;

use crate::tree::Tree;

pub use serialize::serialize;

/// A construct the loader could not represent faithfully.
#[derive(thiserror::Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Degradation {
    #[error("heading level {level} is not supported, kept as a paragraph")]
    #[diagnostic(code(quire::markdown::heading_level), help("use a heading of level 1 to 3"))]
    HeadingLevel {
        level: u8,
        #[label("level {level} heading")]
        span: SourceSpan,
    },

    #[error("images are not supported, kept as text")]
    #[diagnostic(code(quire::markdown::image))]
    Image {
        #[label("image")]
        span: SourceSpan,
    },

    #[error("raw HTML block kept as text")]
    #[diagnostic(code(quire::markdown::html_block))]
    HtmlBlock {
        #[label("html block")]
        span: SourceSpan,
    },

    #[error("inline HTML `{tag}` kept as text")]
    #[diagnostic(
        code(quire::markdown::inline_html),
        help("only <u>, <mark>, <strong>, <em>, <s> and <br> are understood")
    )]
    InlineHtml {
        tag: String,
        #[label("unsupported tag")]
        span: SourceSpan,
    },

    #[error("task marker inside a numbered list kept as text")]
    #[diagnostic(code(quire::markdown::ordered_task))]
    OrderedTask {
        #[label("task item")]
        span: SourceSpan,
    },

    #[error("unsupported syntax kept as text")]
    #[diagnostic(code(quire::markdown::other))]
    Other {
        #[label("here")]
        span: SourceSpan,
    },
}

impl Degradation {
    pub fn span(&self) -> SourceSpan {
        match self {
            Degradation::HeadingLevel { span, .. }
            | Degradation::Image { span }
            | Degradation::HtmlBlock { span }
            | Degradation::InlineHtml { span, .. }
            | Degradation::OrderedTask { span }
            | Degradation::Other { span } => *span,
        }
    }
}

/// All degradations found in one source, renderable as a single diagnostic.
#[derive(thiserror::Error, Debug, Diagnostic)]
#[error("{} construct(s) could not be represented exactly", degradations.len())]
#[diagnostic(code(quire::markdown::lossy), severity(Warning))]
pub struct DegradationReport {
    #[source_code]
    pub src: NamedSource<String>,
    #[related]
    pub degradations: Vec<Degradation>,
}

impl DegradationReport {
    pub fn new(name: impl AsRef<str>, src: impl Into<String>, degradations: Vec<Degradation>) -> Self {
        Self {
            src: NamedSource::new(name, src.into()),
            degradations,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.degradations.is_empty()
    }
}

/// Parse Markdown into a tree, discarding the degradation report.
pub fn load(markdown: &str) -> Tree {
    load_with_report(markdown).0
}

/// Parse Markdown into a tree and list what could not be kept as-is.
pub fn load_with_report(markdown: &str) -> (Tree, Vec<Degradation>) {
    let (tree, degradations) = measure("markdown::load", || parse::TreeBuilder::new(markdown).run());
    for degradation in &degradations {
        tracing::debug!(
            target: "quire::markdown",
            offset = degradation.span().offset(),
            "{}",
            degradation
        );
    }
    (tree, degradations)
}
