//! Error types shared by the quire binaries and services.

use miette::{Diagnostic, NamedSource, SourceOffset, SourceSpan};

/// Main error type for quire operations outside the editor core.
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum QuireError {
    /// Invalid or unusable configuration
    #[error("configuration error: {0}")]
    #[diagnostic(code(quire::config))]
    Config(String),

    /// IO error
    #[error(transparent)]
    #[diagnostic(code(quire::io))]
    Io(#[from] std::io::Error),

    /// Parse error with source location
    #[error(transparent)]
    #[diagnostic_source]
    Parse(#[from] ParseError),

    /// Serialization/deserialization error
    #[error(transparent)]
    #[diagnostic_source]
    Serde(#[from] SerDeError),

    /// Remote store or local storage failure
    #[error("store error: {0}")]
    #[diagnostic(code(quire::store))]
    Store(String),

    /// A note identifier that does not exist in the store
    #[error("no note with id `{0}`")]
    #[diagnostic(code(quire::not_found), help("run `quire notes list` to see known ids"))]
    NotFound(String),
}

impl QuireError {
    /// True when this wraps an IO "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, QuireError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Serialization/deserialization errors
#[derive(thiserror::Error, Debug, Diagnostic)]
#[non_exhaustive]
pub enum SerDeError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Parse error pointing into the offending file.
#[derive(thiserror::Error, Debug, Diagnostic)]
#[error("failed to parse {name}: {message}")]
#[diagnostic(code(quire::parse))]
pub struct ParseError {
    name: String,
    message: String,
    #[source_code]
    src: NamedSource<String>,
    #[label("here")]
    location: SourceSpan,
    #[help]
    advice: Option<String>,
}

impl ParseError {
    /// Build from a TOML error, which reports a byte span.
    pub fn from_toml(err: toml::de::Error, name: impl Into<String>, src: impl Into<String>) -> Self {
        let name = name.into();
        let src = src.into();
        let location = match err.span() {
            Some(span) => SourceSpan::new(span.start.into(), span.len()),
            None => SourceSpan::new(0.into(), 0),
        };
        Self {
            message: err.message().to_string(),
            src: NamedSource::new(name.clone(), src),
            name,
            location,
            advice: None,
        }
    }

    /// Build from a JSON error, which reports a 1-based line and column.
    pub fn from_json(err: serde_json::Error, name: impl Into<String>, src: impl Into<String>) -> Self {
        let name = name.into();
        let src = src.into();
        let offset = SourceOffset::from_location(&src, err.line(), err.column());
        Self {
            message: err.to_string(),
            src: NamedSource::new(name.clone(), src),
            name,
            location: SourceSpan::new(offset, 0),
            advice: None,
        }
    }

    pub fn with_advice(mut self, advice: impl Into<String>) -> Self {
        self.advice = Some(advice.into());
        self
    }

    pub fn location(&self) -> SourceSpan {
        self.location
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_parse_error_points_at_span() {
        let src = "debounce_ms = \n";
        let err = toml::from_str::<toml::Table>(src).unwrap_err();
        let parse = ParseError::from_toml(err, "config.toml", src);
        assert!(parse.to_string().starts_with("failed to parse config.toml"));
    }

    #[test]
    fn test_json_parse_error_location() {
        let src = "{\n  \"owner\": ,\n}";
        let err = serde_json::from_str::<serde_json::Value>(src).unwrap_err();
        let parse = ParseError::from_json(err, "config.json", src);
        // Second line starts after "{\n".
        assert!(parse.location().offset() >= 2);
    }

    #[test]
    fn test_is_not_found() {
        let err = QuireError::from(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(err.is_not_found());
        assert!(!QuireError::Config("x".into()).is_not_found());
    }
}
