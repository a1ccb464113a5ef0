//! Error types for schema declarations, selection parsing and configuration.

// Fields are read by the derive macros.
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors that can occur while parsing selections or loading configuration.
#[derive(Error, Debug, Diagnostic)]
pub enum SchemaError {
    /// Error reading a file.
    #[error("failed to read file: {path}")]
    #[diagnostic(code(trellis::schema::io_error))]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Syntax error in a selection document.
    #[error("syntax error in selection: {message}")]
    #[diagnostic(code(trellis::schema::syntax_error))]
    SyntaxError {
        #[source_code]
        src: String,
        #[label("error here")]
        span: miette::SourceSpan,
        message: String,
    },

    /// A field that the entity type does not declare.
    #[error("cannot query field `{field}` on type `{entity}`")]
    #[diagnostic(
        code(trellis::schema::unknown_field),
        help("check the field name against the entity declaration")
    )]
    UnknownField { entity: String, field: String },

    /// Selection nested deeper than the configured limit.
    #[error("selection depth {depth} exceeds the limit of {limit}")]
    #[diagnostic(code(trellis::schema::depth_exceeded))]
    DepthExceeded { depth: usize, limit: usize },

    /// Configuration error.
    #[error("configuration error: {message}")]
    #[diagnostic(code(trellis::schema::config_error))]
    ConfigError { message: String },

    /// TOML parsing error.
    #[error("failed to parse TOML")]
    #[diagnostic(code(trellis::schema::toml_error))]
    TomlError {
        #[source]
        source: toml::de::Error,
    },
}

impl SchemaError {
    /// Create a syntax error with source location.
    pub fn syntax(
        src: impl Into<String>,
        offset: usize,
        len: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::SyntaxError {
            src: src.into(),
            span: (offset, len).into(),
            message: message.into(),
        }
    }

    /// Create an unknown field error.
    pub fn unknown_field(entity: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField {
            entity: entity.into(),
            field: field.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[allow(unused_assignments)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error() {
        let err = SchemaError::syntax("{ users { id }", 14, 0, "expected `}`");

        match err {
            SchemaError::SyntaxError { src, span, message } => {
                assert_eq!(src, "{ users { id }");
                assert_eq!(span.offset(), 14);
                assert_eq!(span.len(), 0);
                assert_eq!(message, "expected `}`");
            }
            _ => panic!("Expected SyntaxError"),
        }
    }

    #[test]
    fn test_unknown_field_display() {
        let err = SchemaError::unknown_field("User", "email");
        assert_eq!(err.to_string(), "cannot query field `email` on type `User`");
    }

    #[test]
    fn test_depth_exceeded_display() {
        let err = SchemaError::DepthExceeded { depth: 20, limit: 16 };
        assert!(err.to_string().contains("20"));
        assert!(err.to_string().contains("16"));
    }

    #[test]
    fn test_diagnostic_codes() {
        let err = SchemaError::config("bad value");
        let code = err.code().map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("trellis::schema::config_error"));
    }
}
