//! Error types for loading, resolution and mutation with actionable messages.
//!
//! # Error Codes
//!
//! Error codes follow a pattern: T{category}{number}
//! - 1xxx: Query errors (not found, invalid selection, invalid argument)
//! - 2xxx: Constraint errors (missing foreign entity, failed precondition)
//! - 3xxx: Connection errors
//! - 5xxx: Execution errors (storage failure, failed or misaligned batch)
//! - 7xxx: Configuration errors
//! - 9xxx: Internal errors
//!
//! ```rust
//! use trellis_query::{ErrorCode, QueryError};
//!
//! let err = QueryError::not_found("User");
//! assert_eq!(err.code, ErrorCode::RecordNotFound);
//! assert_eq!(err.code.code(), "T1001");
//! ```
//!
//! Errors are cheap to clone: a failed batch hands the same error to every
//! caller waiting on it.

use std::fmt::{self, Write as _};
use std::sync::Arc;

use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Query errors (1xxx)
    /// Record not found (T1001).
    RecordNotFound = 1001,
    /// Invalid selection: unknown field or malformed shape (T1004).
    InvalidSelect = 1004,
    /// Invalid argument value (T1005).
    InvalidArgument = 1005,

    // Constraint errors (2xxx)
    /// Unique constraint violation (T2001).
    UniqueConstraint = 2001,
    /// Foreign key constraint violation reported by storage (T2002).
    ForeignKeyConstraint = 2002,
    /// A referenced entity does not exist (T2005).
    PreconditionFailed = 2005,

    // Connection errors (3xxx)
    /// Storage connection failed (T3001).
    ConnectionFailed = 3001,

    // Execution errors (5xxx)
    /// General storage error (T5005).
    DatabaseError = 5005,
    /// A bulk fetch failed; every key of the batch is rejected (T5006).
    BatchFetchFailed = 5006,
    /// A bulk fetch returned a list not aligned with its keys (T5007).
    BatchMisaligned = 5007,

    // Configuration errors (7xxx)
    /// Invalid configuration (T7001).
    InvalidConfiguration = 7001,

    // Internal errors (9xxx)
    /// Internal error (T9001).
    Internal = 9001,
}

impl ErrorCode {
    /// Get the error code string (e.g., "T1001").
    pub fn code(&self) -> String {
        format!("T{}", *self as u16)
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::RecordNotFound => "Record not found",
            Self::InvalidSelect => "Invalid selection",
            Self::InvalidArgument => "Invalid argument",
            Self::UniqueConstraint => "Unique constraint violation",
            Self::ForeignKeyConstraint => "Foreign key constraint violation",
            Self::PreconditionFailed => "Precondition failed",
            Self::ConnectionFailed => "Storage connection failed",
            Self::DatabaseError => "Storage error",
            Self::BatchFetchFailed => "Batch fetch failed",
            Self::BatchMisaligned => "Batch result misaligned",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::Internal => "Internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Suggestion for fixing an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    /// The suggestion text.
    pub text: String,
}

impl Suggestion {
    /// Create a new suggestion.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Additional context for an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// The operation that was being performed.
    pub operation: Option<String>,
    /// The entity type involved.
    pub entity: Option<String>,
    /// The field involved.
    pub field: Option<String>,
    /// The loader whose batch failed.
    pub loader: Option<String>,
    /// Suggestions for fixing the error.
    pub suggestions: Vec<Suggestion>,
}

/// Errors that can occur while loading, resolving or mutating.
#[derive(Error, Debug, Clone)]
#[error("[{code}] {message}")]
pub struct QueryError {
    /// The error code.
    pub code: ErrorCode,
    /// The error message.
    pub message: String,
    /// Additional context.
    pub context: ErrorContext,
    /// The source error (if any).
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl QueryError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Add context about the operation.
    pub fn with_context(mut self, operation: impl Into<String>) -> Self {
        self.context.operation = Some(operation.into());
        self
    }

    /// Add a suggestion for fixing the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context.suggestions.push(Suggestion::new(suggestion));
        self
    }

    /// Set the entity type.
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.context.entity = Some(entity.into());
        self
    }

    /// Set the field.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.context.field = Some(field.into());
        self
    }

    /// Set the loader name.
    pub fn with_loader(mut self, loader: impl Into<String>) -> Self {
        self.context.loader = Some(loader.into());
        self
    }

    /// Set the source error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Create a not found error.
    pub fn not_found(entity: impl Into<String>) -> Self {
        let entity = entity.into();
        Self::new(
            ErrorCode::RecordNotFound,
            format!("No {} record found matching the query", entity),
        )
        .with_entity(&entity)
    }

    /// Create an invalid selection error.
    pub fn invalid_select(entity: impl Into<String>, field: impl Into<String>) -> Self {
        let entity = entity.into();
        let field = field.into();
        Self::new(
            ErrorCode::InvalidSelect,
            format!("Cannot query field \"{}\" on type \"{}\"", field, entity),
        )
        .with_entity(&entity)
        .with_field(&field)
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        let field = field.into();
        let message = message.into();
        Self::new(
            ErrorCode::InvalidArgument,
            format!("Invalid argument for {}: {}", field, message),
        )
        .with_field(&field)
    }

    /// Create a precondition error: a referenced entity does not exist.
    pub fn precondition(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        let entity = entity.into();
        Self::new(
            ErrorCode::PreconditionFailed,
            format!("{} with id {} does not exist", entity, id),
        )
        .with_entity(&entity)
        .with_suggestion(format!("Create the {} before referencing it", entity))
    }

    /// Create a foreign key violation error.
    pub fn foreign_key_violation(entity: impl Into<String>, relation: impl Into<String>) -> Self {
        let entity = entity.into();
        let relation = relation.into();
        Self::new(
            ErrorCode::ForeignKeyConstraint,
            format!("Foreign key constraint violated: {} -> {}", entity, relation),
        )
        .with_entity(&entity)
        .with_field(&relation)
    }

    /// Create a unique constraint violation error.
    pub fn unique_violation(entity: impl Into<String>, field: impl Into<String>) -> Self {
        let entity = entity.into();
        let field = field.into();
        Self::new(
            ErrorCode::UniqueConstraint,
            format!("Unique constraint failed on {}.{}", entity, field),
        )
        .with_entity(&entity)
        .with_field(&field)
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::ConnectionFailed, format!("Connection error: {}", message))
            .with_suggestion("Check that the storage backend is reachable")
    }

    /// Create a general storage error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message.into())
    }

    /// Wrap a storage failure as the failure of a whole batch.
    pub fn batch_failed(loader: impl Into<String>, keys: usize, cause: &QueryError) -> Self {
        let loader = loader.into();
        let mut err = Self::new(
            ErrorCode::BatchFetchFailed,
            format!("Batch of {} key(s) for loader {} failed: {}", keys, loader, cause.message),
        )
        .with_loader(&loader);
        err.source = Some(Arc::new(cause.clone()));
        err
    }

    /// Create a misaligned batch error.
    pub fn batch_misaligned(loader: impl Into<String>, expected: usize, actual: usize) -> Self {
        let loader = loader.into();
        Self::new(
            ErrorCode::BatchMisaligned,
            format!(
                "Loader {} fetched {} value(s) for {} key(s)",
                loader, actual, expected
            ),
        )
        .with_loader(&loader)
        .with_suggestion("Return exactly one entry per key, in key order, using None for misses")
    }

    /// Create an invalid configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::Internal, format!("Internal error: {}", message))
    }

    /// Check if this is a not found error.
    pub fn is_not_found(&self) -> bool {
        self.code == ErrorCode::RecordNotFound
    }

    /// Check if this is a failed precondition.
    pub fn is_precondition(&self) -> bool {
        self.code == ErrorCode::PreconditionFailed
    }

    /// Check if this failure came from the storage layer rather than from the data.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::ConnectionFailed
                | ErrorCode::DatabaseError
                | ErrorCode::BatchFetchFailed
        )
    }

    /// Multi-line rendering with every context field and suggestion.
    pub fn display_full(&self) -> String {
        let mut out = format!("Error [{}]: {}", self.code.code(), self.message);
        let ctx = &self.context;
        let lines = [
            ("While", &ctx.operation),
            ("Entity", &ctx.entity),
            ("Field", &ctx.field),
            ("Loader", &ctx.loader),
        ];
        for (label, value) in lines {
            if let Some(value) = value {
                let _ = write!(out, "\n  → {}: {}", label, value);
            }
        }
        for (i, suggestion) in ctx.suggestions.iter().enumerate() {
            if i == 0 {
                out.push_str("\nSuggestions:");
            }
            let _ = write!(out, "\n  {}. {}", i + 1, suggestion.text);
        }
        out
    }
}

impl From<trellis_schema::SchemaError> for QueryError {
    fn from(err: trellis_schema::SchemaError) -> Self {
        let code = match err {
            trellis_schema::SchemaError::UnknownField { .. }
            | trellis_schema::SchemaError::DepthExceeded { .. }
            | trellis_schema::SchemaError::SyntaxError { .. } => ErrorCode::InvalidSelect,
            _ => ErrorCode::InvalidConfiguration,
        };
        Self::new(code, err.to_string()).with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::RecordNotFound.code(), "T1001");
        assert_eq!(ErrorCode::PreconditionFailed.code(), "T2005");
        assert_eq!(ErrorCode::BatchFetchFailed.code(), "T5006");
    }

    #[test]
    fn test_display_includes_code() {
        let err = QueryError::not_found("User");
        assert_eq!(
            err.to_string(),
            "[T1001] No User record found matching the query"
        );
    }

    #[test]
    fn test_not_found_is_not_transient() {
        let err = QueryError::not_found("User");
        assert!(err.is_not_found());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_precondition_is_distinct_from_storage_failure() {
        let err = QueryError::precondition("User", "42");
        assert!(err.is_precondition());
        assert!(!err.is_transient());
        assert!(err.message.contains("does not exist"));

        assert!(QueryError::connection("refused").is_transient());
    }

    #[test]
    fn test_batch_failed_keeps_cause() {
        let cause = QueryError::connection("refused");
        let err = QueryError::batch_failed("users", 3, &cause);

        assert_eq!(err.code, ErrorCode::BatchFetchFailed);
        assert_eq!(err.context.loader.as_deref(), Some("users"));
        assert!(err.message.contains("refused"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_clone_shares_source() {
        let err = QueryError::database("boom").with_source(std::fmt::Error);
        let copy = err.clone();
        assert!(Arc::ptr_eq(
            err.source.as_ref().unwrap(),
            copy.source.as_ref().unwrap()
        ));
    }

    #[test]
    fn test_display_full() {
        let err = QueryError::batch_misaligned("userPosts", 3, 2).with_context("Loading posts");

        let output = err.display_full();
        assert!(output.contains("T5007"));
        assert!(output.contains("userPosts"));
        assert!(output.contains("Suggestions"));
    }

    #[test]
    fn test_error_macro() {
        let err = query_error!(
            ErrorCode::InvalidArgument,
            "Invalid id",
            with_field = "id",
            with_suggestion = "Use a UUID"
        );

        assert_eq!(err.code, ErrorCode::InvalidArgument);
        assert_eq!(err.context.field, Some("id".to_string()));
    }
}
