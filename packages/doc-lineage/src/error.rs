//! Error types for doc-lineage

use std::fmt;
use thiserror::Error;

use crate::config::ConfigError;

/// Lineage error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown document/event/relationship/stage id
    NotFound,
    /// A referenced document does not exist
    InvalidReference,
    /// Processing-stage or document status regression
    InvalidTransition,
    /// Value outside a closed set or malformed input
    Validation,
    /// Relationship with the same (source, target, type) already exists
    Duplicate,
    /// Traversal exceeded its deadline or node budget
    DeadlineExceeded,
    /// Traversal was cancelled by the caller
    Cancelled,
    /// Database errors (SQLite)
    Database,
    /// Serialization/deserialization errors
    Serialization,
    /// Configuration errors
    Config,
    /// I/O errors
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidReference => "invalid_reference",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::Validation => "validation",
            ErrorKind::Duplicate => "duplicate",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Database => "database",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lineage error type
#[derive(Debug, Error)]
#[error("[{kind}] {message}")]
pub struct LineageError {
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub kind: ErrorKind,
    pub message: String,
}

impl LineageError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    // Convenience constructors
    pub fn not_found(entity: &str, id: impl AsRef<str>) -> Self {
        Self::new(
            ErrorKind::NotFound,
            format!("{} not found: {}", entity, id.as_ref()),
        )
    }

    pub fn invalid_reference(field: &str, document_id: impl AsRef<str>) -> Self {
        Self::new(
            ErrorKind::InvalidReference,
            format!("{} references unknown document: {}", field, document_id.as_ref()),
        )
    }

    pub fn invalid_transition(from: impl fmt::Display, to: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::InvalidTransition,
            format!("Invalid transition: {} -> {}", from, to),
        )
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Duplicate, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DeadlineExceeded, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Serialization, message)
    }
}

// SQLite error conversions
#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for LineageError {
    fn from(err: rusqlite::Error) -> Self {
        LineageError::database(format!("SQLite error: {}", err)).with_source(err)
    }
}

// JSON error conversions
impl From<serde_json::Error> for LineageError {
    fn from(err: serde_json::Error) -> Self {
        LineageError::serialization(format!("JSON error: {}", err)).with_source(err)
    }
}

impl From<std::io::Error> for LineageError {
    fn from(err: std::io::Error) -> Self {
        LineageError::new(ErrorKind::Io, format!("IO error: {}", err)).with_source(err)
    }
}

impl From<ConfigError> for LineageError {
    fn from(err: ConfigError) -> Self {
        LineageError::new(ErrorKind::Config, err.to_string()).with_source(err)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, LineageError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_display() {
        let err = LineageError::not_found("Document", "doc-1");
        let msg = format!("{}", err);
        assert_eq!(msg, "[not_found] Document not found: doc-1");
    }

    #[test]
    fn test_invalid_reference() {
        let err = LineageError::invalid_reference("targetDocumentId", "missing");
        assert_eq!(err.kind, ErrorKind::InvalidReference);
        assert!(err.message.contains("targetDocumentId"));
        assert!(err.message.contains("missing"));
    }

    #[test]
    fn test_invalid_transition() {
        let err = LineageError::invalid_transition("completed", "running");
        assert!(err.is(ErrorKind::InvalidTransition));
        assert_eq!(
            err.to_string(),
            "[invalid_transition] Invalid transition: completed -> running"
        );
    }

    #[test]
    fn test_with_source() {
        use std::io;

        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err = LineageError::database("DB file missing").with_source(io_err);

        assert_eq!(err.kind, ErrorKind::Database);
        let source = err.source().unwrap();
        assert!(source.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_kind_as_str() {
        assert_eq!(ErrorKind::NotFound.as_str(), "not_found");
        assert_eq!(ErrorKind::InvalidReference.as_str(), "invalid_reference");
        assert_eq!(ErrorKind::InvalidTransition.as_str(), "invalid_transition");
        assert_eq!(ErrorKind::Validation.as_str(), "validation");
        assert_eq!(ErrorKind::Duplicate.as_str(), "duplicate");
        assert_eq!(ErrorKind::DeadlineExceeded.as_str(), "deadline_exceeded");
        assert_eq!(ErrorKind::Cancelled.as_str(), "cancelled");
        assert_eq!(ErrorKind::Io.as_str(), "io");
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_from_rusqlite_error() {
        let err: LineageError = rusqlite::Error::QueryReturnedNoRows.into();

        assert_eq!(err.kind, ErrorKind::Database);
        assert!(err.message.contains("SQLite error"));
        assert!(err.source.is_some());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json")
            .err()
            .unwrap();
        let err: LineageError = json_err.into();

        assert_eq!(err.kind, ErrorKind::Serialization);
        assert!(err.message.contains("JSON error"));
    }

    #[test]
    fn test_result_propagation() {
        fn inner() -> Result<()> {
            Err(LineageError::not_found("Relationship", "rel-1"))
        }

        fn outer() -> Result<()> {
            inner()?;
            Ok(())
        }

        let err = outer().unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
