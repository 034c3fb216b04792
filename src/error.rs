//! Error types for KyroStore.
//!
//! All errors are strongly typed using thiserror. Every variant is a
//! programmer-facing, fatal-to-the-call condition: the store never retries
//! internally and never swallows an error raised by a fetch collaborator.

use std::error::Error as StdError;

use thiserror::Error;

use crate::schema::RelationshipKind;

/// Boxed error produced by a fetch collaborator.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors caused by malformed input (records or schema).
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Record of type '{record_type}' has no ID")]
    MissingIdentifier {
        record_type: String,
    },

    #[error("{record_type}.{field} is an invalid {kind} relationship")]
    InvalidRelationship {
        record_type: String,
        field: String,
        kind: RelationshipKind,
    },

    #[error("Invalid '{record_type}' record: {reason}")]
    InvalidRecord {
        record_type: String,
        reason: String,
    },

    #[error("Invalid schema: {reason}")]
    InvalidSchema {
        reason: String,
    },
}

/// Errors raised while executing a store operation.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Record doesn't exist: {record_type}#{id}")]
    RecordNotFound {
        record_type: String,
        id: String,
    },

    #[error("Unknown record type: {record_type}")]
    UnknownType {
        record_type: String,
    },

    #[error("Fetch for '{record_type}' failed: {source}")]
    Fetch {
        record_type: String,
        #[source]
        source: BoxError,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Channel disconnected: {path}")]
    Disconnected {
        path: String,
    },
}

/// Top-level error type for KyroStore.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl StoreError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub(crate) fn missing_identifier(record_type: &str) -> Self {
        ValidationError::MissingIdentifier {
            record_type: record_type.to_string(),
        }
        .into()
    }

    pub(crate) fn invalid_relationship(record_type: &str, field: &str, kind: RelationshipKind) -> Self {
        ValidationError::InvalidRelationship {
            record_type: record_type.to_string(),
            field: field.to_string(),
            kind,
        }
        .into()
    }

    pub(crate) fn invalid_record(record_type: &str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidRecord {
            record_type: record_type.to_string(),
            reason: reason.into(),
        }
        .into()
    }

    pub(crate) fn invalid_schema(reason: impl Into<String>) -> Self {
        ValidationError::InvalidSchema {
            reason: reason.into(),
        }
        .into()
    }

    pub(crate) fn record_not_found(record_type: &str, id: &str) -> Self {
        ExecutionError::RecordNotFound {
            record_type: record_type.to_string(),
            id: id.to_string(),
        }
        .into()
    }

    pub(crate) fn unknown_type(record_type: &str) -> Self {
        ExecutionError::UnknownType {
            record_type: record_type.to_string(),
        }
        .into()
    }

    pub(crate) fn fetch(record_type: &str, source: impl Into<BoxError>) -> Self {
        ExecutionError::Fetch {
            record_type: record_type.to_string(),
            source: source.into(),
        }
        .into()
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if the target record was not cached.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::RecordNotFound { .. }))
    }

    /// Returns true if a fetch collaborator rejected.
    #[must_use]
    pub const fn is_fetch(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::Fetch { .. }))
    }
}

/// Result type alias for KyroStore operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_identifier_names_type() {
        let err = StoreError::missing_identifier("user");
        assert!(err.is_validation());
        let msg = format!("{err}");
        assert!(msg.contains("'user'"));
        assert!(msg.contains("no ID"));
    }

    #[test]
    fn test_invalid_relationship_names_type_and_field() {
        let err = StoreError::invalid_relationship("post", "author", RelationshipKind::BelongsTo);
        let msg = format!("{err}");
        assert!(msg.contains("post.author"));
        assert!(msg.contains("belongsTo"));
    }

    #[test]
    fn test_record_not_found() {
        let err = StoreError::record_not_found("user", "user_a");
        assert!(err.is_execution());
        assert!(err.is_not_found());
        assert!(format!("{err}").contains("user#user_a"));
    }

    #[test]
    fn test_fetch_error_keeps_source() {
        let source = std::io::Error::new(std::io::ErrorKind::Other, "offline");
        let err = StoreError::fetch("user", source);
        assert!(err.is_fetch());
        assert!(!err.is_not_found());
        let inner = StdError::source(&err).and_then(|e| e.source());
        assert_eq!(inner.map(ToString::to_string).as_deref(), Some("offline"));
    }

    #[test]
    fn test_internal() {
        let err = StoreError::internal("poisoned lock: state");
        assert!(err.is_internal());
        assert!(format!("{err}").contains("poisoned lock"));
    }
}
