//! Error type definitions for the M3U catalog
//!
//! The hierarchy separates storage failures (fatal when the catalog cannot be
//! opened, per-record otherwise) from source failures (a single malformed
//! record, or a whole document that cannot be parsed).

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Raw driver errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Catalog store errors
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Playlist / guide input errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Local file errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Resource not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// A second session was requested while one is still running
    #[error("An import is already in progress: {kind}")]
    ImportInProgress { kind: String },
}

/// Catalog store specific errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// The catalog file could not be opened or created
    #[error("Database connection failed: {message}")]
    ConnectionFailed { message: String },

    /// Constraint violations (unique, foreign key, etc.)
    #[error("Constraint violation: {constraint} - {message}")]
    ConstraintViolation { constraint: String, message: String },

    /// Migration failures
    #[error("Migration failed: {version} - {message}")]
    MigrationFailed { version: String, message: String },
}

/// Input handling specific errors
#[derive(Error, Debug)]
pub enum SourceError {
    /// The document as a whole is not well formed
    #[error("Parse error: {source_type} - {message}")]
    ParseError {
        source_type: String,
        message: String,
    },

    /// A single record could not be turned into a catalog row
    #[error("Invalid record: {source_type} - {message}")]
    InvalidRecord {
        source_type: String,
        message: String,
    },
}

/// Convenience methods for creating common error types
impl AppError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found<R: Into<String>, I: ToString>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    /// True when the underlying driver error is a unique-constraint violation
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            Self::Repository(RepositoryError::ConstraintViolation { .. }) => true,
            _ => false,
        }
    }
}

impl RepositoryError {
    pub fn connection_failed<M: Into<String>>(message: M) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
        }
    }

    pub fn constraint_violation<C: Into<String>, M: Into<String>>(
        constraint: C,
        message: M,
    ) -> Self {
        Self::ConstraintViolation {
            constraint: constraint.into(),
            message: message.into(),
        }
    }
}

impl SourceError {
    pub fn parse_error<S: Into<String>, M: Into<String>>(source_type: S, message: M) -> Self {
        Self::ParseError {
            source_type: source_type.into(),
            message: message.into(),
        }
    }

    pub fn invalid_record<S: Into<String>, M: Into<String>>(source_type: S, message: M) -> Self {
        Self::InvalidRecord {
            source_type: source_type.into(),
            message: message.into(),
        }
    }
}
