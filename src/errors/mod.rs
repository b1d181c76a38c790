//! Error handling for the M3U catalog

pub mod types;

pub use types::{AppError, RepositoryError, SourceError};

/// Result type used across the library
pub type AppResult<T> = Result<T, AppError>;
