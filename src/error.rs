//! Error types for the document store

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Error, Debug)]
pub enum DbError {
    /// Malformed input rejected before any store access
    #[error("{0}")]
    Validation(String),

    /// Lookup miss on a project, collection or record
    #[error("{0}")]
    NotFound(&'static str),

    /// Unique constraint violation (e.g. duplicate collection name)
    #[error("{0}")]
    Conflict(&'static str),

    #[error("Storage error: {0}")]
    Store(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    /// Errors whose detail must not leak through the wire API.
    /// Classified errors carry caller-facing messages; everything else
    /// is surfaced as an opaque failure.
    pub fn is_internal(&self) -> bool {
        matches!(self, DbError::Store(_) | DbError::Json(_) | DbError::Io(_))
    }

    /// Shorthand for validation errors
    pub fn validation(msg: impl Into<String>) -> Self {
        DbError::Validation(msg.into())
    }
}
