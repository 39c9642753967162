//! Error types for the cadence-store crate.

use std::io;

use thiserror::Error;

use crate::JobId;

/// Top-level store error type.
///
/// All store operations return this error type, which categorizes failures
/// into I/O, serialization, validation, and logical errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O operation failed (file read/write/delete).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization error.
    #[error("Encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// Deserialization error (corrupted or incompatible record).
    #[error("Decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// Job not found in the store.
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// Sequence state not found in the store.
    #[error("Sequence not found: {0}")]
    SequenceNotFound(String),

    /// Store path validation failed.
    #[error("Store validation error: {0}")]
    Validation(String),

    /// Record already exists in the store.
    #[error("Record already exists: {0}")]
    AlreadyExists(JobId),

    /// Internal error (lock poisoning, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}
