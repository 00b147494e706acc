//! # Structured Error Handling
//!
//! Error taxonomy for the metadata store. Every store operation resolves to
//! one of these kinds so that callers (REST adapters, orchestrators) can map
//! failures without string matching.

use thiserror::Error;

/// Errors raised by the store and its read-only consumers.
///
/// The store never silently no-ops on a failed precondition: a violated
/// invariant always surfaces as one of these variants, and a failed mutation
/// leaves the affected record untouched.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A resource (or a referenced parent resource) does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// A scoped-uniqueness invariant was violated on create or rename.
    #[error("{0} already exists")]
    EntityExists(String),

    /// The operation would violate a referential invariant.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The principal lacks the required permission.
    #[error("not authorized: {0}")]
    Authorization(String),

    /// The request model is malformed; rejected before any store logic runs.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_entity_exists(&self) -> bool {
        matches!(self, Self::EntityExists(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::Authorization(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
