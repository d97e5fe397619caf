//! Domain Layer - Core Entity Trait
//!
//! This trait defines the basic contract for all persisted entities.

use pageboard_sync::SyncError;
use serde::{Deserialize, Serialize};

/// Core trait for all domain entities
pub trait Entity: Sized + Send + Sync + Clone {
    /// The type of the entity's unique identifier
    type Id: Clone + Eq + std::hash::Hash + Send + Sync;

    /// Returns the entity's unique identifier
    fn id(&self) -> Self::Id;
}

/// Common result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level errors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum DomainError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for DomainError {
    fn from(err: rusqlite::Error) -> Self {
        DomainError::Internal(err.to_string())
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::Internal(err.to_string())
    }
}

impl DomainError {
    /// As seen by the sync core when an upload step fails
    pub fn into_upload(self) -> SyncError {
        SyncError::Upload(self.to_string())
    }
}

/// Row writes rejected by the store surface as persist failures
impl From<DomainError> for SyncError {
    fn from(err: DomainError) -> Self {
        SyncError::Persist(err.to_string())
    }
}
