//! Sync Errors
//!
//! Failures recognised by the mutation queue and its collaborators.

/// Result type for every core and collaborator operation
pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Asset transfer failed
    #[error("Upload failed: {0}")]
    Upload(String),

    /// Create/update/delete rejected by the backing store
    #[error("Persist failed: {0}")]
    Persist(String),

    /// Server-side preview derivation failed
    #[error("Preview derivation failed: {0}")]
    Preview(String),

    /// Reindex or count reconciliation rejected
    #[error("Drain hook failed: {0}")]
    DrainHook(String),

    /// An action panicked while the queue was driving it
    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::Config(err.to_string())
    }
}
