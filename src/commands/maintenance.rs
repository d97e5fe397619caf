//! Maintenance Commands
//!
//! Targets of the drain hooks. Both must be idempotent.

use async_trait::async_trait;

use crate::error::SyncResult;
use crate::models::{CollectionKey, OrderAssignment};

#[async_trait]
pub trait MaintenanceCommands: Send + Sync {
    /// Persist the whole order mapping in one batched write
    async fn reindex(&self, key: &CollectionKey, assignments: &[OrderAssignment]) -> SyncResult<()>;

    /// Recount the collection's rows and overwrite the stored counter if it drifted
    async fn reconcile_count(&self, key: &CollectionKey) -> SyncResult<()>;
}
