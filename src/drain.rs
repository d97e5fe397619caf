//! Drain Hooks
//!
//! Corrective passes run once the mutation queue is empty: dense reindexing
//! of the display order and reconciliation of the stored item count. Both are
//! idempotent, so running them after every drain is harmless.

use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::commands::MaintenanceCommands;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::models::CollectionKey;
use crate::order::{dense_assignments, is_dense};
use crate::queue::DrainCallback;
use crate::store::OptimisticStore;

#[derive(Clone)]
pub struct DrainHooks {
    key: CollectionKey,
    store: OptimisticStore,
    maintenance: Arc<dyn MaintenanceCommands>,
    reindex: bool,
    reconcile_count: bool,
}

impl DrainHooks {
    pub fn new(
        key: CollectionKey,
        store: OptimisticStore,
        maintenance: Arc<dyn MaintenanceCommands>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            key,
            store,
            maintenance,
            reindex: config.reindex_on_drain,
            reconcile_count: config.reconcile_count_on_drain,
        }
    }

    /// Run every enabled hook. A failing hook does not stop the next one;
    /// the first failure is returned.
    ///
    /// Temp id aliases are dropped first: the queue is empty, so no task can
    /// still resolve one.
    pub async fn run(&self) -> SyncResult<()> {
        let forgotten = self.store.forget_aliases();
        if forgotten > 0 {
            debug!(collection = %self.key, forgotten, "temp ids released");
        }

        let mut first_err = None;

        if self.reindex {
            if let Err(err) = self.reindex().await {
                warn!(collection = %self.key, error = %err, "dense reindex failed");
                first_err.get_or_insert(err);
            }
        }

        if self.reconcile_count {
            if let Err(err) = self.maintenance.reconcile_count(&self.key).await {
                warn!(collection = %self.key, error = %err, "count reconciliation failed");
                first_err.get_or_insert(SyncError::DrainHook(format!("count {}: {}", self.key, err)));
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn reindex(&self) -> SyncResult<()> {
        let items = self.store.items();
        if is_dense(&items) {
            debug!(collection = %self.key, "order already dense");
            return Ok(());
        }

        let assignments = dense_assignments(&items);
        info!(collection = %self.key, count = assignments.len(), "reindexing");
        self.maintenance
            .reindex(&self.key, &assignments)
            .await
            .map_err(|err| SyncError::DrainHook(format!("reindex {}: {}", self.key, err)))
    }

    /// The hooks as a queue drain callback
    pub fn into_callback(self) -> DrainCallback {
        let hooks = Arc::new(self);
        Arc::new(move || {
            let hooks = Arc::clone(&hooks);
            async move { hooks.run().await }.boxed()
        })
    }
}
