//! SQLite Backend
//!
//! Serves every collaborator role the sync core needs from one database and
//! one asset directory, and pushes a fresh snapshot to subscribers after
//! each write.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use pageboard_sync::{
    AssetCommands, CollectionKey, Item, ItemCommands, ItemId, ItemPayload, MaintenanceCommands,
    NewItem, OrderAssignment, PendingAsset, SnapshotFeed, SnapshotListener, Subscription, SyncError,
    SyncResult,
};

use crate::assets::AssetStore;
use crate::config::BackendConfig;
use crate::domain::{DomainError, DomainResult, StoredItem};
use crate::repository::{
    init_db, CountReconciliation, CountRepository, DbState, ItemPositioningOperations,
    ItemRepository, Repository,
};

#[derive(Default)]
struct ListenerRegistry {
    next_handle: u64,
    entries: Vec<(u64, CollectionKey, SnapshotListener)>,
}

type SharedRegistry = Arc<Mutex<ListenerRegistry>>;

fn lock_registry(registry: &Mutex<ListenerRegistry>) -> std::sync::MutexGuard<'_, ListenerRegistry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SqliteBackend {
    items: ItemRepository,
    counts: CountRepository,
    assets: AssetStore,
    listeners: SharedRegistry,
}

impl SqliteBackend {
    pub fn new(db: &DbState, assets: AssetStore) -> Self {
        Self {
            items: ItemRepository::new(db.get_connection()),
            counts: CountRepository::new(db.get_connection()),
            assets,
            listeners: Arc::new(Mutex::new(ListenerRegistry::default())),
        }
    }

    /// Open the database and asset directory named in `config`
    pub async fn open(config: &BackendConfig) -> DomainResult<Self> {
        let db = init_db(&config.database_path).await?;
        tokio::fs::create_dir_all(&config.asset_dir).await?;
        Ok(Self::new(&db, AssetStore::new(&config.asset_dir)))
    }

    pub fn items(&self) -> &ItemRepository {
        &self.items
    }

    pub fn counts(&self) -> &CountRepository {
        &self.counts
    }

    pub fn assets(&self) -> &AssetStore {
        &self.assets
    }

    /// Densify stored positions and fix the counter, outside any view
    pub async fn maintain(&self, key: &CollectionKey) -> DomainResult<CountReconciliation> {
        self.items.reindex_items(key).await?;
        let outcome = self.counts.reconcile(key).await?;
        self.publish(key).await;
        Ok(outcome)
    }

    /// Send the current rows of `key` to its subscribers
    async fn publish(&self, key: &CollectionKey) {
        let targets: Vec<SnapshotListener> = lock_registry(&self.listeners)
            .entries
            .iter()
            .filter(|(_, k, _)| k == key)
            .map(|(_, _, listener)| Arc::clone(listener))
            .collect();
        if targets.is_empty() {
            return;
        }

        match self.items.list_by_collection(key).await {
            Ok(snapshot) => {
                debug!(collection = %key, rows = snapshot.len(), listeners = targets.len(), "pushing snapshot");
                for listener in targets {
                    listener(snapshot.clone());
                }
            }
            Err(err) => warn!(collection = %key, error = %err, "snapshot for subscribers failed"),
        }
    }

    async fn stored(&self, id: &ItemId) -> SyncResult<StoredItem> {
        self.items
            .find_by_id(id)
            .await?
            .ok_or_else(|| SyncError::from(DomainError::NotFound(format!("item {}", id))))
    }
}

#[async_trait]
impl ItemCommands for SqliteBackend {
    async fn create_item(&self, new_item: NewItem) -> SyncResult<Item> {
        if let Some(existing) = self
            .items
            .find_by_client_id(&new_item.collection, &new_item.client_id)
            .await?
        {
            debug!(collection = %new_item.collection, item_id = %existing.item.id, "create already applied");
            return Ok(existing.item);
        }

        let id = ItemId::new(uuid::Uuid::new_v4().to_string());
        let item = Item::new(id.clone(), new_item.order_index, new_item.payload)
            .with_client_id(new_item.client_id);
        let stored = self
            .items
            .create(&StoredItem::new(new_item.collection.clone(), item))
            .await?;

        if stored.item.id == id {
            self.counts.adjust(&new_item.collection, 1).await?;
            info!(collection = %new_item.collection, item_id = %id, "row created");
        }
        self.publish(&new_item.collection).await;
        Ok(stored.item)
    }

    async fn update_item(&self, id: &ItemId, payload: ItemPayload) -> SyncResult<()> {
        let mut stored = self.stored(id).await?;
        stored.item.payload = payload;
        self.items.update(&stored).await?;
        debug!(item_id = %id, "row updated");
        self.publish(&stored.collection).await;
        Ok(())
    }

    /// Deleting a row that is already gone succeeds
    async fn delete_item(&self, id: &ItemId) -> SyncResult<()> {
        let Some(stored) = self.items.find_by_id(id).await? else {
            debug!(item_id = %id, "delete of missing row");
            return Ok(());
        };
        match self.items.delete(id).await {
            Ok(()) => {
                self.counts.adjust(&stored.collection, -1).await?;
                info!(collection = %stored.collection, item_id = %id, "row deleted");
            }
            Err(DomainError::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }
        self.publish(&stored.collection).await;
        Ok(())
    }

    async fn fetch_snapshot(&self, key: &CollectionKey) -> SyncResult<Vec<Item>> {
        Ok(self.items.list_by_collection(key).await?)
    }
}

#[async_trait]
impl AssetCommands for SqliteBackend {
    async fn upload_asset(&self, asset: &PendingAsset, path: &str) -> SyncResult<String> {
        self.assets
            .upload(asset, path)
            .await
            .map_err(DomainError::into_upload)
    }

    async fn derive_preview(&self, url: &str) -> SyncResult<Option<String>> {
        self.assets
            .derive_preview(url)
            .await
            .map_err(|e| SyncError::Preview(e.to_string()))
    }
}

#[async_trait]
impl MaintenanceCommands for SqliteBackend {
    async fn reindex(&self, key: &CollectionKey, assignments: &[OrderAssignment]) -> SyncResult<()> {
        let written = self.items.apply_order(key, assignments).await?;
        debug!(collection = %key, written, "order applied");
        self.publish(key).await;
        Ok(())
    }

    async fn reconcile_count(&self, key: &CollectionKey) -> SyncResult<()> {
        let outcome = self.counts.reconcile(key).await?;
        if outcome.drifted() {
            info!(collection = %key, previous = outcome.previous, actual = outcome.actual, "count corrected");
        }
        Ok(())
    }
}

impl SnapshotFeed for SqliteBackend {
    fn subscribe(&self, key: &CollectionKey, listener: SnapshotListener) -> Subscription {
        let handle = {
            let mut registry = lock_registry(&self.listeners);
            registry.next_handle += 1;
            let handle = registry.next_handle;
            registry.entries.push((handle, key.clone(), listener));
            handle
        };
        debug!(collection = %key, handle, "subscribed");

        let registry: Weak<Mutex<ListenerRegistry>> = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                lock_registry(&registry).entries.retain(|(h, _, _)| *h != handle);
            }
        })
    }
}
