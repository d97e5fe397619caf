//! Collection View
//!
//! Owns the state of one on-screen collection: the optimistic store, its
//! deletion mask and the mutation queue every write goes through. UI intents
//! update the store synchronously and enqueue the matching backend work with
//! a compensation that puts the store back if that work fails.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info};

use crate::commands::{Services, Subscription};
use crate::config::SyncConfig;
use crate::correlation::{ClientId, ItemId};
use crate::drain::DrainHooks;
use crate::error::SyncResult;
use crate::models::{CollectionKey, Item, ItemDraft, ItemPatch, OrderAssignment};
use crate::order::{move_to, next_order};
use crate::preview::PreviewCoordinator;
use crate::queue::{FailureNotice, MutationQueue, Task};
use crate::store::OptimisticStore;

pub struct CollectionView {
    key: CollectionKey,
    store: OptimisticStore,
    queue: MutationQueue,
    services: Services,
    preview: PreviewCoordinator,
    subscription: Mutex<Option<Subscription>>,
}

impl CollectionView {
    pub fn new(key: CollectionKey, services: Services, config: SyncConfig) -> Self {
        Self::build(key, services, config, None)
    }

    /// Like [`CollectionView::new`], reporting every failed task to `notice`
    pub fn with_failure_notice(
        key: CollectionKey,
        services: Services,
        config: SyncConfig,
        notice: FailureNotice,
    ) -> Self {
        Self::build(key, services, config, Some(notice))
    }

    fn build(
        key: CollectionKey,
        services: Services,
        config: SyncConfig,
        notice: Option<FailureNotice>,
    ) -> Self {
        let store = OptimisticStore::new();
        let hooks = DrainHooks::new(key.clone(), store.clone(), services.maintenance.clone(), &config);

        let mut builder = MutationQueue::builder(key.to_string()).on_drain(hooks.into_callback());
        if let Some(notice) = notice {
            builder = builder.on_failure(notice);
        }

        let preview = PreviewCoordinator::new(
            key.clone(),
            store.clone(),
            services.items.clone(),
            services.assets.clone(),
            Arc::new(config),
        );

        Self {
            key,
            store,
            queue: builder.build(),
            services,
            preview,
            subscription: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &CollectionKey {
        &self.key
    }

    pub fn store(&self) -> &OptimisticStore {
        &self.store
    }

    /// Current list in display order
    pub fn items(&self) -> Vec<Item> {
        self.store.items()
    }

    pub fn busy(&self) -> bool {
        self.queue.busy()
    }

    pub fn watch_busy(&self) -> watch::Receiver<bool> {
        self.queue.watch_busy()
    }

    /// Wait until every queued mutation and the drain hooks have finished
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await;
    }

    /// Show a placeholder at the end of the list and queue the create.
    ///
    /// Returns the placeholder's temporary id.
    pub fn create(&self, draft: ItemDraft) -> ItemId {
        let order_index = next_order(&self.store.items());
        let client_id = ClientId::generate();

        let mut payload = draft.payload.clone();
        if payload.placeholder.is_none() {
            payload.placeholder = draft.asset.as_ref().and_then(|a| a.client_placeholder.clone());
        }
        let placeholder = Item::placeholder(client_id.clone(), order_index, payload);
        let temp = placeholder.id.clone();
        debug!(collection = %self.key, item_id = %temp, order_index, "optimistic create");
        self.store.insert_optimistic(placeholder);

        let preview = self.preview.clone();
        let action_temp = temp.clone();
        let store = self.store.clone();
        let compensate_temp = temp.clone();
        self.queue.enqueue(Task::new(
            format!("create {}", client_id),
            move || async move { preview.run_create(action_temp, client_id, order_index, draft).await },
            move || {
                let target = store.resolve(&compensate_temp);
                store.remove_by_id(&target);
            },
        ));
        temp
    }

    /// Apply `draft` in place and queue the update. Returns false if `id` is not shown.
    pub fn edit(&self, id: &ItemId, draft: ItemDraft) -> bool {
        let previous = self.store.items();
        let mut patch = ItemPatch::from_payload(&draft.payload);
        if patch.placeholder.is_none() {
            patch.placeholder = draft.asset.as_ref().and_then(|a| a.client_placeholder.clone());
        }
        if !self.store.patch(id, patch) {
            return false;
        }
        debug!(collection = %self.key, item_id = %id, "optimistic edit");

        let preview = self.preview.clone();
        let store = self.store.clone();
        let action_id = id.clone();
        let compensate_id = id.clone();
        self.queue.enqueue(Task::new(
            format!("edit {}", id),
            move || async move { preview.run_edit(action_id, draft).await },
            move || {
                store.revert_edit(&compensate_id, &previous);
            },
        ));
        true
    }

    /// Hide `id` immediately and queue its deletion. Returns false if `id` is not shown.
    pub fn delete(&self, id: &ItemId) -> bool {
        let Some(removed) = self.store.remove_by_id(id) else {
            return false;
        };
        self.store.mask_deleted(id.clone());
        if removed.id.is_temporary() {
            if let Some(client_id) = &removed.client_id {
                self.store.mask_client(client_id.clone(), id.clone());
            }
        }
        debug!(collection = %self.key, item_id = %id, "optimistic delete");

        let items = self.services.items.clone();
        let action_store = self.store.clone();
        let action_id = id.clone();
        let store = self.store.clone();
        let compensate_id = id.clone();
        self.queue.enqueue(Task::new(
            format!("delete {}", id),
            move || async move {
                let target = action_store.resolve(&action_id);
                if target.is_temporary() {
                    debug!(item_id = %target, "delete of a create that never landed");
                    action_store.unmask(&target);
                    Ok(())
                } else {
                    items
                        .delete_item(&target)
                        .await
                        .map(|()| info!(item_id = %target, "item deleted"))
                }
            },
            move || {
                let target = store.resolve(&compensate_id);
                store.unmask(&compensate_id);
                store.unmask(&target);
                let mut item = removed;
                item.id = target;
                store.restore(item);
            },
        ));
        true
    }

    /// Move `id` to position `to_index` and queue the new order. Returns false if `id` is not shown.
    pub fn reorder(&self, id: &ItemId, to_index: usize) -> bool {
        let previous = self.store.items();
        let Some(reordered) = move_to(&previous, id, to_index) else {
            return false;
        };
        let positions: Vec<(ItemId, i64)> = reordered
            .iter()
            .map(|item| (item.id.clone(), item.order_index))
            .collect();
        self.store.replace_all(reordered);
        debug!(collection = %self.key, item_id = %id, to_index, "optimistic reorder");

        let maintenance = self.services.maintenance.clone();
        let key = self.key.clone();
        let action_store = self.store.clone();
        let store = self.store.clone();
        self.queue.enqueue(Task::new(
            format!("reorder {}", id),
            move || async move {
                let assignments: Vec<OrderAssignment> = positions
                    .into_iter()
                    .map(|(id, order_index)| OrderAssignment {
                        id: action_store.resolve(&id),
                        order_index,
                    })
                    .filter(|assignment| !assignment.id.is_temporary())
                    .collect();
                maintenance.reindex(&key, &assignments).await
            },
            move || store.restore_order(&previous),
        ));
        true
    }

    /// Merge an authoritative snapshot into the local list
    pub fn on_snapshot_received(&self, snapshot: Vec<Item>) {
        debug!(collection = %self.key, rows = snapshot.len(), "snapshot received");
        self.store.apply_snapshot(&snapshot);
    }

    /// Pull a snapshot from the backing store and merge it
    pub async fn load(&self) -> SyncResult<()> {
        let snapshot = self.services.items.fetch_snapshot(&self.key).await?;
        self.on_snapshot_received(snapshot);
        Ok(())
    }

    /// Subscribe to pushed snapshots. Returns false when the services have no feed.
    pub fn attach(&self) -> bool {
        let Some(feed) = &self.services.feed else {
            return false;
        };
        let store = self.store.clone();
        let subscription = feed.subscribe(
            &self.key,
            Arc::new(move |snapshot: Vec<Item>| store.apply_snapshot(&snapshot)),
        );
        let previous = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(subscription);
        if let Some(previous) = previous {
            previous.unsubscribe();
        }
        true
    }

    pub fn detach(&self) {
        let current = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(subscription) = current {
            subscription.unsubscribe();
        }
    }
}
