//! Optimistic Store
//!
//! The local, UI-facing copy of one collection: confirmed rows, in-flight
//! placeholders and the deletion mask. Cloning the store clones a handle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::correlation::{ClientId, ItemId};
use crate::models::{Item, ItemPatch};
use crate::reconcile::{reconcile, DeletionMask};

#[derive(Debug, Default)]
struct StoreState {
    items: Vec<Item>,
    mask: DeletionMask,
    /// temp id -> id returned by the persist step
    aliases: HashMap<ItemId, ItemId>,
    /// client id of a deleted placeholder -> its temp id
    masked_clients: HashMap<ClientId, ItemId>,
    revision: u64,
}

impl StoreState {
    fn sort(&mut self) {
        self.items.sort_by_key(|item| item.order_index);
    }
}

/// Shared handle to a collection's local state
#[derive(Clone)]
pub struct OptimisticStore {
    state: Arc<Mutex<StoreState>>,
    revision_tx: Arc<watch::Sender<u64>>,
}

impl Default for OptimisticStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimisticStore {
    pub fn new() -> Self {
        Self::with_items(Vec::new())
    }

    /// Seed the store with already-confirmed items
    pub fn with_items(items: Vec<Item>) -> Self {
        let mut state = StoreState {
            items,
            ..Default::default()
        };
        state.sort();
        let (revision_tx, _) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(state)),
            revision_tx: Arc::new(revision_tx),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bump the revision while still holding the state lock
    fn publish(&self, state: &mut StoreState) {
        state.revision += 1;
        self.revision_tx.send_replace(state.revision);
    }

    /// Current list in display order
    pub fn items(&self) -> Vec<Item> {
        self.lock().items.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn get(&self, id: &ItemId) -> Option<Item> {
        self.lock().items.iter().find(|item| &item.id == id).cloned()
    }

    /// Append a placeholder and restore display order
    pub fn insert_optimistic(&self, mut item: Item) {
        item.is_optimistic = true;
        let mut state = self.lock();
        state.items.push(item);
        state.sort();
        self.publish(&mut state);
    }

    /// Put back an item removed by a failed delete, keeping its confirmation state
    pub fn restore(&self, item: Item) {
        let mut state = self.lock();
        if state.items.iter().any(|existing| existing.id == item.id) {
            return;
        }
        state.items.push(item);
        state.sort();
        self.publish(&mut state);
    }

    /// Shallow-merge `patch` into the item with `id`. Returns false if absent.
    pub fn patch(&self, id: &ItemId, patch: ItemPatch) -> bool {
        let mut state = self.lock();
        let reorders = patch.order_index.is_some();
        let Some(item) = state.items.iter_mut().find(|item| &item.id == id) else {
            return false;
        };
        item.apply(patch);
        if reorders {
            state.sort();
        }
        self.publish(&mut state);
        true
    }

    /// Undo a failed edit of one row.
    ///
    /// `previous` is the list as it was when the edit was issued. The row
    /// takes back its old payload and staging state but keeps its current id
    /// and position, so intents issued after the edit stay applied. Returns
    /// false when the row is no longer shown.
    pub fn revert_edit(&self, id: &ItemId, previous: &[Item]) -> bool {
        let mut state = self.lock();
        let target = state.aliases.get(id).cloned().unwrap_or_else(|| id.clone());
        let Some(original) = previous.iter().find(|item| &item.id == id || item.id == target) else {
            return false;
        };
        let Some(item) = state.items.iter_mut().find(|item| item.id == target) else {
            return false;
        };
        item.payload = original.payload.clone();
        item.staging = original.staging;
        self.publish(&mut state);
        true
    }

    /// Put back the positions rows had in `previous`.
    ///
    /// Rows created since keep their position; rows removed since stay removed.
    pub fn restore_order(&self, previous: &[Item]) {
        let mut state = self.lock();
        let positions: HashMap<ItemId, i64> = previous
            .iter()
            .map(|item| {
                let id = state.aliases.get(&item.id).cloned().unwrap_or_else(|| item.id.clone());
                (id, item.order_index)
            })
            .collect();
        for item in state.items.iter_mut() {
            if let Some(order_index) = positions.get(&item.id) {
                item.order_index = *order_index;
            }
        }
        state.sort();
        self.publish(&mut state);
    }

    /// Install a fully merged list
    pub fn replace_all(&self, items: Vec<Item>) {
        let mut state = self.lock();
        state.items = items;
        state.sort();
        self.publish(&mut state);
    }

    /// Drop an unconfirmed placeholder (or any item) from the local list
    pub fn remove_by_id(&self, id: &ItemId) -> Option<Item> {
        let mut state = self.lock();
        let position = state.items.iter().position(|item| &item.id == id)?;
        let removed = state.items.remove(position);
        self.publish(&mut state);
        Some(removed)
    }

    pub fn mask_deleted(&self, id: ItemId) {
        self.lock().mask.insert(id);
    }

    /// Mask whatever row the backing store ends up creating for `client_id`.
    ///
    /// Used when a placeholder is deleted before its create has landed: a
    /// snapshot may carry the new row before `confirm_id` learns its id.
    pub fn mask_client(&self, client_id: ClientId, temp: ItemId) {
        self.lock().masked_clients.insert(client_id, temp);
    }

    pub fn unmask(&self, id: &ItemId) {
        let mut state = self.lock();
        state.mask.remove(id);
        state.masked_clients.retain(|_, temp| temp != id);
    }

    pub fn deletion_mask(&self) -> DeletionMask {
        self.lock().mask.clone()
    }

    /// Record the id the store assigned to a placeholder.
    ///
    /// The placeholder (if still present) takes the real id but stays
    /// optimistic until a snapshot matches it. A delete issued against the
    /// temp id before this point extends its mask to the real id.
    pub fn confirm_id(&self, temp: &ItemId, real: ItemId) {
        let mut state = self.lock();
        let client_masked = state.masked_clients.values().any(|masked| masked == temp);
        if client_masked || state.mask.contains(temp) {
            state.mask.insert(real.clone());
            state.masked_clients.retain(|_, masked| masked != temp);
        }
        if let Some(item) = state.items.iter_mut().find(|item| &item.id == temp) {
            item.id = real.clone();
        }
        state.aliases.insert(temp.clone(), real);
        self.publish(&mut state);
    }

    /// Real id for `id` if it was a placeholder that has since been persisted
    pub fn resolve(&self, id: &ItemId) -> ItemId {
        self.lock().aliases.get(id).cloned().unwrap_or_else(|| id.clone())
    }

    /// Drop every temp -> real id mapping. Only valid while no queued task
    /// still holds a temporary id.
    pub fn forget_aliases(&self) -> usize {
        let mut state = self.lock();
        let forgotten = state.aliases.len();
        state.aliases.clear();
        forgotten
    }

    /// Reconcile a server snapshot into the current state
    pub fn apply_snapshot(&self, snapshot: &[Item]) {
        let mut state = self.lock();
        if !state.masked_clients.is_empty() {
            for item in snapshot {
                let Some(client_id) = &item.client_id else {
                    continue;
                };
                if state.masked_clients.remove(client_id).is_some() {
                    state.mask.insert(item.id.clone());
                }
            }
        }
        let merged = reconcile(&state.items, snapshot, &state.mask);
        state.items = merged.items;
        state.mask = merged.mask;
        self.publish(&mut state);
    }

    pub fn revision(&self) -> u64 {
        self.lock().revision
    }

    /// Receiver that changes whenever the list does
    pub fn watch_revision(&self) -> watch::Receiver<u64> {
        self.revision_tx.subscribe()
    }
}
