//! Snapshot Reconciliation
//!
//! Merges an authoritative server snapshot into the local list without
//! duplicating confirmed creates or resurrecting pending deletes.

use std::collections::HashSet;

use crate::correlation::{ClientId, ItemId};
use crate::models::{Item, StagingState};

/// Ids whose deletion was issued locally but is not yet reflected by the server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionMask {
    ids: HashSet<ItemId>,
}

impl DeletionMask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ItemId) -> bool {
        self.ids.insert(id)
    }

    pub fn remove(&mut self, id: &ItemId) -> bool {
        self.ids.remove(id)
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ItemId> {
        self.ids.iter()
    }
}

impl FromIterator<ItemId> for DeletionMask {
    fn from_iter<T: IntoIterator<Item = ItemId>>(iter: T) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Output of [`reconcile`]: the list to install and the pruned mask
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub items: Vec<Item>,
    pub mask: DeletionMask,
}

/// Merge `snapshot` into `local`.
///
/// Server items win. Optimistic local items survive only while the snapshot
/// has no item with the same client id or id. Confirmed local items absent
/// from the snapshot are dropped. Masked ids stay hidden until the server
/// stops returning them, at which point they leave the mask.
pub fn reconcile(local: &[Item], snapshot: &[Item], mask: &DeletionMask) -> Reconciliation {
    let server_ids: HashSet<&ItemId> = snapshot.iter().map(|item| &item.id).collect();

    let pruned: DeletionMask = mask
        .iter()
        .filter(|id| server_ids.contains(id))
        .cloned()
        .collect();

    let visible: Vec<&Item> = snapshot
        .iter()
        .filter(|item| !pruned.contains(&item.id))
        .collect();

    let added_client_ids: HashSet<&ClientId> = visible
        .iter()
        .filter_map(|item| item.client_id.as_ref())
        .collect();
    let added_ids: HashSet<&ItemId> = visible.iter().map(|item| &item.id).collect();

    let mut merged: Vec<Item> = visible
        .iter()
        .map(|item| Item {
            is_optimistic: false,
            staging: StagingState::None,
            ..(*item).clone()
        })
        .collect();

    for item in local
        .iter()
        .filter(|item| item.is_optimistic && !mask.contains(&item.id))
    {
        let matched_by_client = item
            .client_id
            .as_ref()
            .is_some_and(|client_id| added_client_ids.contains(client_id));
        if !matched_by_client && !added_ids.contains(&item.id) {
            merged.push(item.clone());
        }
    }

    // Vec::sort_by_key is stable: ties keep snapshot order, then local order
    merged.sort_by_key(|item| item.order_index);

    Reconciliation {
        items: merged,
        mask: pruned,
    }
}
