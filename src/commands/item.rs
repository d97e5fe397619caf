//! Item Commands
//!
//! Persistence of pages and posts, plus the push channel for fresh snapshots.

use std::sync::Arc;

use async_trait::async_trait;

use crate::correlation::ItemId;
use crate::error::SyncResult;
use crate::models::{CollectionKey, Item, ItemPayload, NewItem};

/// Persistence operations on items
#[async_trait]
pub trait ItemCommands: Send + Sync {
    /// Persist a new row. The store must keep `new_item.client_id`.
    async fn create_item(&self, new_item: NewItem) -> SyncResult<Item>;

    async fn update_item(&self, id: &ItemId, payload: ItemPayload) -> SyncResult<()>;

    async fn delete_item(&self, id: &ItemId) -> SyncResult<()>;

    /// Current authoritative state of a collection, in display order
    async fn fetch_snapshot(&self, key: &CollectionKey) -> SyncResult<Vec<Item>>;
}

/// Callback receiving every fresh snapshot of a collection
pub type SnapshotListener = Arc<dyn Fn(Vec<Item>) + Send + Sync>;

/// Push source of snapshots
pub trait SnapshotFeed: Send + Sync {
    fn subscribe(&self, key: &CollectionKey, listener: SnapshotListener) -> Subscription;
}

/// Live registration with a [`SnapshotFeed`]; unsubscribes when dropped
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to cancel
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}
