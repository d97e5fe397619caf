//! Stored Item
//!
//! An item together with the collection it is filed under.

use pageboard_sync::{CollectionKey, Item, ItemId};
use serde::{Deserialize, Serialize};

use super::entity::Entity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredItem {
    pub collection: CollectionKey,
    #[serde(flatten)]
    pub item: Item,
}

impl StoredItem {
    pub fn new(collection: CollectionKey, item: Item) -> Self {
        Self { collection, item }
    }
}

impl Entity for StoredItem {
    type Id = ItemId;

    fn id(&self) -> ItemId {
        self.item.id.clone()
    }
}
