//! Pageboard Sync
//!
//! Optimistic mutation queue and reconciliation engine for page and post
//! collections. A [`CollectionView`] shows local changes immediately, pushes
//! them to the backing store one at a time, and merges server snapshots back
//! without duplicating, resurrecting or reordering items.

pub mod commands;
pub mod config;
pub mod correlation;
pub mod drain;
pub mod error;
pub mod models;
pub mod order;
pub mod preview;
pub mod queue;
pub mod reconcile;
pub mod store;
pub mod view;

#[cfg(test)]
mod tests;

pub use commands::{
    AssetCommands, ItemCommands, MaintenanceCommands, Services, SnapshotFeed, SnapshotListener,
    Subscription,
};
pub use config::SyncConfig;
pub use correlation::{ClientId, ItemId};
pub use drain::DrainHooks;
pub use error::{SyncError, SyncResult};
pub use models::{
    AssetKind, CollectionKey, Item, ItemDraft, ItemPatch, ItemPayload, NewItem, OrderAssignment,
    PendingAsset, StagingState,
};
pub use preview::PreviewCoordinator;
pub use queue::{FailureNotice, MutationQueue, Task, TaskFailure};
pub use reconcile::{reconcile, DeletionMask, Reconciliation};
pub use store::OptimisticStore;
pub use view::CollectionView;
