//! Backend Bindings
//!
//! The interfaces the core expects from its collaborators, organized by
//! concern. Implementations live outside this crate (see `pageboard-backend`).

mod asset;
mod item;
mod maintenance;

use std::sync::Arc;

pub use asset::AssetCommands;
pub use item::{ItemCommands, SnapshotFeed, SnapshotListener, Subscription};
pub use maintenance::MaintenanceCommands;

/// Handles to every collaborator a collection view talks to
#[derive(Clone)]
pub struct Services {
    pub items: Arc<dyn ItemCommands>,
    pub assets: Arc<dyn AssetCommands>,
    pub maintenance: Arc<dyn MaintenanceCommands>,
    pub feed: Option<Arc<dyn SnapshotFeed>>,
}

impl Services {
    /// All four roles served by one backend
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ItemCommands + AssetCommands + MaintenanceCommands + SnapshotFeed + 'static,
    {
        Self {
            items: backend.clone(),
            assets: backend.clone(),
            maintenance: backend.clone(),
            feed: Some(backend),
        }
    }

    /// A backend without push snapshots; views must call `load()` to refresh
    pub fn without_feed<B>(backend: Arc<B>) -> Self
    where
        B: ItemCommands + AssetCommands + MaintenanceCommands + 'static,
    {
        Self {
            items: backend.clone(),
            assets: backend.clone(),
            maintenance: backend,
            feed: None,
        }
    }
}
