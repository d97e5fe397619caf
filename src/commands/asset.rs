//! Asset Commands

use async_trait::async_trait;

use crate::error::SyncResult;
use crate::models::PendingAsset;

#[async_trait]
pub trait AssetCommands: Send + Sync {
    /// Store `asset` under `path` and return its canonical URL
    async fn upload_asset(&self, asset: &PendingAsset, path: &str) -> SyncResult<String>;

    /// Compute a placeholder image for an uploaded asset, if one can be made
    async fn derive_preview(&self, url: &str) -> SyncResult<Option<String>>;
}
