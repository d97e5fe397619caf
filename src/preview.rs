//! Preview Coordinator
//!
//! Multi-step bodies of create and edit tasks: upload, optional server-side
//! preview derivation, then persist. Every step patches the store as soon as
//! it completes so the placeholder reflects progress. Any error aborts the
//! remaining steps; undoing the optimistic change is left to the task's
//! compensation.

use std::sync::Arc;

use tracing::{debug, info};

use crate::commands::{AssetCommands, ItemCommands};
use crate::config::SyncConfig;
use crate::correlation::{ClientId, ItemId};
use crate::error::SyncResult;
use crate::models::{CollectionKey, ItemDraft, ItemPatch, ItemPayload, NewItem, PendingAsset, StagingState};
use crate::store::OptimisticStore;

#[derive(Clone)]
pub struct PreviewCoordinator {
    key: CollectionKey,
    store: OptimisticStore,
    items: Arc<dyn ItemCommands>,
    assets: Arc<dyn AssetCommands>,
    config: Arc<SyncConfig>,
}

impl PreviewCoordinator {
    pub fn new(
        key: CollectionKey,
        store: OptimisticStore,
        items: Arc<dyn ItemCommands>,
        assets: Arc<dyn AssetCommands>,
        config: Arc<SyncConfig>,
    ) -> Self {
        Self {
            key,
            store,
            items,
            assets,
            config,
        }
    }

    /// Storage path of an upload: `{prefix}/{kind}/{parent}/{owner}/{file}`
    pub fn upload_path(&self, owner: &str, file_name: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.config.asset_prefix.trim_end_matches('/'),
            self.key,
            owner,
            file_name
        )
    }

    /// Patch whatever id `id` currently resolves to
    fn stage(&self, id: &ItemId, patch: ItemPatch) {
        let target = self.store.resolve(id);
        self.store.patch(&target, patch);
    }

    /// Upload `asset` and settle its placeholder, filling both into `payload`
    async fn process_asset(
        &self,
        id: &ItemId,
        owner: &str,
        asset: &PendingAsset,
        payload: &mut ItemPayload,
    ) -> SyncResult<()> {
        self.stage(id, ItemPatch::staging(StagingState::Uploading));
        let path = self.upload_path(owner, &asset.file_name);
        let url = self.assets.upload_asset(asset, &path).await?;
        debug!(item_id = %id, url = %url, "asset uploaded");
        payload.asset_url = Some(url.clone());
        self.stage(
            id,
            ItemPatch {
                asset_url: Some(url.clone()),
                ..Default::default()
            },
        );

        let mut placeholder = asset.client_placeholder.clone();
        if self.config.needs_derivation(asset.kind) {
            self.stage(id, ItemPatch::staging(StagingState::DerivingPreview));
            if let Some(derived) = self.assets.derive_preview(&url).await? {
                placeholder = Some(derived);
            }
        }
        if let Some(placeholder) = placeholder {
            payload.placeholder = Some(placeholder.clone());
            self.stage(
                id,
                ItemPatch {
                    placeholder: Some(placeholder),
                    ..Default::default()
                },
            );
        }
        Ok(())
    }

    /// Body of a create task for the placeholder `temp`.
    ///
    /// `order_index` is used only if the placeholder has left the store
    /// (deleted before the create ran); otherwise its current position wins.
    pub async fn run_create(
        &self,
        temp: ItemId,
        client_id: ClientId,
        order_index: i64,
        draft: ItemDraft,
    ) -> SyncResult<()> {
        let ItemDraft { mut payload, asset } = draft;
        if let Some(asset) = &asset {
            self.process_asset(&temp, client_id.as_str(), asset, &mut payload).await?;
        }

        self.stage(&temp, ItemPatch::staging(StagingState::Saving));
        let order_index = self
            .store
            .get(&temp)
            .map(|item| item.order_index)
            .unwrap_or(order_index);
        let created = self
            .items
            .create_item(NewItem {
                collection: self.key.clone(),
                client_id: client_id.clone(),
                order_index,
                payload,
            })
            .await?;

        info!(collection = %self.key, client_id = %client_id, item_id = %created.id, "item created");
        self.store.confirm_id(&temp, created.id.clone());
        self.store.patch(&created.id, ItemPatch::staging(StagingState::None));
        Ok(())
    }

    /// Body of an edit task for `id` (a real id, or a placeholder awaiting one)
    pub async fn run_edit(&self, id: ItemId, draft: ItemDraft) -> SyncResult<()> {
        let owner = self.store.resolve(&id);
        if owner.is_temporary() {
            // the create ahead of this edit failed and was rolled back
            debug!(item_id = %id, "edit dropped, item was never persisted");
            return Ok(());
        }

        let ItemDraft { mut payload, asset } = draft;
        if let Some(asset) = &asset {
            self.process_asset(&id, owner.as_str(), asset, &mut payload).await?;
        }

        self.stage(&id, ItemPatch::staging(StagingState::Saving));
        let target = self.store.resolve(&id);
        self.items.update_item(&target, payload).await?;
        info!(collection = %self.key, item_id = %target, "item updated");
        self.stage(&id, ItemPatch::staging(StagingState::None));
        Ok(())
    }
}
