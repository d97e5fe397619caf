//! Collection Models
//!
//! Data structures shared by the store, the queue and the backend bindings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::correlation::{ClientId, ItemId};
use crate::error::SyncError;

/// Which collection a view is showing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CollectionKey {
    /// The pages on an owner's dashboard
    Pages { owner_id: String },
    /// The posts inside one page
    Posts { page_id: String },
}

impl CollectionKey {
    pub fn pages(owner_id: impl Into<String>) -> Self {
        CollectionKey::Pages { owner_id: owner_id.into() }
    }

    pub fn posts(page_id: impl Into<String>) -> Self {
        CollectionKey::Posts { page_id: page_id.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CollectionKey::Pages { .. } => "pages",
            CollectionKey::Posts { .. } => "posts",
        }
    }

    /// Owner id for pages, page id for posts
    pub fn parent(&self) -> &str {
        match self {
            CollectionKey::Pages { owner_id } => owner_id,
            CollectionKey::Posts { page_id } => page_id,
        }
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind(), self.parent())
    }
}

/// Parses the `kind/parent` form produced by `Display`
impl FromStr for CollectionKey {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, parent) = s
            .split_once('/')
            .filter(|(_, parent)| !parent.is_empty())
            .ok_or_else(|| SyncError::Config(format!("expected kind/parent, got '{}'", s)))?;
        match kind {
            "pages" => Ok(CollectionKey::pages(parent)),
            "posts" => Ok(CollectionKey::posts(parent)),
            other => Err(SyncError::Config(format!("unknown collection kind '{}'", other))),
        }
    }
}

/// Progress of a multi-step create or edit, for UI feedback only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagingState {
    #[default]
    None,
    Uploading,
    DerivingPreview,
    Saving,
}

/// Fields the core carries around without interpreting
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ItemPayload {
    pub title: String,
    pub description: Option<String>,
    pub asset_url: Option<String>,
    /// Low-resolution stand-in shown while the asset loads
    pub placeholder: Option<String>,
    pub visible: bool,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ItemPayload {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            visible: true,
            ..Default::default()
        }
    }
}

/// A page or a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub client_id: Option<ClientId>,
    pub order_index: i64,
    /// True until a server snapshot has matched this item
    #[serde(default)]
    pub is_optimistic: bool,
    #[serde(default)]
    pub staging: StagingState,
    #[serde(flatten)]
    pub payload: ItemPayload,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
}

impl Item {
    /// A confirmed item as the backing store reports it
    pub fn new(id: impl Into<ItemId>, order_index: i64, payload: ItemPayload) -> Self {
        Self {
            id: id.into(),
            client_id: None,
            order_index,
            is_optimistic: false,
            staging: StagingState::None,
            payload,
            created_at: None,
            updated_at: None,
        }
    }

    /// Placeholder rendered before the create reaches the store
    pub fn placeholder(client_id: ClientId, order_index: i64, payload: ItemPayload) -> Self {
        Self {
            id: ItemId::temporary(),
            client_id: Some(client_id),
            order_index,
            is_optimistic: true,
            staging: StagingState::None,
            payload,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<ClientId>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Shallow-merge the set fields of `patch`
    pub fn apply(&mut self, patch: ItemPatch) {
        if let Some(id) = patch.id {
            self.id = id;
        }
        if let Some(order_index) = patch.order_index {
            self.order_index = order_index;
        }
        if let Some(staging) = patch.staging {
            self.staging = staging;
        }
        if let Some(title) = patch.title {
            self.payload.title = title;
        }
        if let Some(description) = patch.description {
            self.payload.description = description;
        }
        if let Some(asset_url) = patch.asset_url {
            self.payload.asset_url = Some(asset_url);
        }
        if let Some(placeholder) = patch.placeholder {
            self.payload.placeholder = Some(placeholder);
        }
        if let Some(visible) = patch.visible {
            self.payload.visible = visible;
        }
        if let Some(extra) = patch.extra {
            self.payload.extra = extra;
        }
    }
}

/// Partial update applied in place by `OptimisticStore::patch`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPatch {
    pub id: Option<ItemId>,
    pub order_index: Option<i64>,
    pub staging: Option<StagingState>,
    pub title: Option<String>,
    /// `Some(None)` clears the description
    pub description: Option<Option<String>>,
    pub asset_url: Option<String>,
    pub placeholder: Option<String>,
    pub visible: Option<bool>,
    pub extra: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ItemPatch {
    pub fn staging(staging: StagingState) -> Self {
        Self {
            staging: Some(staging),
            ..Default::default()
        }
    }

    /// Every payload field of `payload`, as an in-place edit
    pub fn from_payload(payload: &ItemPayload) -> Self {
        Self {
            title: Some(payload.title.clone()),
            description: Some(payload.description.clone()),
            asset_url: payload.asset_url.clone(),
            placeholder: payload.placeholder.clone(),
            visible: Some(payload.visible),
            extra: Some(payload.extra.clone()),
            ..Default::default()
        }
    }
}

/// Asset categories, used to decide whether a preview must be derived server-side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Video,
    Document,
}

/// A file selected by the user that has not been uploaded yet
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAsset {
    pub file_name: String,
    pub kind: AssetKind,
    pub bytes: Vec<u8>,
    /// Placeholder computed on the client before upload, if any
    pub client_placeholder: Option<String>,
}

/// What the user submitted for a create or an edit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemDraft {
    pub payload: ItemPayload,
    pub asset: Option<PendingAsset>,
}

impl ItemDraft {
    pub fn new(payload: ItemPayload) -> Self {
        Self { payload, asset: None }
    }

    pub fn with_asset(mut self, asset: PendingAsset) -> Self {
        self.asset = Some(asset);
        self
    }
}

/// Arguments of `ItemCommands::create_item`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    pub collection: CollectionKey,
    pub client_id: ClientId,
    pub order_index: i64,
    pub payload: ItemPayload,
}

/// One entry of a batched reindex write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAssignment {
    pub id: ItemId,
    pub order_index: i64,
}
