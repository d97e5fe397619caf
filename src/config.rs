//! Sync Configuration
//!
//! Knobs for the drain hooks and the preview pipeline, read from TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::models::AssetKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Renumber the collection densely after every drain
    pub reindex_on_drain: bool,
    /// Recount rows after every drain
    pub reconcile_count_on_drain: bool,
    /// Leading path segment for uploaded assets
    pub asset_prefix: String,
    /// Asset kinds whose placeholder must come from the server
    pub derive_preview_for: Vec<AssetKind>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reindex_on_drain: true,
            reconcile_count_on_drain: true,
            asset_prefix: "uploads".to_string(),
            derive_preview_for: vec![AssetKind::Video],
        }
    }
}

impl SyncConfig {
    pub fn from_toml_str(source: &str) -> SyncResult<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    pub fn needs_derivation(&self, kind: AssetKind) -> bool {
        self.derive_preview_for.contains(&kind)
    }
}
