//! Application Configuration
//!
//! TOML file with a `[backend]` table for storage locations and a `[sync]`
//! table handed to every collection view.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use pageboard_sync::SyncConfig;

use crate::domain::{DomainError, DomainResult};

/// Overrides `backend.database_path`
pub const DB_ENV: &str = "PAGEBOARD_DB";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub database_path: PathBuf,
    pub asset_dir: PathBuf,
    pub log_dir: PathBuf,
    pub app_name: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("pageboard.db"),
            asset_dir: PathBuf::from("assets"),
            log_dir: PathBuf::from("logs"),
            app_name: "pageboard".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub sync: SyncConfig,
}

impl AppConfig {
    pub fn from_toml_str(source: &str) -> DomainResult<Self> {
        toml::from_str(source).map_err(|e| DomainError::InvalidInput(format!("config: {}", e)))
    }

    /// Read `path` if given, else use defaults; then apply environment overrides
    pub fn load(path: Option<&Path>) -> DomainResult<Self> {
        let mut config = match path {
            Some(path) => {
                let source = std::fs::read_to_string(path).map_err(|e| {
                    DomainError::InvalidInput(format!("config {}: {}", path.display(), e))
                })?;
                Self::from_toml_str(&source)?
            }
            None => Self::default(),
        };
        config.apply_env(std::env::var(DB_ENV).ok());
        Ok(config)
    }

    fn apply_env(&mut self, database_path: Option<String>) {
        if let Some(path) = database_path.filter(|p| !p.is_empty()) {
            self.backend.database_path = PathBuf::from(path);
        }
    }
}
