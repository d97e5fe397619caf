//! Pageboard Backend
//!
//! Layered architecture:
//! - domain: stored rows and domain errors
//! - repository: SQLite data access
//! - assets: local storage for uploaded files
//! - service: the collaborator the sync core talks to

pub mod assets;
pub mod config;
pub mod domain;
pub mod repository;
pub mod service;


pub use assets::AssetStore;
pub use config::{AppConfig, BackendConfig};
pub use domain::{DomainError, DomainResult, StoredItem};
pub use service::SqliteBackend;
