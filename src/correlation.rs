//! Correlation Ids
//!
//! Client-generated identifiers that let an optimistic placeholder be matched
//! with the row the backing store eventually returns for it.

use std::fmt;

use serde::{Deserialize, Serialize};

const TEMP_PREFIX: &str = "temp-";

/// Identity assigned by the backing store.
///
/// Placeholders carry a temporary id (`temp-<uuid>`) until the persist step
/// hands back the real one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh placeholder id for an item the store has not seen yet
    pub fn temporary() -> Self {
        Self(format!("{}{}", TEMP_PREFIX, uuid::Uuid::new_v4()))
    }

    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMP_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Correlation id stored with every client-created item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}
