//! Count Repository
//!
//! Denormalised per-collection item counters.

use rusqlite::{params, OptionalExtension};

use pageboard_sync::CollectionKey;

use super::db::SharedConnection;
use crate::domain::DomainResult;

/// Outcome of comparing a stored counter with the real row count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountReconciliation {
    pub previous: i64,
    pub actual: i64,
}

impl CountReconciliation {
    pub fn drifted(&self) -> bool {
        self.previous != self.actual
    }
}

#[derive(Clone)]
pub struct CountRepository {
    conn: SharedConnection,
}

impl CountRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// Stored counter; 0 if never written
    pub async fn get(&self, key: &CollectionKey) -> DomainResult<i64> {
        let conn = self.conn.lock().await;
        let count = conn
            .query_row(
                "SELECT item_count FROM collection_counts WHERE collection_kind = ?1 AND parent_key = ?2",
                params![key.kind(), key.parent()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0))
    }

    pub async fn set(&self, key: &CollectionKey, count: i64) -> DomainResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO collection_counts (collection_kind, parent_key, item_count) VALUES (?1, ?2, ?3)
             ON CONFLICT(collection_kind, parent_key) DO UPDATE SET item_count = excluded.item_count",
            params![key.kind(), key.parent(), count],
        )?;
        Ok(())
    }

    /// Add `delta` to the counter, creating it at `delta` if missing
    pub async fn adjust(&self, key: &CollectionKey, delta: i64) -> DomainResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO collection_counts (collection_kind, parent_key, item_count) VALUES (?1, ?2, ?3)
             ON CONFLICT(collection_kind, parent_key) DO UPDATE SET item_count = item_count + excluded.item_count",
            params![key.kind(), key.parent(), delta],
        )?;
        Ok(())
    }

    /// Overwrite the counter with the real number of rows if they differ
    pub async fn reconcile(&self, key: &CollectionKey) -> DomainResult<CountReconciliation> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let actual: i64 = tx.query_row(
            "SELECT COUNT(*) FROM items WHERE collection_kind = ?1 AND parent_key = ?2",
            params![key.kind(), key.parent()],
            |row| row.get(0),
        )?;
        let previous: i64 = tx
            .query_row(
                "SELECT item_count FROM collection_counts WHERE collection_kind = ?1 AND parent_key = ?2",
                params![key.kind(), key.parent()],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);

        if previous != actual {
            tx.execute(
                "INSERT INTO collection_counts (collection_kind, parent_key, item_count) VALUES (?1, ?2, ?3)
                 ON CONFLICT(collection_kind, parent_key) DO UPDATE SET item_count = excluded.item_count",
                params![key.kind(), key.parent(), actual],
            )?;
            log::info!("Count for {} corrected from {} to {}", key, previous, actual);
        }
        tx.commit()?;
        Ok(CountReconciliation { previous, actual })
    }
}
