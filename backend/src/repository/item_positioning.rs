//! Item Positioning Operations
//!
//! Operations for managing display positions within a collection.

use async_trait::async_trait;
use rusqlite::params;

use pageboard_sync::{CollectionKey, OrderAssignment};

use super::item_repo::ItemRepository;
use crate::domain::{DomainError, DomainResult};

/// Trait for item positioning operations
#[async_trait]
pub trait ItemPositioningOperations {
    /// Write a batch of positions in one transaction; all or nothing
    async fn apply_order(&self, key: &CollectionKey, assignments: &[OrderAssignment]) -> DomainResult<usize>;

    /// Renumber a collection to 0, 1, 2, ... keeping its current order
    async fn reindex_items(&self, key: &CollectionKey) -> DomainResult<()>;
}

#[async_trait]
impl ItemPositioningOperations for ItemRepository {
    async fn apply_order(&self, key: &CollectionKey, assignments: &[OrderAssignment]) -> DomainResult<usize> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let now = chrono::Utc::now().timestamp_millis();
        let mut missing = Vec::new();
        {
            let mut stmt = tx.prepare(
                "UPDATE items SET order_index = ?1, updated_at = ?2 WHERE id = ?3 AND collection_kind = ?4 AND parent_key = ?5",
            )?;
            for assignment in assignments {
                let changed = stmt.execute(params![
                    assignment.order_index,
                    now,
                    assignment.id.as_str(),
                    key.kind(),
                    key.parent(),
                ])?;
                if changed == 0 {
                    missing.push(assignment.id.to_string());
                }
            }
        }
        tx.commit()?;

        // rows deleted since the mapping was computed are skipped, not fatal
        if !missing.is_empty() {
            log::warn!("Reorder of {} skipped missing rows: {}", key, missing.join(", "));
        }
        Ok(assignments.len() - missing.len())
    }

    async fn reindex_items(&self, key: &CollectionKey) -> DomainResult<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let ids: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT id FROM items WHERE collection_kind = ?1 AND parent_key = ?2 ORDER BY order_index, rowid",
            )?;
            let rows = stmt.query_map(params![key.kind(), key.parent()], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };

        let now = chrono::Utc::now().timestamp_millis();
        for (new_pos, id) in ids.iter().enumerate() {
            tx.execute(
                "UPDATE items SET order_index = ?1, updated_at = ?2 WHERE id = ?3",
                params![new_pos as i64, now, id],
            )
            .map_err(|e| DomainError::Internal(format!("reindex {}: {}", id, e)))?;
        }
        tx.commit()?;
        Ok(())
    }
}
