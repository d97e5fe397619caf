//! Item Repository - Core CRUD Operations
//!
//! SQLite-backed storage for pages and posts.
//! Position management lives in item_positioning.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};

use pageboard_sync::{ClientId, CollectionKey, Item, ItemId, ItemPayload, StagingState};

use super::db::SharedConnection;
use super::traits::Repository;
use crate::domain::{DomainError, DomainResult, StoredItem};

const SELECT_COLUMNS: &str = "SELECT id, collection_kind, parent_key, client_id, order_index, title, description, asset_url, placeholder, visible, extra, created_at, updated_at FROM items";

/// SQLite implementation of the item repository
#[derive(Clone)]
pub struct ItemRepository {
    pub(super) conn: SharedConnection,
}

impl ItemRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// Rows of one collection in display order; ties keep insertion order
    pub async fn list_by_collection(&self, key: &CollectionKey) -> DomainResult<Vec<Item>> {
        let conn = self.conn.lock().await;
        let rows = query_rows(
            &conn,
            &format!(
                "{} WHERE collection_kind = ?1 AND parent_key = ?2 ORDER BY order_index ASC, rowid ASC",
                SELECT_COLUMNS
            ),
            params![key.kind(), key.parent()],
        )?;
        Ok(rows.into_iter().map(|stored| stored.item).collect())
    }

    /// Row a client created in `key`; client ids are only unique per collection
    pub async fn find_by_client_id(
        &self,
        key: &CollectionKey,
        client_id: &ClientId,
    ) -> DomainResult<Option<StoredItem>> {
        let conn = self.conn.lock().await;
        find_by_client(&conn, key, client_id)
    }

    /// Number of persisted rows in a collection
    pub async fn count_by_collection(&self, key: &CollectionKey) -> DomainResult<i64> {
        let conn = self.conn.lock().await;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM items WHERE collection_kind = ?1 AND parent_key = ?2",
            params![key.kind(), key.parent()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[async_trait]
impl Repository<StoredItem> for ItemRepository {
    /// Insert a row. A second create carrying an already stored client id
    /// returns the existing row instead of inserting a duplicate.
    async fn create(&self, entity: &StoredItem) -> DomainResult<StoredItem> {
        let item = &entity.item;
        if item.id.is_temporary() || item.id.as_str().is_empty() {
            return Err(DomainError::InvalidInput(format!("cannot store id '{}'", item.id)));
        }
        if item.payload.title.trim().is_empty() {
            return Err(DomainError::InvalidInput("title must not be empty".to_string()));
        }

        let conn = self.conn.lock().await;
        if let Some(client_id) = &item.client_id {
            if let Some(existing) = find_by_client(&conn, &entity.collection, client_id)? {
                log::warn!("Duplicate create for client id {}, returning {}", client_id, existing.item.id);
                return Ok(existing);
            }
        }

        let now = chrono::Utc::now().timestamp_millis();
        conn.execute(
            "INSERT INTO items (id, collection_kind, parent_key, client_id, order_index, title, description, asset_url, placeholder, visible, extra, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
            params![
                item.id.as_str(),
                entity.collection.kind(),
                entity.collection.parent(),
                item.client_id.as_ref().map(|c| c.as_str()),
                item.order_index,
                item.payload.title,
                item.payload.description,
                item.payload.asset_url,
                item.payload.placeholder,
                item.payload.visible,
                encode_extra(&item.payload)?,
                now,
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation => {
                DomainError::Conflict(format!("item {} already exists", item.id))
            }
            other => DomainError::from(other),
        })?;

        find_one(&conn, "id", item.id.as_str())?
            .ok_or_else(|| DomainError::Internal(format!("item {} vanished after insert", item.id)))
    }

    async fn find_by_id(&self, id: &ItemId) -> DomainResult<Option<StoredItem>> {
        let conn = self.conn.lock().await;
        find_one(&conn, "id", id.as_str())
    }

    async fn list(&self) -> DomainResult<Vec<StoredItem>> {
        let conn = self.conn.lock().await;
        query_rows(
            &conn,
            &format!(
                "{} ORDER BY collection_kind, parent_key, order_index ASC, rowid ASC",
                SELECT_COLUMNS
            ),
            params![],
        )
    }

    /// Overwrite payload and position; the row stays in its collection
    async fn update(&self, entity: &StoredItem) -> DomainResult<StoredItem> {
        let item = &entity.item;
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE items SET order_index = ?1, title = ?2, description = ?3, asset_url = ?4, placeholder = ?5, visible = ?6, extra = ?7, updated_at = ?8 WHERE id = ?9",
            params![
                item.order_index,
                item.payload.title,
                item.payload.description,
                item.payload.asset_url,
                item.payload.placeholder,
                item.payload.visible,
                encode_extra(&item.payload)?,
                chrono::Utc::now().timestamp_millis(),
                item.id.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(DomainError::NotFound(format!("item {}", item.id)));
        }

        find_one(&conn, "id", item.id.as_str())?
            .ok_or_else(|| DomainError::NotFound(format!("item {}", item.id)))
    }

    async fn delete(&self, id: &ItemId) -> DomainResult<()> {
        let conn = self.conn.lock().await;
        let removed = conn.execute("DELETE FROM items WHERE id = ?1", params![id.as_str()])?;
        if removed == 0 {
            return Err(DomainError::NotFound(format!("item {}", id)));
        }
        Ok(())
    }
}

fn encode_extra(payload: &ItemPayload) -> DomainResult<Option<String>> {
    if payload.extra.is_empty() {
        return Ok(None);
    }
    serde_json::to_string(&payload.extra)
        .map(Some)
        .map_err(|e| DomainError::InvalidInput(format!("extra: {}", e)))
}

fn collection_from_parts(kind: &str, parent: String) -> DomainResult<CollectionKey> {
    match kind {
        "pages" => Ok(CollectionKey::Pages { owner_id: parent }),
        "posts" => Ok(CollectionKey::Posts { page_id: parent }),
        other => Err(DomainError::Internal(format!("unknown collection kind '{}'", other))),
    }
}

/// Raw column values of one row, before validation
struct RawRow {
    kind: String,
    parent: String,
    extra: Option<String>,
    item: Item,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    let payload = ItemPayload {
        title: row.get(5)?,
        description: row.get(6)?,
        asset_url: row.get(7)?,
        placeholder: row.get(8)?,
        visible: row.get(9)?,
        extra: Default::default(),
    };
    Ok(RawRow {
        kind: row.get(1)?,
        parent: row.get(2)?,
        extra: row.get(10)?,
        item: Item {
            id: ItemId::new(row.get::<_, String>(0)?),
            client_id: row.get::<_, Option<String>>(3)?.map(ClientId::new),
            order_index: row.get(4)?,
            is_optimistic: false,
            staging: StagingState::None,
            payload,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        },
    })
}

fn into_stored(raw: RawRow) -> DomainResult<StoredItem> {
    let mut item = raw.item;
    if let Some(extra) = raw.extra {
        item.payload.extra = serde_json::from_str(&extra)
            .map_err(|e| DomainError::Internal(format!("corrupt extra on {}: {}", item.id, e)))?;
    }
    Ok(StoredItem::new(collection_from_parts(&raw.kind, raw.parent)?, item))
}

fn query_rows<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> DomainResult<Vec<StoredItem>> {
    let mut stmt = conn.prepare(sql)?;
    let raws = stmt.query_map(params, read_row)?;
    let mut items = Vec::new();
    for raw in raws {
        items.push(into_stored(raw?)?);
    }
    Ok(items)
}

fn find_by_client(
    conn: &Connection,
    key: &CollectionKey,
    client_id: &ClientId,
) -> DomainResult<Option<StoredItem>> {
    let raw = conn
        .query_row(
            &format!(
                "{} WHERE collection_kind = ?1 AND parent_key = ?2 AND client_id = ?3",
                SELECT_COLUMNS
            ),
            params![key.kind(), key.parent(), client_id.as_str()],
            read_row,
        )
        .optional()?;
    raw.map(into_stored).transpose()
}

fn find_one(conn: &Connection, column: &str, value: &str) -> DomainResult<Option<StoredItem>> {
    let raw = conn
        .query_row(
            &format!("{} WHERE {} = ?1", SELECT_COLUMNS, column),
            params![value],
            read_row,
        )
        .optional()?;
    raw.map(into_stored).transpose()
}
