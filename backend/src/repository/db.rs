//! Database Connection and Setup
//!
//! Opens the SQLite database and runs migrations.

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::domain::{DomainError, DomainResult};

/// Shared handle to the single connection every repository uses
pub type SharedConnection = Arc<Mutex<Connection>>;

/// Database state wrapper
#[derive(Clone)]
pub struct DbState {
    conn: SharedConnection,
}

impl DbState {
    pub fn get_connection(&self) -> SharedConnection {
        Arc::clone(&self.conn)
    }
}

/// Open (or create) the database at `db_path` and migrate it.
///
/// `:memory:` gives a private in-memory database.
pub async fn init_db(db_path: &Path) -> DomainResult<DbState> {
    let conn = if db_path.as_os_str() == ":memory:" {
        Connection::open_in_memory()?
    } else {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Connection::open(db_path)?
    };

    run_migrations(&conn)?;
    log::info!("Database ready at {}", db_path.display());

    Ok(DbState {
        conn: Arc::new(Mutex::new(conn)),
    })
}

/// Check if a column exists in a table
fn column_exists(conn: &Connection, table: &str, column: &str) -> DomainResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Run database migrations
fn run_migrations(conn: &Connection) -> DomainResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS items (
            id TEXT PRIMARY KEY,
            collection_kind TEXT NOT NULL,
            parent_key TEXT NOT NULL,
            client_id TEXT,
            order_index INTEGER NOT NULL DEFAULT 0,
            title TEXT NOT NULL,
            description TEXT,
            asset_url TEXT,
            placeholder TEXT,
            visible INTEGER NOT NULL DEFAULT 1
        );
        CREATE TABLE IF NOT EXISTS collection_counts (
            collection_kind TEXT NOT NULL,
            parent_key TEXT NOT NULL,
            item_count INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (collection_kind, parent_key)
        );",
    )?;

    // Columns added after the first release
    for (column, ddl) in [
        ("extra", "ALTER TABLE items ADD COLUMN extra TEXT"),
        ("created_at", "ALTER TABLE items ADD COLUMN created_at INTEGER"),
        ("updated_at", "ALTER TABLE items ADD COLUMN updated_at INTEGER"),
    ] {
        if !column_exists(conn, "items", column)? {
            conn.execute(ddl, [])
                .map_err(|e| DomainError::Internal(format!("Failed to add {}: {}", column, e)))?;
        }
    }

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_items_collection ON items(collection_kind, parent_key, order_index)",
        [],
    )?;
    // client ids used to be unique across all collections
    conn.execute("DROP INDEX IF EXISTS idx_items_client", [])?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_items_collection_client ON items(collection_kind, parent_key, client_id) WHERE client_id IS NOT NULL",
        [],
    )?;

    Ok(())
}
