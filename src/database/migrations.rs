//! Schema migrations for the typed URL sync SQLite databases.
//!
//! Uses a `schema_version` table to track which migrations have been applied.
//! Each migration runs exactly once and is recorded with a timestamp. The
//! history database and the sync database share one schema; each store only
//! touches its own tables.

use rusqlite::Connection;

use crate::types::specifics::TYPED_URL_TAG;

/// Current schema version. Bump this when adding a new migration.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Returns the current schema version from the database (0 if table doesn't exist).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .unwrap_or(0)
}

/// Runs all pending schema migrations against the provided connection.
///
/// Safe to call on every startup.
///
/// # Errors
/// Returns `rusqlite::Error` if any SQL statement fails.
pub fn run_all(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         CREATE TABLE IF NOT EXISTS schema_version (
             version INTEGER PRIMARY KEY,
             applied_at INTEGER NOT NULL,
             description TEXT NOT NULL
         );",
    )?;

    let current = get_schema_version(conn);

    if current < 1 {
        migration_v1(conn)?;
        record_version(conn, 1, "History tables: urls, visits")?;
    }

    if current < 2 {
        migration_v2(conn)?;
        record_version(conn, 2, "Sync tables: permanent nodes, nodes, associations")?;
    }

    Ok(())
}

fn record_version(conn: &Connection, version: i32, description: &str) -> Result<(), rusqlite::Error> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at, description) VALUES (?1, ?2, ?3)",
        rusqlite::params![version, now, description],
    )?;
    Ok(())
}

/// V1: URL rows and their visits.
fn migration_v1(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS urls (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL DEFAULT '',
            last_visit INTEGER NOT NULL DEFAULT 0,
            visit_count INTEGER NOT NULL DEFAULT 0,
            typed_count INTEGER NOT NULL DEFAULT 0,
            hidden INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_urls_typed_count ON urls(typed_count);

        CREATE TABLE IF NOT EXISTS visits (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url_id INTEGER NOT NULL,
            visit_time INTEGER NOT NULL,
            transition INTEGER NOT NULL DEFAULT 0,
            source INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY (url_id) REFERENCES urls(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_visits_url_time ON visits(url_id, visit_time);
        ",
    )
}

/// V2: Sync nodes, their permanent parents, and the URL association table.
fn migration_v2(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS sync_permanent_nodes (
            tag TEXT PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS sync_nodes (
            id TEXT PRIMARY KEY,
            parent_tag TEXT NOT NULL,
            client_tag TEXT NOT NULL,
            specifics TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(parent_tag, client_tag),
            FOREIGN KEY (parent_tag) REFERENCES sync_permanent_nodes(tag)
        );

        CREATE TABLE IF NOT EXISTS typed_url_associations (
            url_id INTEGER NOT NULL UNIQUE,
            node_id TEXT NOT NULL UNIQUE,
            FOREIGN KEY (node_id) REFERENCES sync_nodes(id) ON DELETE CASCADE
        );
        ",
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO sync_permanent_nodes (tag) VALUES (?1)",
        rusqlite::params![TYPED_URL_TAG],
    )?;
    Ok(())
}
