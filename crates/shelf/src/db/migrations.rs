//! Schema versions for the books database.
//!
//! `schema_migrations` records every applied version. Each pending version
//! runs in its own transaction together with its bookkeeping row.

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection};

use super::error::DatabaseError;

/// `(version, name, sql)`, ascending.
const SCHEMA: &[(u32, &str, &str)] = &[
    (
        1,
        "create_books",
        include_str!("sql/001_create_books.sql"),
    ),
    (
        2,
        "create_books_status_index",
        include_str!("sql/002_create_books_status_index.sql"),
    ),
];

/// Highest schema version this build knows about.
pub fn latest_version() -> u32 {
    SCHEMA.last().map(|&(version, _, _)| version).unwrap_or(0)
}

/// Highest version applied to `conn`, 0 for a fresh database.
pub fn current_version(conn: &Connection) -> Result<u32, DatabaseError> {
    ensure_table(conn)?;
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |r| r.get(0),
    )?;
    Ok(version)
}

/// Brings `conn` up to [`latest_version`]. Returns how many versions ran.
pub fn migrate(conn: &Connection) -> Result<usize, DatabaseError> {
    let from = current_version(conn)?;
    let mut applied = 0;

    for &(version, name, sql) in SCHEMA.iter().filter(|(v, _, _)| *v > from) {
        log::info!("Applying schema v{} ({})", version, name);

        let as_migration = |source| DatabaseError::Migration {
            version,
            name,
            source,
        };
        let tx = conn.unchecked_transaction().map_err(as_migration)?;
        tx.execute_batch(sql).map_err(as_migration)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![
                version,
                name,
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
            ],
        )
        .map_err(as_migration)?;
        tx.commit().map_err(as_migration)?;

        applied += 1;
    }

    Ok(applied)
}

fn ensure_table(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );",
    )?;
    Ok(())
}
