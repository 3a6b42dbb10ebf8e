use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cannot create database directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Schema migration `version` did not apply; nothing of it was kept.
    #[error("Schema migration v{version} ({name}) failed: {source}")]
    Migration {
        version: u32,
        name: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// A stored column could not be decoded into its typed form.
    #[error("Invalid value '{value}' in books.{column}")]
    InvalidRow { column: &'static str, value: String },

    #[error("Book database lock poisoned by a panicking thread")]
    LockPoisoned,
}
