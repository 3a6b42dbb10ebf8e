use std::path::PathBuf;
use thiserror::Error;

use crate::parser::BookFormat;
use crate::secrets::SecretError;
use crate::status::BookStatus;

#[derive(Error, Debug)]
pub enum ShelfError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Failed to resolve secret '{name}': {source}")]
    Secret {
        name: &'static str,
        #[source]
        source: SecretError,
    },
}

/// Errors raised while detecting or parsing an uploaded book.
///
/// Both variants are terminal: malformed input does not become valid on retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Corrupt {format} document: {reason}")]
    CorruptDocument { format: BookFormat, reason: String },
}

impl ParseError {
    pub(crate) fn corrupt(format: BookFormat, reason: impl Into<String>) -> Self {
        ParseError::CorruptDocument {
            format,
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    /// Connection failures, timeouts, throttling and 5xx responses.
    #[error("Transient storage failure during {operation}: {reason}")]
    Transient {
        operation: &'static str,
        reason: String,
    },

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Storage I/O failed for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage backend rejected {operation}: {reason}")]
    Backend {
        operation: &'static str,
        reason: String,
    },

    #[error("Storage backend misconfigured: {0}")]
    Configuration(String),
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transient { .. })
    }
}

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Book record '{0}' not found")]
    NotFound(String),

    #[error("Book record '{id}' is {current}; transition to {requested} rejected")]
    Conflict {
        id: String,
        current: BookStatus,
        requested: BookStatus,
    },

    #[error(transparent)]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, ShelfError>;
