pub mod filesystem;
pub mod object_store;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::StorageConfig;
use crate::error::StorageError;

pub use filesystem::FileStorage;
pub use object_store::ObjectStorage;

/// Opaque handle for a stored object, as returned by [`StorageBackend::put`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Blob storage for originals and covers.
///
/// `put` with an existing hint replaces the object. `delete` of a missing
/// object succeeds. Failures report whether a retry could help through
/// [`StorageError::is_transient`].
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn put(&self, key_hint: &str, data: &[u8]) -> Result<ObjectKey, StorageError>;

    async fn get(&self, key: &ObjectKey) -> Result<Vec<u8>, StorageError>;

    async fn delete(&self, key: &ObjectKey) -> Result<(), StorageError>;
}

/// Rejects absolute keys, `..`, backslashes and empty segments.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let reject = |reason: &str| {
        Err(StorageError::InvalidKey {
            key: key.to_string(),
            reason: reason.to_string(),
        })
    };

    if key.is_empty() {
        return reject("empty key");
    }
    if key.starts_with('/') {
        return reject("absolute keys are not allowed");
    }
    if key.contains('\\') {
        return reject("backslash in key");
    }
    for segment in key.split('/') {
        match segment {
            "" => return reject("empty path segment"),
            "." | ".." => return reject("relative path segment"),
            _ => {}
        }
    }
    Ok(())
}

/// Builds the configured backend. Object-store credentials are resolved here
/// and the bucket is created when missing.
pub async fn create_backend(
    config: &StorageConfig,
) -> Result<Arc<dyn StorageBackend>, StorageError> {
    match config {
        StorageConfig::Filesystem { root } => {
            let root = crate::secrets::expand_home(root);
            log::info!("Using filesystem storage at {}", root);
            Ok(Arc::new(FileStorage::new(root)))
        }
        StorageConfig::ObjectStore(store) => {
            let storage = ObjectStorage::from_config(store)?;
            storage.ensure_bucket().await?;
            Ok(Arc::new(storage))
        }
    }
}
