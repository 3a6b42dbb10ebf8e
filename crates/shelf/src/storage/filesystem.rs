use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StorageError;
use crate::storage::{validate_key, ObjectKey, StorageBackend};

/// Stores objects as files under a root directory. The key is the relative path.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    /// Writes a sibling `.part` file and renames it over the target, so readers
    /// never observe a partial object.
    async fn write_atomically(&self, path: &Path, data: &[u8]) -> Result<(), StorageError> {
        let dir = path.parent().unwrap_or(&self.root);
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| classify_io("put", dir, e))?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("object");
        let tmp = dir.join(format!(".{}.{}.part", file_name, Uuid::new_v4()));

        if let Err(e) = tokio::fs::write(&tmp, data).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(classify_io("put", &tmp, e));
        }

        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(classify_io("put", path, e));
        }

        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FileStorage {
    async fn put(&self, key_hint: &str, data: &[u8]) -> Result<ObjectKey, StorageError> {
        let path = self.path_for(key_hint)?;
        self.write_atomically(&path, data).await?;
        tracing::debug!(key = key_hint, bytes = data.len(), "stored object on filesystem");
        Ok(ObjectKey::new(key_hint))
    }

    async fn get(&self, key: &ObjectKey) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key.as_str())?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(classify_io("get", &path, e)),
        }
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), StorageError> {
        let path = self.path_for(key.as_str())?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(classify_io("delete", &path, e)),
        }
    }
}

fn classify_io(operation: &'static str, path: &Path, e: std::io::Error) -> StorageError {
    match e.kind() {
        ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock => {
            StorageError::Transient {
                operation,
                reason: e.to_string(),
            }
        }
        _ => StorageError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage() -> (TempDir, FileStorage) {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path());
        (dir, storage)
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let (_dir, storage) = storage();
        let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();

        let key = storage.put("0ABC/original.pdf", &data).await.unwrap();
        assert_eq!(key.as_str(), "0ABC/original.pdf");
        assert_eq!(storage.get(&key).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_empty_object() {
        let (_dir, storage) = storage();
        let key = storage.put("empty.bin", b"").await.unwrap();
        assert!(storage.get(&key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_replaces_existing_object() {
        let (_dir, storage) = storage();
        storage.put("k/cover.jpg", b"first").await.unwrap();
        let key = storage.put("k/cover.jpg", b"second").await.unwrap();
        assert_eq!(storage.get(&key).await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_no_part_files_left_behind() {
        let (dir, storage) = storage();
        storage.put("k/original.epub", b"data").await.unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("k"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (_dir, storage) = storage();
        let err = storage.get(&ObjectKey::new("nope.bin")).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_dir, storage) = storage();
        let key = storage.put("gone.bin", b"x").await.unwrap();
        storage.delete(&key).await.unwrap();
        storage.delete(&key).await.unwrap();
        assert!(matches!(
            storage.get(&key).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let (_dir, storage) = storage();
        let err = storage.put("../outside.bin", b"x").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey { .. }));
    }

    #[test]
    fn test_io_classification() {
        let transient = classify_io(
            "put",
            Path::new("a"),
            std::io::Error::new(ErrorKind::TimedOut, "slow disk"),
        );
        assert!(transient.is_transient());

        let permanent = classify_io(
            "put",
            Path::new("a"),
            std::io::Error::new(ErrorKind::PermissionDenied, "read-only"),
        );
        assert!(!permanent.is_transient());
    }
}
