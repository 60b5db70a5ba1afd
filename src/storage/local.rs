use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;

use super::{validate_key, ImageStore, StorageError, StoredObject};

/// Stores objects as files below a root directory. Files are served by the
/// `/uploads` static route.
pub struct LocalImageStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalImageStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root, public_base_url: public_base_url.trim_end_matches('/').to_string() })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    fn name(&self) -> &'static str {
        "local"
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/uploads/{}", self.public_base_url, key)
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<StoredObject, StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| StorageError::UploadFailed(format!("{}: {}", key, e)))?;
        tracing::debug!(key = %key, size = bytes.len(), "Stored object on disk");
        Ok(StoredObject { key: key.to_string(), url: self.url_for(key) })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(key.to_string())),
            Err(e) => Err(StorageError::DownloadFailed(format!("{}: {}", key, e))),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(format!("{}: {}", key, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalImageStore::new(dir.path(), "http://localhost:3000/").unwrap();

        let key = "crop-disease/original/abc.png";
        let obj = store.put(key, vec![1, 2, 3], "image/png").await.unwrap();
        assert_eq!(obj.url, "http://localhost:3000/uploads/crop-disease/original/abc.png");
        assert!(dir.path().join(key).is_file());

        assert_eq!(store.get(key).await.unwrap(), vec![1, 2, 3]);

        store.delete(key).await.unwrap();
        assert!(matches!(store.get(key).await, Err(StorageError::NotFound(_))));
        // second delete is a no-op
        store.delete(key).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalImageStore::new(dir.path(), "http://localhost").unwrap();
        let err = store.put("../escape.png", vec![0], "image/png").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }
}
