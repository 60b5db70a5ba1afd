use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{validate_key, ImageStore, StorageError, StoredObject};

/// In-process store. Used by the test suite and handy for local experiments.
#[derive(Clone, Default)]
pub struct MemoryImageStore {
    objects: Arc<RwLock<HashMap<String, (Vec<u8>, String)>>>,
    fail_puts: Arc<AtomicBool>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `put` fail.
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects.read().await.get(key).map(|(_, ct)| ct.clone())
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn url_for(&self, key: &str) -> String {
        format!("http://images.invalid/{}", key)
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<StoredObject, StorageError> {
        validate_key(key)?;
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::UploadFailed(format!("{}: injected failure", key)));
        }
        self.objects.write().await.insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(StoredObject { key: key.to_string(), url: self.url_for(key) })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        validate_key(key)?;
        self.objects
            .read()
            .await
            .get(key)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.objects.write().await.remove(key);
        Ok(())
    }
}
