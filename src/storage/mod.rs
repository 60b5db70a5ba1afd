//! Object storage for uploaded images.
//!
//! Every image is stored as up to three objects (original, processed, thumbnail)
//! under keys of the form `crop-disease/{folder}/{uuid}.{ext}`. The backend is
//! chosen at startup from `storage.backend`.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::config::StorageConfig;

mod local;
mod memory;
mod s3;

pub use local::LocalImageStore;
pub use memory::MemoryImageStore;
pub use s3::S3ImageStore;

/// Top-level folder for every key written by this service.
pub const KEY_PREFIX: &str = "crop-disease";

const MAX_KEY_LEN: usize = 512;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Storage configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of a successful `put`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
}

/// The three renditions kept for every uploaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageVariant {
    Original,
    Processed,
    Thumbnail,
}

impl ImageVariant {
    pub const ALL: [ImageVariant; 3] = [ImageVariant::Original, ImageVariant::Processed, ImageVariant::Thumbnail];

    pub fn folder(self) -> &'static str {
        match self {
            ImageVariant::Original => "original",
            ImageVariant::Processed => "processed",
            ImageVariant::Thumbnail => "thumbnails",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImageVariant::Original => "original",
            ImageVariant::Processed => "processed",
            ImageVariant::Thumbnail => "thumbnail",
        }
    }

    /// Filename prefix used for `Content-Disposition` on download.
    pub fn download_prefix(self) -> &'static str {
        match self {
            ImageVariant::Original => "",
            ImageVariant::Processed => "processed_",
            ImageVariant::Thumbnail => "thumb_",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "original" => Some(ImageVariant::Original),
            "processed" => Some(ImageVariant::Processed),
            "thumbnail" => Some(ImageVariant::Thumbnail),
            _ => None,
        }
    }
}

/// Builds `crop-disease/{folder}/{id}.{ext}`.
pub fn object_key(variant: ImageVariant, id: Uuid, ext: &str) -> String {
    format!("{}/{}/{}.{}", KEY_PREFIX, variant.folder(), id, ext.trim_start_matches('.'))
}

/// Rejects keys that could escape the storage root or confuse a backend.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let bad = key.is_empty()
        || key.len() > MAX_KEY_LEN
        || key.starts_with('/')
        || key.contains('\\')
        || key.contains('\0')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
        || !key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.'));
    if bad {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Short backend name for logs and health output.
    fn name(&self) -> &'static str;

    /// Public URL under which `key` is reachable.
    fn url_for(&self, key: &str) -> String;

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<StoredObject, StorageError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Deleting a missing object succeeds.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Builds the configured backend.
pub async fn from_config(cfg: &StorageConfig) -> Result<Arc<dyn ImageStore>, StorageError> {
    match cfg.backend.as_str() {
        "local" => Ok(Arc::new(LocalImageStore::new(&cfg.local_dir, &cfg.public_base_url)?)),
        "s3" => {
            let settings = cfg
                .s3
                .as_ref()
                .ok_or_else(|| StorageError::Config("storage.s3 section is missing".to_string()))?;
            Ok(Arc::new(S3ImageStore::new(settings).await?))
        }
        other => Err(StorageError::Config(format!("unknown storage backend: {}", other))),
    }
}

/// Deletes each key, logging failures instead of returning them.
pub async fn delete_best_effort(store: &dyn ImageStore, keys: &[String]) -> usize {
    let results = futures::future::join_all(keys.iter().map(|k| store.delete(k))).await;
    let mut failed = 0;
    for (key, res) in keys.iter().zip(results) {
        if let Err(e) = res {
            failed += 1;
            tracing::warn!(key = %key, backend = store.name(), "Failed to delete stored object: {}", e);
        }
    }
    failed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_layout() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(
            object_key(ImageVariant::Original, id, "png"),
            "crop-disease/original/550e8400-e29b-41d4-a716-446655440000.png"
        );
        assert_eq!(
            object_key(ImageVariant::Thumbnail, id, ".jpg"),
            "crop-disease/thumbnails/550e8400-e29b-41d4-a716-446655440000.jpg"
        );
        assert!(validate_key(&object_key(ImageVariant::Processed, id, "jpg")).is_ok());
    }

    #[test]
    fn test_key_validation_rejects_traversal() {
        assert!(validate_key("crop-disease/../etc/passwd").is_err());
        assert!(validate_key("/abs/key.jpg").is_err());
        assert!(validate_key("a//b.jpg").is_err());
        assert!(validate_key("a\\b.jpg").is_err());
        assert!(validate_key("a/b c.jpg").is_err());
        assert!(validate_key("").is_err());
        assert!(validate_key("crop-disease/original/x.jpg").is_ok());
    }

    #[test]
    fn test_variant_parse() {
        assert_eq!(ImageVariant::parse("thumbnail"), Some(ImageVariant::Thumbnail));
        assert_eq!(ImageVariant::parse("thumbnails"), None);
        assert_eq!(ImageVariant::Processed.download_prefix(), "processed_");
        assert_eq!(ImageVariant::Thumbnail.download_prefix(), "thumb_");
        assert_eq!(ImageVariant::Original.download_prefix(), "");
    }
}
