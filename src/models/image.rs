use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::disease::PredictionSummary;
use crate::storage::ImageVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "PENDING",
            ProcessingStatus::Processing => "PROCESSING",
            ProcessingStatus::Completed => "COMPLETED",
            ProcessingStatus::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ImageRow {
    pub id: String,
    pub filename: String,
    pub original_name: String,
    pub mimetype: String,
    pub size: i64,
    pub path: String,
    pub processed_path: Option<String>,
    pub thumbnail_path: Option<String>,
    #[serde(skip)]
    pub original_key: String,
    #[serde(skip)]
    pub processed_key: Option<String>,
    #[serde(skip)]
    pub thumbnail_key: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub processing_status: String,
    pub processing_error: Option<String>,
    pub user_id: String,
    pub uploaded_at: String,
    pub updated_at: String,
}

impl ImageRow {
    pub fn key_for(&self, variant: ImageVariant) -> Option<&str> {
        match variant {
            ImageVariant::Original => Some(self.original_key.as_str()),
            ImageVariant::Processed => self.processed_key.as_deref(),
            ImageVariant::Thumbnail => self.thumbnail_key.as_deref(),
        }
    }

    pub fn url_for(&self, variant: ImageVariant) -> Option<&str> {
        match variant {
            ImageVariant::Original => Some(self.path.as_str()),
            ImageVariant::Processed => self.processed_path.as_deref(),
            ImageVariant::Thumbnail => self.thumbnail_path.as_deref(),
        }
    }

    /// Every stored object key of this image.
    pub fn all_keys(&self) -> Vec<String> {
        ImageVariant::ALL.iter().filter_map(|v| self.key_for(*v)).map(str::to_string).collect()
    }

    pub fn urls(&self) -> ImageUrls {
        ImageUrls {
            original: self.path.clone(),
            processed: self.processed_path.clone(),
            thumbnail: self.thumbnail_path.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrls {
    pub original: String,
    pub processed: Option<String>,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OwnerSummary {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Image as returned by list and detail endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDto {
    #[serde(flatten)]
    pub image: ImageRow,
    pub urls: ImageUrls,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<OwnerSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predictions: Option<Vec<PredictionSummary>>,
}

impl ImageDto {
    pub fn new(image: ImageRow) -> Self {
        let urls = image.urls();
        Self { image, urls, user: None, predictions: None }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCount {
    pub processing_status: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageStats {
    pub total_images: i64,
    pub processing_stats: Vec<StatusCount>,
    pub total_size: i64,
    pub average_size: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> ImageRow {
        ImageRow {
            id: "img".into(),
            filename: "x.jpg".into(),
            original_name: "leaf.jpg".into(),
            mimetype: "image/jpeg".into(),
            size: 10,
            path: "http://s/o.jpg".into(),
            processed_path: Some("http://s/p.jpg".into()),
            thumbnail_path: None,
            original_key: "crop-disease/original/o.jpg".into(),
            processed_key: Some("crop-disease/processed/p.jpg".into()),
            thumbnail_key: None,
            width: Some(4),
            height: Some(3),
            processing_status: "COMPLETED".into(),
            processing_error: None,
            user_id: "u".into(),
            uploaded_at: "t".into(),
            updated_at: "t".into(),
        }
    }

    #[test]
    fn test_keys_and_urls_follow_variants() {
        let r = row();
        assert_eq!(r.all_keys().len(), 2);
        assert_eq!(r.url_for(ImageVariant::Processed), Some("http://s/p.jpg"));
        assert!(r.key_for(ImageVariant::Thumbnail).is_none());
    }

    #[test]
    fn test_dto_hides_storage_keys() {
        let v = serde_json::to_value(ImageDto::new(row())).unwrap();
        assert!(v.get("originalKey").is_none());
        assert_eq!(v["originalName"], "leaf.jpg");
        assert_eq!(v["urls"]["processed"], "http://s/p.jpg");
        assert!(v["urls"]["thumbnail"].is_null());
    }
}
