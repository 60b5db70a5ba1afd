//! Upload pipeline and image bookkeeping.
//!
//! An upload is stored three times (original, processed, thumbnail) before
//! its row is written; a failed insert removes the stored objects again.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use super::predictions;
use super::{like_pattern, non_blank, SortOrder};
use crate::auth::AuthUser;
use crate::db;
use crate::error::{validation, AppError, AppResult};
use crate::imaging::{self, MAX_UPLOAD_BYTES};
use crate::models::{
    ImageDto, ImageRow, ImageStats, OwnerSummary, PredictionSummary, ProcessingStatus, StatusCount,
};
use crate::response::{PageMeta, Pagination};
use crate::state::AppState;
use crate::storage::{self, ImageVariant, StoredObject};

pub const MAX_BULK_DELETE: usize = 50;

const RENDITION_MIME: &str = "image/jpeg";

const IMAGE_COLUMNS: &str = "i.id, i.filename, i.original_name, i.mimetype, i.size, i.path, i.processed_path, \
     i.thumbnail_path, i.original_key, i.processed_key, i.thumbnail_key, i.width, i.height, \
     i.processing_status, i.processing_error, i.user_id, i.uploaded_at, i.updated_at";

/// A file taken from the multipart body.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn validate(&self) -> AppResult<()> {
        if self.bytes.is_empty() {
            return Err(AppError::BadRequest("No image file provided".to_string()));
        }
        if !imaging::is_allowed_mime(&self.content_type) {
            return Err(AppError::BadRequest(
                "Invalid file type. Only JPEG, PNG, WebP, GIF, BMP and TIFF images are allowed".to_string(),
            ));
        }
        if self.bytes.len() > MAX_UPLOAD_BYTES {
            return Err(AppError::BadRequest("File too large. Maximum size is 10MB".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadedImage {
    #[serde(flatten)]
    pub image: ImageDto,
    pub prediction: Option<PredictionSummary>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub search: Option<String>,
    pub user_id: Option<String>,
    pub processing_status: Option<ProcessingStatus>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDeleteResult {
    pub deleted_count: usize,
    pub deleted_ids: Vec<String>,
}

#[derive(Debug, FromRow)]
struct ImageWithOwnerRow {
    #[sqlx(flatten)]
    image: ImageRow,
    owner_name: String,
    owner_email: String,
}

impl From<ImageWithOwnerRow> for ImageDto {
    fn from(row: ImageWithOwnerRow) -> Self {
        let owner = OwnerSummary { id: row.image.user_id.clone(), name: row.owner_name, email: row.owner_email };
        let mut dto = ImageDto::new(row.image);
        dto.user = Some(owner);
        dto
    }
}

/// Bytes and metadata for `GET /image/{id}/download`.
#[derive(Debug)]
pub struct Download {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub filename: String,
}

fn sort_column(sort_by: Option<&str>) -> AppResult<&'static str> {
    match sort_by {
        None | Some("uploadedAt") => Ok("i.uploaded_at"),
        Some("originalName") => Ok("i.original_name"),
        Some("size") => Ok("i.size"),
        Some(_) => Err(AppError::ValidationError {
            field: "sortBy".to_string(),
            message: "sortBy must be one of uploadedAt, originalName, size".to_string(),
        }),
    }
}

/// Puts every `(key, bytes)` pair concurrently. On any failure the objects
/// that did land are removed again and the first error is returned.
async fn put_all(state: &AppState, objects: Vec<(String, Vec<u8>, String)>) -> AppResult<Vec<StoredObject>> {
    let store = state.store.as_ref();
    let results =
        futures::future::join_all(objects.iter().map(|(key, bytes, ct)| store.put(key, bytes.clone(), ct))).await;

    let mut stored = Vec::with_capacity(results.len());
    let mut first_err = None;
    for res in results {
        match res {
            Ok(obj) => stored.push(obj),
            Err(e) => {
                first_err.get_or_insert(e);
            }
        }
    }
    if let Some(err) = first_err {
        let keys: Vec<String> = stored.into_iter().map(|o| o.key).collect();
        storage::delete_best_effort(store, &keys).await;
        return Err(err.into());
    }
    Ok(stored)
}

pub async fn find_image(db: &SqlitePool, id: &str) -> AppResult<Option<ImageRow>> {
    let row = sqlx::query_as::<_, ImageRow>(&format!("SELECT {} FROM images i WHERE i.id = ?", IMAGE_COLUMNS))
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(row)
}

pub async fn get_image_row(db: &SqlitePool, id: &str) -> AppResult<ImageRow> {
    find_image(db, id).await?.ok_or_else(|| AppError::NotFound("Image not found".to_string()))
}

/// Validates, renders, stores and records an upload, then optionally predicts.
pub async fn upload(state: &AppState, caller: &AuthUser, file: UploadedFile) -> AppResult<UploadedImage> {
    file.validate()?;
    let renditions = imaging::render(file.bytes.clone()).await?;

    let id = Uuid::new_v4();
    let ext = imaging::extension_for_mime(&file.content_type);
    let original_key = storage::object_key(ImageVariant::Original, id, ext);
    let processed_key = storage::object_key(ImageVariant::Processed, id, "jpg");
    let thumbnail_key = storage::object_key(ImageVariant::Thumbnail, id, "jpg");
    let size = file.bytes.len() as i64;

    let stored = put_all(
        state,
        vec![
            (original_key.clone(), file.bytes, file.content_type.to_ascii_lowercase()),
            (processed_key.clone(), renditions.processed, RENDITION_MIME.to_string()),
            (thumbnail_key.clone(), renditions.thumbnail, RENDITION_MIME.to_string()),
        ],
    )
    .await?;
    let url_of = |key: &str| {
        stored.iter().find(|o| o.key == key).map(|o| o.url.clone()).unwrap_or_else(|| state.store.url_for(key))
    };

    let now = db::now();
    let image_id = id.to_string();
    let insert = sqlx::query(
        "INSERT INTO images (id, filename, original_name, mimetype, size, path, processed_path, thumbnail_path, \
            original_key, processed_key, thumbnail_key, width, height, processing_status, user_id, uploaded_at, \
            updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'PENDING', ?, ?, ?)",
    )
    .bind(&image_id)
    .bind(format!("{}.{}", id, ext))
    .bind(&file.original_name)
    .bind(file.content_type.to_ascii_lowercase())
    .bind(size)
    .bind(url_of(&original_key))
    .bind(url_of(&processed_key))
    .bind(url_of(&thumbnail_key))
    .bind(&original_key)
    .bind(&processed_key)
    .bind(&thumbnail_key)
    .bind(renditions.width as i64)
    .bind(renditions.height as i64)
    .bind(&caller.user_id)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await;

    if let Err(e) = insert {
        tracing::error!(image_id = %image_id, "Failed to record upload, removing stored objects: {}", e);
        storage::delete_best_effort(state.store.as_ref(), &[original_key, processed_key, thumbnail_key]).await;
        return Err(e.into());
    }

    state.metrics.record_upload(size as u64);
    tracing::info!(image_id = %image_id, user_id = %caller.user_id, size, "Image uploaded");

    let mut image = get_image_row(&state.db, &image_id).await?;
    let mut prediction = None;
    if state.config.ml.predict_on_upload {
        match predictions::run_prediction(state, &image).await {
            Ok(p) => prediction = Some(p),
            Err(e) => tracing::warn!(image_id = %image_id, "Prediction on upload failed: {}", e),
        }
        image = get_image_row(&state.db, &image_id).await?;
    }

    Ok(UploadedImage { image: ImageDto::new(image), prediction })
}

fn push_image_filters(qb: &mut QueryBuilder<'_, Sqlite>, query: &ImageListQuery, owner: Option<&str>) {
    qb.push(" WHERE 1 = 1");
    if let Some(owner) = owner.or(non_blank(query.user_id.as_deref())) {
        qb.push(" AND i.user_id = ").push_bind(owner.to_string());
    }
    if let Some(status) = query.processing_status {
        qb.push(" AND i.processing_status = ").push_bind(status.as_str());
    }
    if let Some(term) = non_blank(query.search.as_deref()) {
        qb.push(" AND LOWER(i.original_name) LIKE LOWER(")
            .push_bind(like_pattern(term))
            .push(") ESCAPE '\\'");
    }
}

/// Lists images with their owners. `owner` overrides any `userId` filter in the query.
pub async fn list_images(
    db: &SqlitePool,
    query: &ImageListQuery,
    owner: Option<&str>,
) -> AppResult<(Vec<ImageDto>, PageMeta)> {
    let paging = Pagination::from_query(query.page, query.limit)?;
    let column = sort_column(query.sort_by.as_deref())?;
    let order = SortOrder::parse(query.sort_order.as_deref());

    let mut count_qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM images i");
    push_image_filters(&mut count_qb, query, owner);
    let total: i64 = count_qb.build_query_scalar().fetch_one(db).await?;

    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {}, u.name AS owner_name, u.email AS owner_email FROM images i JOIN users u ON u.id = i.user_id",
        IMAGE_COLUMNS
    ));
    push_image_filters(&mut qb, query, owner);
    qb.push(format!(" ORDER BY {} {}, i.id ASC LIMIT ", column, order.as_sql()))
        .push_bind(paging.limit)
        .push(" OFFSET ")
        .push_bind(paging.offset());
    let rows: Vec<ImageWithOwnerRow> = qb.build_query_as().fetch_all(db).await?;

    Ok((rows.into_iter().map(ImageDto::from).collect(), paging.meta(total)))
}

/// Global figures, or one owner's when `owner` is set.
pub async fn image_stats(db: &SqlitePool, owner: Option<&str>) -> AppResult<ImageStats> {
    let (total_images, total_size): (i64, i64) =
        sqlx::query_as("SELECT COUNT(*), COALESCE(SUM(size), 0) FROM images WHERE (?1 IS NULL OR user_id = ?1)")
            .bind(owner)
            .fetch_one(db)
            .await?;

    let processing_stats: Vec<(String, i64)> = sqlx::query_as(
        "SELECT processing_status, COUNT(*) FROM images WHERE (?1 IS NULL OR user_id = ?1) \
         GROUP BY processing_status ORDER BY processing_status",
    )
    .bind(owner)
    .fetch_all(db)
    .await?;

    Ok(ImageStats {
        total_images,
        processing_stats: processing_stats
            .into_iter()
            .map(|(processing_status, count)| StatusCount { processing_status, count })
            .collect(),
        total_size,
        average_size: if total_images > 0 { total_size / total_images } else { 0 },
    })
}

/// Predictions of an image, newest first, each with its catalog entry.
pub async fn predictions_for(db: &SqlitePool, image_id: &str) -> AppResult<Vec<PredictionSummary>> {
    let rows: Vec<crate::models::disease::PredictionJoinRow> = sqlx::query_as(
        "SELECT p.id, p.image_id, p.disease_id, p.user_id, p.predicted_label, p.confidence, p.is_healthy, \
            p.treatment, p.processing_time_seconds, p.raw_response, p.created_at, \
            d.name AS disease_name, d.severity AS disease_severity \
         FROM predictions p LEFT JOIN diseases d ON d.id = p.disease_id \
         WHERE p.image_id = ? ORDER BY p.created_at DESC, p.id ASC",
    )
    .bind(image_id)
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().map(PredictionSummary::from).collect())
}

pub async fn get_image(db: &SqlitePool, id: &str, caller: &AuthUser) -> AppResult<ImageDto> {
    let row: Option<ImageWithOwnerRow> = sqlx::query_as(&format!(
        "SELECT {}, u.name AS owner_name, u.email AS owner_email FROM images i \
         JOIN users u ON u.id = i.user_id WHERE i.id = ?",
        IMAGE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    let row = row.ok_or_else(|| AppError::NotFound("Image not found".to_string()))?;
    caller.ensure_owner_or_admin(&row.image.user_id)?;

    let mut dto = ImageDto::from(row);
    dto.predictions = Some(predictions_for(db, id).await?);
    Ok(dto)
}

/// URL of one variant, for redirects.
pub async fn variant_url(db: &SqlitePool, id: &str, variant: ImageVariant, caller: &AuthUser) -> AppResult<String> {
    let image = get_image_row(db, id).await?;
    caller.ensure_owner_or_admin(&image.user_id)?;
    image
        .url_for(variant)
        .map(str::to_string)
        .ok_or_else(|| AppError::NotFound(format!("{} version not available", variant.as_str())))
}

pub async fn download(state: &AppState, id: &str, variant: ImageVariant, caller: &AuthUser) -> AppResult<Download> {
    let image = get_image_row(&state.db, id).await?;
    caller.ensure_owner_or_admin(&image.user_id)?;
    let key = image
        .key_for(variant)
        .ok_or_else(|| AppError::NotFound(format!("{} version not available", variant.as_str())))?;

    let bytes = state.store.get(key).await?;
    let content_type = match variant {
        ImageVariant::Original => image.mimetype.clone(),
        ImageVariant::Processed | ImageVariant::Thumbnail => RENDITION_MIME.to_string(),
    };
    Ok(Download {
        bytes,
        content_type,
        filename: format!("{}{}", variant.download_prefix(), image.original_name),
    })
}

/// Rebuilds the processed and thumbnail variants from the stored original.
///
/// New variants get fresh keys so cached URLs never serve stale bytes; the
/// replaced objects are removed afterwards.
pub async fn reprocess(state: &AppState, id: &str) -> AppResult<ImageDto> {
    let image = get_image_row(&state.db, id).await?;
    let original = state.store.get(&image.original_key).await?;
    let renditions = match imaging::render(original).await {
        Ok(r) => r,
        Err(e) => {
            mark_status(&state.db, id, ProcessingStatus::Failed, Some(&e.to_string())).await?;
            return Err(e);
        }
    };

    let rev = Uuid::new_v4();
    let processed_key = storage::object_key(ImageVariant::Processed, rev, "jpg");
    let thumbnail_key = storage::object_key(ImageVariant::Thumbnail, rev, "jpg");
    let stored = put_all(
        state,
        vec![
            (processed_key.clone(), renditions.processed, RENDITION_MIME.to_string()),
            (thumbnail_key.clone(), renditions.thumbnail, RENDITION_MIME.to_string()),
        ],
    )
    .await?;
    let url_of = |key: &str| {
        stored.iter().find(|o| o.key == key).map(|o| o.url.clone()).unwrap_or_else(|| state.store.url_for(key))
    };

    sqlx::query(
        "UPDATE images SET processed_key = ?, processed_path = ?, thumbnail_key = ?, thumbnail_path = ?, \
            width = ?, height = ?, processing_status = 'COMPLETED', processing_error = NULL, updated_at = ? \
         WHERE id = ?",
    )
    .bind(&processed_key)
    .bind(url_of(&processed_key))
    .bind(&thumbnail_key)
    .bind(url_of(&thumbnail_key))
    .bind(renditions.width as i64)
    .bind(renditions.height as i64)
    .bind(db::now())
    .bind(id)
    .execute(&state.db)
    .await?;

    let replaced: Vec<String> =
        [image.processed_key, image.thumbnail_key].into_iter().flatten().collect();
    storage::delete_best_effort(state.store.as_ref(), &replaced).await;

    tracing::info!(image_id = %id, "Image reprocessed");
    Ok(ImageDto::new(get_image_row(&state.db, id).await?))
}

pub async fn mark_status(
    db: &SqlitePool,
    id: &str,
    status: ProcessingStatus,
    error: Option<&str>,
) -> AppResult<()> {
    sqlx::query("UPDATE images SET processing_status = ?, processing_error = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(error)
        .bind(db::now())
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

/// Removes stored objects (failures are only logged) and then the row.
pub async fn delete_image(state: &AppState, id: &str, caller: &AuthUser) -> AppResult<String> {
    let image = get_image_row(&state.db, id).await?;
    caller.ensure_owner_or_admin(&image.user_id)?;

    let failed = storage::delete_best_effort(state.store.as_ref(), &image.all_keys()).await;
    sqlx::query("DELETE FROM images WHERE id = ?").bind(id).execute(&state.db).await?;

    state.metrics.add_images_deleted(1);
    tracing::info!(image_id = %id, storage_failures = failed, "Image deleted");
    Ok(image.id)
}

/// Deletes up to [`MAX_BULK_DELETE`] images. Non-admins only reach their own.
pub async fn bulk_delete(state: &AppState, ids: &[String], caller: &AuthUser) -> AppResult<BulkDeleteResult> {
    validation::validate_id_list("imageIds", ids, MAX_BULK_DELETE)?;

    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM images i WHERE i.id IN (", IMAGE_COLUMNS));
    let mut sep = qb.separated(", ");
    for id in ids {
        sep.push_bind(id.trim().to_string());
    }
    sep.push_unseparated(")");
    if !caller.is_admin() {
        qb.push(" AND i.user_id = ").push_bind(caller.user_id.clone());
    }
    let images: Vec<ImageRow> = qb.build_query_as().fetch_all(&state.db).await?;
    if images.is_empty() {
        return Err(AppError::NotFound("No images found to delete".to_string()));
    }

    let keys: Vec<String> = images.iter().flat_map(|i| i.all_keys()).collect();
    storage::delete_best_effort(state.store.as_ref(), &keys).await;

    let deleted_ids: Vec<String> = images.into_iter().map(|i| i.id).collect();
    let mut tx = state.db.begin().await?;
    for id in &deleted_ids {
        sqlx::query("DELETE FROM images WHERE id = ?").bind(id).execute(&mut *tx).await?;
    }
    tx.commit().await?;

    state.metrics.add_images_deleted(deleted_ids.len() as u64);
    tracing::info!(count = deleted_ids.len(), user_id = %caller.user_id, "Bulk image delete");
    Ok(BulkDeleteResult { deleted_count: deleted_ids.len(), deleted_ids })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(ct: &str, len: usize) -> UploadedFile {
        UploadedFile { original_name: "leaf.png".into(), content_type: ct.into(), bytes: vec![0u8; len] }
    }

    #[test]
    fn test_upload_validation() {
        assert!(file("image/png", 10).validate().is_ok());
        assert!(file("image/PNG", 10).validate().is_ok());
        assert!(file("application/pdf", 10).validate().is_err());
        assert!(file("image/png", 0).validate().is_err());
        assert!(file("image/png", MAX_UPLOAD_BYTES + 1).validate().is_err());
        assert!(file("image/png", MAX_UPLOAD_BYTES).validate().is_ok());
    }

    #[test]
    fn test_sort_columns() {
        assert_eq!(sort_column(None).unwrap(), "i.uploaded_at");
        assert_eq!(sort_column(Some("size")).unwrap(), "i.size");
        assert!(sort_column(Some("user_id; DROP TABLE images")).is_err());
    }
}
