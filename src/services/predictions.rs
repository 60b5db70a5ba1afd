//! Prediction flow: ask the ML service about an image, persist the answer and
//! link it to the disease catalog.

use serde::Serialize;
use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

use super::diseases;
use super::images::{self, get_image_row};
use crate::auth::AuthUser;
use crate::db;
use crate::error::{validation, AppError, AppResult};
use crate::ml::{MlError, PredictionOutcome};
use crate::models::{DiseaseSummary, ImageRow, PredictionRow, PredictionSummary, ProcessingStatus};
use crate::state::AppState;

pub const MAX_BATCH_PREDICT: usize = 10;

/// Catalog entry healthy predictions are linked to.
pub const HEALTHY_DISEASE_NAME: &str = "Healthy Crop";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MlHealthReport {
    pub is_healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Fulfilled,
    Rejected,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub image_id: String,
    pub status: BatchStatus,
    pub data: Option<PredictionSummary>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<BatchItem>,
}

pub async fn health(state: &AppState) -> MlHealthReport {
    match state.ml.health().await {
        Ok(h) => MlHealthReport { is_healthy: true, status: h.status, timestamp: h.timestamp, error: None, message: None },
        Err(e) => {
            tracing::debug!("ML health check failed: {}", e);
            MlHealthReport {
                is_healthy: false,
                status: None,
                timestamp: None,
                error: Some("ML service not available".to_string()),
                message: Some(e.to_string()),
            }
        }
    }
}

/// Health and model metadata, or an `error` entry when either call fails.
pub async fn service_info(state: &AppState) -> Value {
    let service_url = state.ml.service_url().to_string();
    let (health, models) = tokio::join!(state.ml.health(), state.ml.model_info());
    match (health, models) {
        (Ok(h), Ok(m)) => serde_json::json!({ "health": h.raw, "models": m, "serviceUrl": service_url }),
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!("ML service information unavailable: {}", e);
            serde_json::json!({ "error": "ML service information unavailable", "serviceUrl": service_url })
        }
    }
}

/// Links a predicted label to the catalog: exact name (case-insensitive)
/// first, then the healthy entry for healthy results.
pub async fn map_label(db: &sqlx::SqlitePool, outcome: &PredictionOutcome) -> AppResult<Option<DiseaseSummary>> {
    if let Some(found) = diseases::find_active_by_name(db, &outcome.label).await? {
        return Ok(Some(found));
    }
    if outcome.is_healthy {
        return diseases::find_active_by_name(db, HEALTHY_DISEASE_NAME).await;
    }
    Ok(None)
}

async fn fetch_prediction_input(state: &AppState, image: &ImageRow) -> AppResult<Vec<u8>> {
    if let Some(key) = image.processed_key.as_deref() {
        match state.store.get(key).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) => tracing::warn!(image_id = %image.id, "Processed image unavailable, using original: {}", e),
        }
    }
    Ok(state.store.get(&image.original_key).await?)
}

async fn predict_and_record(state: &AppState, image: &ImageRow) -> AppResult<PredictionSummary> {
    if let Err(e) = state.ml.health().await {
        tracing::warn!(image_id = %image.id, "ML service unhealthy: {}", e);
        return Err(MlError::Unavailable.into());
    }

    images::mark_status(&state.db, &image.id, ProcessingStatus::Processing, None).await?;
    let bytes = fetch_prediction_input(state, image).await?;
    let outcome = state.ml.predict(bytes, &format!("image_{}.jpg", image.id)).await?;
    let disease = map_label(&state.db, &outcome).await?;

    let prediction = PredictionRow {
        id: Uuid::new_v4().to_string(),
        image_id: image.id.clone(),
        disease_id: disease.as_ref().map(|d| d.id.clone()),
        user_id: image.user_id.clone(),
        predicted_label: outcome.label.clone(),
        confidence: outcome.confidence,
        is_healthy: outcome.is_healthy,
        treatment: outcome.treatment_text(),
        processing_time_seconds: outcome.processing_time_seconds,
        raw_response: outcome.raw.to_string(),
        created_at: db::now(),
    };

    let mut tx = state.db.begin().await?;
    sqlx::query(
        "INSERT INTO predictions (id, image_id, disease_id, user_id, predicted_label, confidence, is_healthy, \
            treatment, processing_time_seconds, raw_response, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&prediction.id)
    .bind(&prediction.image_id)
    .bind(&prediction.disease_id)
    .bind(&prediction.user_id)
    .bind(&prediction.predicted_label)
    .bind(prediction.confidence)
    .bind(prediction.is_healthy)
    .bind(&prediction.treatment)
    .bind(prediction.processing_time_seconds)
    .bind(&prediction.raw_response)
    .bind(&prediction.created_at)
    .execute(&mut *tx)
    .await?;

    if let Some(d) = disease.as_ref() {
        sqlx::query(
            "INSERT INTO disease_history (id, user_id, disease_id, image_id, prediction_id, confidence, detected_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&image.user_id)
        .bind(&d.id)
        .bind(&image.id)
        .bind(&prediction.id)
        .bind(prediction.confidence)
        .bind(&prediction.created_at)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        "UPDATE images SET processing_status = 'COMPLETED', processing_error = NULL, updated_at = ? WHERE id = ?",
    )
    .bind(db::now())
    .bind(&image.id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(
        image_id = %image.id,
        label = %prediction.predicted_label,
        confidence = prediction.confidence,
        disease_id = ?prediction.disease_id,
        "Prediction recorded"
    );
    Ok(PredictionSummary { prediction, disease })
}

/// Runs the full flow for `image`. Any failure leaves the image `FAILED`
/// with the error text before the error is returned.
pub async fn run_prediction(state: &AppState, image: &ImageRow) -> AppResult<PredictionSummary> {
    match predict_and_record(state, image).await {
        Ok(summary) => {
            state.metrics.record_prediction(true);
            Ok(summary)
        }
        Err(err) => {
            state.metrics.record_prediction(false);
            if matches!(
                err,
                AppError::ServiceUnavailable(_) | AppError::RequestTimeout(_) | AppError::UpstreamFailed(_)
            ) {
                state.metrics.inc_ml_errors();
            }
            if let Err(mark_err) =
                images::mark_status(&state.db, &image.id, ProcessingStatus::Failed, Some(&err.to_string())).await
            {
                tracing::error!(image_id = %image.id, "Failed to mark image as FAILED: {}", mark_err);
            }
            Err(err)
        }
    }
}

/// `POST /ml/predict/{imageId}`.
pub async fn predict_image(state: &AppState, caller: &AuthUser, image_id: &str) -> AppResult<PredictionSummary> {
    let image = get_image_row(&state.db, image_id).await?;
    caller.ensure_owner_or_admin(&image.user_id)?;
    run_prediction(state, &image).await
}

/// Predicts several images concurrently. Unknown ids are skipped; every
/// remaining image must be accessible to the caller.
pub async fn batch_predict(state: &AppState, caller: &AuthUser, ids: &[String]) -> AppResult<BatchResult> {
    validation::validate_id_list("imageIds", ids, MAX_BATCH_PREDICT)?;

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT id, filename, original_name, mimetype, size, path, processed_path, thumbnail_path, original_key, \
            processed_key, thumbnail_key, width, height, processing_status, processing_error, user_id, \
            uploaded_at, updated_at FROM images WHERE id IN (",
    );
    let mut sep = qb.separated(", ");
    for id in ids {
        sep.push_bind(id.trim().to_string());
    }
    sep.push_unseparated(")");
    let found: Vec<ImageRow> = qb.build_query_as().fetch_all(&state.db).await?;

    // Keep request order, drop duplicates
    let mut images: Vec<ImageRow> = Vec::with_capacity(found.len());
    for id in ids {
        if let Some(img) = found.iter().find(|i| i.id == id.trim()) {
            if !images.iter().any(|i| i.id == img.id) {
                images.push(img.clone());
            }
        }
    }
    if images.is_empty() {
        return Err(AppError::NotFound("No valid images found".to_string()));
    }
    if images.iter().any(|img| caller.ensure_owner_or_admin(&img.user_id).is_err()) {
        return Err(AppError::Forbidden("Access denied for some images".to_string()));
    }

    let outcomes = futures::future::join_all(images.iter().map(|img| run_prediction(state, img))).await;
    let results: Vec<BatchItem> = images
        .iter()
        .zip(outcomes)
        .map(|(img, outcome)| match outcome {
            Ok(data) => BatchItem { image_id: img.id.clone(), status: BatchStatus::Fulfilled, data: Some(data), error: None },
            Err(e) => BatchItem {
                image_id: img.id.clone(),
                status: BatchStatus::Rejected,
                data: None,
                error: Some(e.client_message()),
            },
        })
        .collect();

    let successful = results.iter().filter(|r| matches!(r.status, BatchStatus::Fulfilled)).count();
    Ok(BatchResult { total: results.len(), successful, failed: results.len() - successful, results })
}
