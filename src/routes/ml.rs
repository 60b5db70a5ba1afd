use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    auth::RequireMember,
    error::AppResult,
    extract::{AppJson, AppPath},
    models::PredictionSummary,
    response::ApiResponse,
    services::predictions::{self, BatchResult, MlHealthReport},
    state::AppState,
};

/// Prediction delegation. Every route accepts admins and farmers.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/info", get(info))
        .route("/predict/{image_id}", post(predict))
        .route("/batch-predict", post(batch_predict))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPredictRequest {
    pub image_ids: Vec<String>,
}

/// Always 200; `success` mirrors the service's health.
pub async fn health(State(state): State<AppState>, RequireMember(_): RequireMember) -> ApiResponse<MlHealthReport> {
    let report = predictions::health(&state).await;
    let healthy = report.is_healthy;
    let message = if healthy { "ML service is healthy" } else { "ML service is not available" };
    ApiResponse::with_status(StatusCode::OK, message, Some(report)).success(healthy)
}

pub async fn info(State(state): State<AppState>, RequireMember(_): RequireMember) -> ApiResponse<Value> {
    let info = predictions::service_info(&state).await;
    ApiResponse::ok("ML service information retrieved successfully", info)
}

pub async fn predict(
    State(state): State<AppState>,
    RequireMember(caller): RequireMember,
    AppPath(image_id): AppPath<String>,
) -> AppResult<ApiResponse<PredictionSummary>> {
    let summary = predictions::predict_image(&state, &caller, &image_id).await?;
    Ok(ApiResponse::ok("Disease prediction completed successfully", summary))
}

pub async fn batch_predict(
    State(state): State<AppState>,
    RequireMember(caller): RequireMember,
    AppJson(req): AppJson<BatchPredictRequest>,
) -> AppResult<ApiResponse<BatchResult>> {
    let result = predictions::batch_predict(&state, &caller, &req.image_ids).await?;
    tracing::info!(
        user_id = %caller.user_id,
        total = result.total,
        successful = result.successful,
        "Batch prediction finished"
    );
    Ok(ApiResponse::ok("Batch prediction completed", result))
}
