use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;

use crate::{
    auth::{AuthUser, RequireAdmin, RequireMember},
    error::{AppError, AppResult},
    extract::{AppJson, AppPath, AppQuery},
    imaging::MAX_UPLOAD_BYTES,
    models::{ImageDto, ImageStats},
    response::ApiResponse,
    services::images::{self, BulkDeleteResult, ImageListQuery, UploadedFile, UploadedImage},
    state::AppState,
    storage::ImageVariant,
};

/// Multipart framing on top of the largest accepted file.
const UPLOAD_BODY_LIMIT: usize = MAX_UPLOAD_BYTES + 1024 * 1024;

const SERVE_CACHE_CONTROL: &str = "public, max-age=31536000";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)))
        .route("/", get(list_images).delete(bulk_delete))
        .route("/my-images", get(my_images))
        .route("/stats", get(stats))
        .route("/{id}", get(get_image).delete(delete_image))
        .route("/{id}/serve", get(serve_original))
        .route("/{id}/serve/{variant}", get(serve))
        .route("/{id}/download", get(download_original))
        .route("/{id}/download/{variant}", get(download))
        .route("/{id}/reprocess", post(reprocess))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDeleteRequest {
    pub image_ids: Vec<String>,
}

fn parse_variant(raw: &str) -> AppResult<ImageVariant> {
    ImageVariant::parse(raw).ok_or_else(|| AppError::ValidationError {
        field: "type".to_string(),
        message: "Image type must be one of original, processed, thumbnail".to_string(),
    })
}

/// Keeps printable ASCII only, so the name is safe inside a quoted header value.
fn attachment_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' { c } else { '_' })
        .collect();
    if cleaned.trim().is_empty() {
        "image".to_string()
    } else {
        cleaned
    }
}

async fn read_image_field(mut multipart: Multipart) -> AppResult<UploadedFile> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            continue;
        }
        let original_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
        let bytes = field.bytes().await?;
        return Ok(UploadedFile { original_name, content_type, bytes: bytes.to_vec() });
    }
    Err(AppError::BadRequest("No image file provided".to_string()))
}

pub async fn upload(
    State(state): State<AppState>,
    RequireMember(caller): RequireMember,
    multipart: Multipart,
) -> AppResult<ApiResponse<UploadedImage>> {
    let file = read_image_field(multipart).await?;
    let uploaded = images::upload(&state, &caller, file).await?;
    Ok(ApiResponse::created("Image uploaded successfully", uploaded))
}

pub async fn list_images(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    AppQuery(query): AppQuery<ImageListQuery>,
) -> AppResult<ApiResponse<Vec<ImageDto>>> {
    let (items, meta) = images::list_images(&state.db, &query, None).await?;
    Ok(ApiResponse::paged("Images retrieved successfully", items, meta))
}

pub async fn my_images(
    State(state): State<AppState>,
    RequireMember(caller): RequireMember,
    AppQuery(query): AppQuery<ImageListQuery>,
) -> AppResult<ApiResponse<Vec<ImageDto>>> {
    let (items, meta) = images::list_images(&state.db, &query, Some(&caller.user_id)).await?;
    Ok(ApiResponse::paged("User images retrieved successfully", items, meta))
}

pub async fn stats(
    State(state): State<AppState>,
    RequireMember(caller): RequireMember,
) -> AppResult<ApiResponse<ImageStats>> {
    let owner = if caller.is_admin() { None } else { Some(caller.user_id.as_str()) };
    let stats = images::image_stats(&state.db, owner).await?;
    Ok(ApiResponse::ok("Image statistics retrieved successfully", stats))
}

pub async fn get_image(
    State(state): State<AppState>,
    RequireMember(caller): RequireMember,
    AppPath(id): AppPath<String>,
) -> AppResult<ApiResponse<ImageDto>> {
    let image = images::get_image(&state.db, &id, &caller).await?;
    Ok(ApiResponse::ok("Image retrieved successfully", image))
}

async fn redirect_to_variant(
    state: &AppState,
    caller: &AuthUser,
    id: &str,
    variant: ImageVariant,
) -> AppResult<Response> {
    let url = images::variant_url(&state.db, id, variant, caller).await?;
    let mut res = Redirect::temporary(&url).into_response();
    res.headers_mut().insert(header::CACHE_CONTROL, HeaderValue::from_static(SERVE_CACHE_CONTROL));
    Ok(res)
}

pub async fn serve_original(
    State(state): State<AppState>,
    RequireMember(caller): RequireMember,
    AppPath(id): AppPath<String>,
) -> AppResult<Response> {
    redirect_to_variant(&state, &caller, &id, ImageVariant::Original).await
}

pub async fn serve(
    State(state): State<AppState>,
    RequireMember(caller): RequireMember,
    AppPath((id, variant)): AppPath<(String, String)>,
) -> AppResult<Response> {
    redirect_to_variant(&state, &caller, &id, parse_variant(&variant)?).await
}

async fn send_download(
    state: &AppState,
    caller: &AuthUser,
    id: &str,
    variant: ImageVariant,
) -> AppResult<Response> {
    let file = images::download(state, id, variant, caller).await?;
    let disposition = format!("attachment; filename=\"{}\"", attachment_name(&file.filename));
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid Content-Disposition: {}", e)))?;
    let content_type = HeaderValue::from_str(&file.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    Ok((
        [(header::CONTENT_TYPE, content_type), (header::CONTENT_DISPOSITION, disposition)],
        file.bytes,
    )
        .into_response())
}

pub async fn download_original(
    State(state): State<AppState>,
    RequireMember(caller): RequireMember,
    AppPath(id): AppPath<String>,
) -> AppResult<Response> {
    send_download(&state, &caller, &id, ImageVariant::Original).await
}

pub async fn download(
    State(state): State<AppState>,
    RequireMember(caller): RequireMember,
    AppPath((id, variant)): AppPath<(String, String)>,
) -> AppResult<Response> {
    send_download(&state, &caller, &id, parse_variant(&variant)?).await
}

pub async fn reprocess(
    State(state): State<AppState>,
    RequireAdmin(caller): RequireAdmin,
    AppPath(id): AppPath<String>,
) -> AppResult<ApiResponse<ImageDto>> {
    tracing::info!(admin_id = %caller.user_id, image_id = %id, "Reprocess requested");
    let image = images::reprocess(&state, &id).await?;
    Ok(ApiResponse::ok("Image reprocessed successfully", image))
}

pub async fn delete_image(
    State(state): State<AppState>,
    RequireMember(caller): RequireMember,
    AppPath(id): AppPath<String>,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let deleted = images::delete_image(&state, &id, &caller).await?;
    Ok(ApiResponse::ok("Image deleted successfully", serde_json::json!({ "id": deleted })))
}

pub async fn bulk_delete(
    State(state): State<AppState>,
    RequireMember(caller): RequireMember,
    AppJson(req): AppJson<BulkDeleteRequest>,
) -> AppResult<ApiResponse<BulkDeleteResult>> {
    let result = images::bulk_delete(&state, &req.image_ids, &caller).await?;
    Ok(ApiResponse::ok("Images deleted successfully", result))
}
