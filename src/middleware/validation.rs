use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

/// Rejects requests with traversal sequences in the path and bodies whose
/// declared `Content-Length` exceeds `server.max_body_bytes`.
///
/// `DefaultBodyLimit` still guards streamed bodies; this only answers early.
pub async fn validate_request_middleware(
    State(cfg): State<Arc<AppConfig>>,
    req: Request,
    next: Next,
) -> Response {
    if contains_path_traversal(req.uri().path()) {
        return AppError::BadRequest("Path traversal detected in request".to_string()).into_response();
    }

    if matches!(*req.method(), Method::POST | Method::PUT | Method::PATCH) {
        let declared = req
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if let Some(length) = declared {
            let max = cfg.server.max_body_bytes;
            if length > max {
                return AppError::PayloadTooLarge(format!("Request body exceeds maximum size of {} bytes", max))
                    .into_response();
            }
        }
    }

    next.run(req).await
}

fn contains_path_traversal(path: &str) -> bool {
    let lower = path.to_lowercase();

    if path.contains("/..") || path.contains("\\..") || path.starts_with("..") {
        return true;
    }
    if path.contains("/./") || path.contains("....") {
        return true;
    }

    const ENCODED: &[&str] = &["%2e%2e", "%252e%252e", "%2e/", "/%2e", "%2f%2e", "%5c%2e", "%00"];
    if ENCODED.iter().any(|p| lower.contains(p)) {
        return true;
    }

    path.contains('\0')
}

/// Parses a path or body id, reporting the offending field.
pub fn validate_uuid(field: &str, id: &str) -> AppResult<Uuid> {
    Uuid::parse_str(id.trim()).map_err(|_| AppError::ValidationError {
        field: field.to_string(),
        message: format!("Invalid {} format", field),
    })
}
