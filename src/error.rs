use axum::{
    extract::{
        multipart::MultipartError,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::error::Error;
use std::fmt;

use crate::ml::MlError;
use crate::storage::StorageError;

/// The primary error type for the application.
///
/// Operational errors carry a status and a client-facing message. Anything
/// unexpected goes through `Internal` and is reported generically.
#[derive(Debug)]
pub enum AppError {
    /// For internal server errors that are not expected to be handled by the client.
    Internal(anyhow::Error),
    /// For client errors due to invalid requests.
    BadRequest(String),
    /// For when a request is not authenticated.
    Unauthorized(String),
    /// For when an authenticated caller lacks permission.
    Forbidden(String),
    /// For when a requested resource is not found.
    NotFound(String),
    /// For when a specific field in a request fails validation.
    ValidationError {
        /// The name of the field that failed validation.
        field: String,
        /// A message describing the validation error.
        message: String,
    },
    /// For constraint violations reported by the database.
    Constraint {
        message: String,
        field: Option<String>,
    },
    PayloadTooLarge(String),
    RequestTimeout(String),
    /// For when a service is temporarily unavailable.
    ServiceUnavailable(String),
    /// An upstream dependency answered, but not usefully.
    UpstreamFailed(String),
    /// For errors related to database operations.
    Database(String),
    /// For errors talking to the object store.
    Storage(String),
    /// For when a client has sent too many requests in a given amount of time.
    RateLimited {
        /// The number of seconds to wait before retrying the request.
        retry_after_seconds: u64,
    },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(e) => write!(f, "Internal error: {}", e),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ValidationError { field, message } => {
                write!(f, "Validation error on field '{}': {}", field, message)
            }
            AppError::Constraint { message, .. } => write!(f, "Constraint violation: {}", message),
            AppError::PayloadTooLarge(msg) => write!(f, "Payload too large: {}", msg),
            AppError::RequestTimeout(msg) => write!(f, "Request timeout: {}", msg),
            AppError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            AppError::UpstreamFailed(msg) => write!(f, "Upstream failure: {}", msg),
            AppError::Database(msg) => write!(f, "Database error: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::RateLimited { retry_after_seconds } => {
                write!(f, "Rate limited. Retry after {} seconds", retry_after_seconds)
            }
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Internal(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Internal(_) | AppError::Database(_) | AppError::Storage(_) | AppError::UpstreamFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::BadRequest(_) | AppError::ValidationError { .. } | AppError::Constraint { .. } => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RequestTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// The message a client sees in the envelope, without the variant prefix `Display` adds.
    pub fn client_message(&self) -> String {
        match self {
            AppError::Internal(_) => "Internal Server Error".to_string(),
            AppError::Database(_) => "Database operation failed".to_string(),
            AppError::Storage(_) => "Image storage operation failed".to_string(),
            AppError::RateLimited { retry_after_seconds } => {
                format!("Too many requests. Please retry after {} seconds", retry_after_seconds)
            }
            AppError::BadRequest(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::PayloadTooLarge(msg)
            | AppError::RequestTimeout(msg)
            | AppError::ServiceUnavailable(msg)
            | AppError::UpstreamFailed(msg) => msg.clone(),
            AppError::ValidationError { message, .. } | AppError::Constraint { message, .. } => message.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_code, error_message, details) = match self {
            AppError::Internal(e) => {
                let error_id = uuid::Uuid::new_v4();
                tracing::error!(error_id = %error_id, "Internal error: {:?}", e);
                (
                    "INTERNAL_ERROR",
                    "Internal Server Error".to_string(),
                    Some(json!({ "error_id": error_id.to_string() })),
                )
            }
            AppError::BadRequest(msg) => ("BAD_REQUEST", msg, None),
            AppError::Unauthorized(msg) => ("UNAUTHORIZED", msg, None),
            AppError::Forbidden(msg) => ("FORBIDDEN", msg, None),
            AppError::NotFound(msg) => ("NOT_FOUND", msg, None),
            AppError::ValidationError { field, message } => (
                "VALIDATION_ERROR",
                message.clone(),
                Some(json!({ "field": field, "message": message })),
            ),
            AppError::Constraint { message, field } => {
                ("CONSTRAINT_VIOLATION", message, field.map(|f| json!({ "field": f })))
            }
            AppError::PayloadTooLarge(msg) => ("PAYLOAD_TOO_LARGE", msg, None),
            AppError::RequestTimeout(msg) => ("REQUEST_TIMEOUT", msg, None),
            AppError::ServiceUnavailable(msg) => ("SERVICE_UNAVAILABLE", msg, None),
            AppError::UpstreamFailed(msg) => {
                tracing::warn!("Upstream failure: {}", msg);
                ("UPSTREAM_FAILED", msg, None)
            }
            AppError::Database(msg) => {
                tracing::error!("Database error: {}", msg);
                ("DATABASE_ERROR", "Database operation failed".to_string(), None)
            }
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {}", msg);
                ("STORAGE_ERROR", "Image storage operation failed".to_string(), None)
            }
            AppError::RateLimited { retry_after_seconds } => (
                "RATE_LIMITED",
                format!("Too many requests. Please retry after {} seconds", retry_after_seconds),
                Some(json!({ "retry_after_seconds": retry_after_seconds })),
            ),
        };

        let mut body = json!({
            "success": false,
            "statusCode": status.as_u16(),
            "message": error_message,
            "error": {
                "code": error_code,
            },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        if let Some(details) = details {
            body["error"]["details"] = details;
        }

        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    // SQLite reports "UNIQUE constraint failed: users.email"
                    let field = db_err
                        .message()
                        .rsplit_once(": ")
                        .map(|(_, target)| target.to_string());
                    AppError::Constraint { message: "Duplicate entry found".to_string(), field }
                } else if db_err.is_foreign_key_violation() {
                    AppError::Constraint { message: "Foreign key constraint failed".to_string(), field: None }
                } else {
                    AppError::Database(db_err.message().to_string())
                }
            }
            sqlx::Error::PoolTimedOut => {
                AppError::ServiceUnavailable("Database connection pool timed out".to_string())
            }
            _ => AppError::Database(err.to_string()),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                AppError::Unauthorized("Your token has expired. Please log in again".to_string())
            }
            _ => AppError::Unauthorized("Invalid token. Please log in again".to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(anyhow::Error::new(err))
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Decoding(_) | image::ImageError::Unsupported(_) => {
                AppError::BadRequest(format!("Unreadable image: {}", err))
            }
            other => AppError::Internal(anyhow::anyhow!("image processing failed: {}", other)),
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        let status = err.status();
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge("File too large".to_string())
        } else {
            AppError::BadRequest(format!("Invalid multipart body: {}", err.body_text()))
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return AppError::PayloadTooLarge("Request body too large".to_string());
        }
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(format!("Stored object not found: {}", key)),
            StorageError::InvalidKey(key) => AppError::BadRequest(format!("Invalid storage key: {}", key)),
            other => AppError::Storage(other.to_string()),
        }
    }
}

impl From<MlError> for AppError {
    fn from(err: MlError) -> Self {
        match err {
            MlError::Unavailable => {
                AppError::ServiceUnavailable("ML prediction service is currently unavailable".to_string())
            }
            MlError::NotRunning(_) => {
                AppError::ServiceUnavailable("ML prediction service is not running".to_string())
            }
            MlError::Timeout => AppError::RequestTimeout("ML prediction service timeout".to_string()),
            MlError::PredictionFailed(msg) => {
                tracing::warn!("ML prediction rejected: {}", msg);
                AppError::UpstreamFailed("ML prediction failed".to_string())
            }
            MlError::Transport(msg) | MlError::InvalidResponse(msg) => {
                tracing::warn!("ML service error: {}", msg);
                AppError::UpstreamFailed("Failed to get disease prediction".to_string())
            }
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        MlError::from(err).into()
    }
}

/// A type alias for `Result<T, AppError>`, used throughout the application.
pub type AppResult<T> = Result<T, AppError>;

/// An extension trait for `Option` that provides a convenient way to convert
/// an `Option` to a `Result` with a `NotFound` error.
pub trait OptionExt<T> {
    /// Converts an `Option<T>` to a `Result<T, AppError>`.
    ///
    /// `entity` names what was not found, e.g. "User".
    fn ok_or_not_found(self, entity: &str) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, entity: &str) -> AppResult<T> {
        self.ok_or_else(|| AppError::NotFound(format!("{} not found", entity)))
    }
}

/// Field validators shared by request DTOs.
pub mod validation {
    use super::*;
    use lazy_static::lazy_static;
    use regex::Regex;

    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
                .expect("email regex");
        static ref BD_PHONE_RE: Regex = Regex::new(r"^(\+8801|8801|01)[3-9]\d{8}$").expect("phone regex");
    }

    fn invalid(field: &str, message: impl Into<String>) -> AppError {
        AppError::ValidationError { field: field.to_string(), message: message.into() }
    }

    pub fn validate_email(email: &str) -> AppResult<()> {
        if email.trim().is_empty() {
            return Err(invalid("email", "Email is required"));
        }
        if !EMAIL_RE.is_match(email) {
            return Err(invalid("email", "Invalid email format"));
        }
        Ok(())
    }

    /// Passwords are 6..=50 characters.
    pub fn validate_password(field: &str, password: &str) -> AppResult<()> {
        let len = password.chars().count();
        if len < 6 {
            return Err(invalid(field, "Password must be at least 6 characters"));
        }
        if len > 50 {
            return Err(invalid(field, "Password must be less than 50 characters"));
        }
        Ok(())
    }

    pub fn validate_name(name: &str) -> AppResult<()> {
        let len = name.trim().chars().count();
        if len == 0 {
            return Err(invalid("name", "Name is required"));
        }
        if len > 100 {
            return Err(invalid("name", "Name must be less than 100 characters"));
        }
        Ok(())
    }

    pub fn validate_phone(phone: &str) -> AppResult<()> {
        if !BD_PHONE_RE.is_match(phone) {
            return Err(invalid("phone", "Invalid Bangladesh phone number"));
        }
        Ok(())
    }

    pub fn validate_url(field: &str, url: &str) -> AppResult<()> {
        let rest = url.strip_prefix("https://").or_else(|| url.strip_prefix("http://"));
        match rest {
            Some(host) if !host.is_empty() && !host.starts_with('/') && !url.contains(char::is_whitespace) => Ok(()),
            _ => Err(invalid(field, "Invalid photo URL")),
        }
    }

    /// Validates a list of ids sent in a request body (bulk operations).
    pub fn validate_id_list(field: &str, ids: &[String], max: usize) -> AppResult<()> {
        if ids.is_empty() {
            return Err(invalid(field, "At least one image ID is required"));
        }
        if ids.len() > max {
            return Err(invalid(field, format!("Cannot process more than {} images at once", max)));
        }
        if ids.iter().any(|id| id.trim().is_empty()) {
            return Err(invalid(field, "Image ID cannot be empty"));
        }
        Ok(())
    }

}
