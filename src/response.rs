//! Success envelope shared by every JSON endpoint.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl PageMeta {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let total_pages = if limit > 0 { (total + limit - 1) / limit } else { 0 };
        Self {
            page,
            limit,
            total,
            total_pages,
            has_next_page: page < total_pages,
            has_prev_page: page > 1,
        }
    }
}

/// Validated page/limit pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
}

impl Pagination {
    pub fn from_query(page: Option<i64>, limit: Option<i64>) -> AppResult<Self> {
        let page = page.unwrap_or(DEFAULT_PAGE);
        let limit = limit.unwrap_or(DEFAULT_LIMIT);
        if page < 1 {
            return Err(AppError::ValidationError {
                field: "page".into(),
                message: "Page must be a positive number".into(),
            });
        }
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(AppError::ValidationError {
                field: "limit".into(),
                message: format!("Limit must be between 1 and {}", MAX_LIMIT),
            });
        }
        // The offset is bound as an i64
        if (page - 1).checked_mul(limit).is_none() {
            return Err(AppError::ValidationError {
                field: "page".into(),
                message: "Page is out of range".into(),
            });
        }
        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }

    pub fn meta(&self, total: i64) -> PageMeta {
        PageMeta::new(self.page, self.limit, total)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub status_code: u16,
    pub message: String,
    pub data: Option<T>,
    pub meta: Option<PageMeta>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self::with_status(StatusCode::OK, message, Some(data))
    }

    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self::with_status(StatusCode::CREATED, message, Some(data))
    }

    pub fn paged(message: impl Into<String>, data: T, meta: PageMeta) -> Self {
        let mut resp = Self::ok(message, data);
        resp.meta = Some(meta);
        resp
    }

    pub fn with_status(status: StatusCode, message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            success: status.is_success(),
            status_code: status.as_u16(),
            message: message.into(),
            data,
            meta: None,
        }
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::OK, message, None)
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(PageMeta::new(1, 10, 0).total_pages, 0);
        assert_eq!(PageMeta::new(1, 10, 1).total_pages, 1);
        assert_eq!(PageMeta::new(1, 10, 10).total_pages, 1);
        assert_eq!(PageMeta::new(1, 10, 11).total_pages, 2);
        assert_eq!(PageMeta::new(1, 3, 100).total_pages, 34);
    }

    #[test]
    fn next_and_prev_flags() {
        let first = PageMeta::new(1, 10, 25);
        assert!(first.has_next_page);
        assert!(!first.has_prev_page);

        let last = PageMeta::new(3, 10, 25);
        assert!(!last.has_next_page);
        assert!(last.has_prev_page);

        let beyond = PageMeta::new(5, 10, 25);
        assert!(!beyond.has_next_page);
    }

    #[test]
    fn pagination_defaults_and_offset() {
        let p = Pagination::from_query(None, None).unwrap();
        assert_eq!((p.page, p.limit), (1, 10));
        assert_eq!(p.offset(), 0);
        let p = Pagination::from_query(Some(3), Some(20)).unwrap();
        assert_eq!(p.offset(), 40);
    }

    #[test]
    fn pagination_rejects_out_of_range() {
        assert!(Pagination::from_query(Some(0), None).is_err());
        assert!(Pagination::from_query(None, Some(0)).is_err());
        assert!(Pagination::from_query(None, Some(101)).is_err());
        assert!(Pagination::from_query(None, Some(100)).is_ok());
        assert!(Pagination::from_query(Some(i64::MAX), Some(2)).is_err());
        assert!(Pagination::from_query(Some(i64::MAX), Some(1)).is_ok());
    }

    #[test]
    fn envelope_serializes_camel_case() {
        let resp = ApiResponse::paged("ok", vec![1, 2], PageMeta::new(1, 2, 2));
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["statusCode"], 200);
        assert_eq!(v["success"], true);
        assert_eq!(v["meta"]["totalPages"], 1);
        assert_eq!(v["meta"]["hasNextPage"], false);
    }
}
