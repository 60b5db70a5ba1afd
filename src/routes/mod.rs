//! HTTP route handlers for the cropdoc API.
//!
//! Each sub-module owns one `/api/v1` prefix:
//!
//! - `auth`: registration, login, tokens and the caller's own account
//! - `users`: admin user management (status, soft delete)
//! - `admins`: admin directory and profile
//! - `farmers`: farmer directory and profile
//! - `images`: upload pipeline, listing, serving and deletion
//! - `ml`: prediction delegation to the ML service
//! - `diseases`: disease catalog and detection history
//! - `health`: unversioned probes, metrics and version info

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method, StatusCode, Uri},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::{config::AppConfig, middleware, state::AppState};

pub mod admins;
pub mod auth;
pub mod diseases;
pub mod farmers;
pub mod health;
pub mod images;
pub mod ml;
pub mod users;

pub const API_PREFIX: &str = "/api/v1";

fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/user", users::router())
        .nest("/admin", admins::router())
        .nest("/farmer", farmers::router())
        .nest("/image", images::router())
        .nest("/ml", ml::router())
        .nest("/diseases", diseases::router())
}

async fn not_found(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "message": "API not found!",
            "error": {
                "path": uri.path(),
                "message": "Your requested path not found!",
            },
        })),
    )
}

fn cors_layer(cfg: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> =
        cfg.server.allowed_origins.iter().filter_map(|o| HeaderValue::from_str(o.trim()).ok()).collect();
    if origins.is_empty() {
        // Permissive only for local development builds
        return if cfg!(debug_assertions) { CorsLayer::permissive() } else { CorsLayer::new() };
    }
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
}

/// Builds the full application: API routes, probes, static uploads and
/// the middleware stack.
pub fn build_router(state: AppState) -> Router {
    let cfg = state.config.clone();

    let mut app = Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .route("/readyz", get(health::readyz))
        .route("/metrics", get(health::metrics))
        .route("/metrics/prometheus", get(health::metrics_prometheus))
        .route("/version", get(health::version))
        .nest(API_PREFIX, api_router())
        .fallback(not_found);

    if cfg.storage.backend == "local" {
        app = app.nest_service("/uploads", ServeDir::new(&cfg.storage.local_dir));
    }

    app.with_state(state.clone())
        .layer(DefaultBodyLimit::max(cfg.server.max_body_bytes))
        .layer(from_fn_with_state(cfg.clone(), middleware::validation::validate_request_middleware))
        .layer(from_fn_with_state(state, middleware::rate_limit::rate_limit_middleware))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(cfg.clone(), middleware::security_headers::security_headers_middleware))
        .layer(cors_layer(&cfg))
}
