//! Shared harness: a fresh SQLite file per test, the in-memory image store
//! and a scriptable ML service.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tempfile::NamedTempFile;
use tower::ServiceExt;

use crate::config::AppConfig;
use crate::ml::{MlError, MlHealth, PredictionClient, PredictionOutcome};
use crate::models::AdminProfileInput;
use crate::services::users::{self, NewAccount};
use crate::state::AppState;
use crate::storage::MemoryImageStore;

pub const PASSWORD: &str = "secret123";
pub const BOUNDARY: &str = "cropdoc-test-boundary";

/// Stand-in for the prediction service.
pub struct MockPredictionClient {
    pub healthy: AtomicBool,
    pub fail_predict: AtomicBool,
    pub label: Mutex<String>,
    pub is_healthy_label: AtomicBool,
    pub predict_calls: AtomicUsize,
}

impl MockPredictionClient {
    pub fn new() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            fail_predict: AtomicBool::new(false),
            label: Mutex::new("Leaf Spot Disease".to_string()),
            is_healthy_label: AtomicBool::new(false),
            predict_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_label(&self, label: &str, healthy: bool) {
        *self.label.lock().unwrap() = label.to_string();
        self.is_healthy_label.store(healthy, Ordering::SeqCst);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

#[async_trait]
impl PredictionClient for MockPredictionClient {
    fn service_url(&self) -> &str {
        "http://ml.invalid"
    }

    async fn health(&self) -> Result<MlHealth, MlError> {
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(MlError::NotRunning("connection refused".to_string()));
        }
        Ok(MlHealth {
            status: Some("healthy".to_string()),
            timestamp: Some("2026-01-01T00:00:00Z".to_string()),
            raw: json!({ "status": "healthy" }),
        })
    }

    async fn model_info(&self) -> Result<Value, MlError> {
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(MlError::NotRunning("connection refused".to_string()));
        }
        Ok(json!({ "model": "mock-resnet", "classes": 6 }))
    }

    async fn predict(&self, image: Vec<u8>, _filename: &str) -> Result<PredictionOutcome, MlError> {
        self.predict_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_predict.load(Ordering::SeqCst) {
            return Err(MlError::PredictionFailed("model crashed".to_string()));
        }
        let label = self.label.lock().unwrap().clone();
        let raw = json!({ "success": true, "prediction": { "disease": label, "confidence": 0.91 } });
        Ok(PredictionOutcome {
            label,
            confidence: 0.91,
            is_healthy: self.is_healthy_label.load(Ordering::SeqCst),
            treatment: Some(json!("Apply copper-based fungicide")),
            processing_time_seconds: Some(0.2),
            image_info: Some(json!({ "bytes": image.len() })),
            timestamp: None,
            raw,
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: MemoryImageStore,
    pub ml: Arc<MockPredictionClient>,
    _db_file: NamedTempFile,
}

pub fn test_config(db_url: &str) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.database.url = db_url.to_string();
    cfg.storage.backend = "memory".to_string();
    cfg.ml.predict_on_upload = false;
    cfg.rate_limit.max_requests = 10_000;
    cfg.rate_limit.login_max_requests = 10_000;
    cfg.rate_limit.register_max_requests = 10_000;
    cfg
}

pub async fn spawn_app_with(configure: impl FnOnce(&mut AppConfig)) -> TestApp {
    let db_file = NamedTempFile::new().unwrap();
    let db_url = format!("sqlite://{}", db_file.path().display());
    let options = SqliteConnectOptions::from_str(&db_url).unwrap().create_if_missing(true).foreign_keys(true);
    let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await.unwrap();
    crate::db::init_db(&pool).await.unwrap();
    crate::seed::seed_diseases(&pool).await.unwrap();

    let mut cfg = test_config(&db_url);
    configure(&mut cfg);

    let store = MemoryImageStore::new();
    let ml = Arc::new(MockPredictionClient::new());
    let state = AppState::new(pool, cfg, Arc::new(store.clone()), ml.clone());
    let router = crate::routes::build_router(state.clone());

    TestApp { router, state, store, ml, _db_file: db_file }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

pub fn json_request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Multipart body with a single `image` field.
pub fn upload_request(token: &str, filename: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"image\"; filename=\"{}\"\r\n", filename).as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/api/v1/image/upload")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(body))
        .unwrap()
}

impl TestApp {
    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let res = self.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
        (status, body)
    }

    pub async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        self.send(json_request(method, uri, token, body)).await
    }

    pub async fn register_farmer(&self, email: &str) -> Value {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/v1/auth/register/farmer",
                None,
                Some(json!({
                    "email": email,
                    "password": PASSWORD,
                    "name": "Karim",
                    "phone": "01712345678",
                    "farmerProfile": {
                        "cropTypes": ["Rice", "Potato"],
                        "farmSize": 2.5,
                        "farmingExperience": 7,
                        "soilType": "loamy",
                        "irrigationType": "drip"
                    }
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        body["data"].clone()
    }

    pub async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.call(Method::POST, "/api/v1/auth/login", None, Some(json!({ "email": email, "password": password })))
            .await
    }

    pub async fn token_for(&self, email: &str) -> String {
        let (status, body) = self.login(email, PASSWORD).await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["data"]["accessToken"].as_str().unwrap().to_string()
    }

    /// Registers a farmer and signs in. Returns `(user_id, access_token)`.
    pub async fn farmer(&self, email: &str) -> (String, String) {
        let user = self.register_farmer(email).await;
        let id = user["id"].as_str().unwrap().to_string();
        (id, self.token_for(email).await)
    }

    /// Creates an admin directly through the service layer and signs in.
    pub async fn admin(&self, email: &str) -> (String, String) {
        let account = NewAccount {
            email: email.to_string(),
            password: PASSWORD.to_string(),
            name: "Admin".to_string(),
            phone: None,
            address: None,
            photo: None,
        };
        let profile = AdminProfileInput { department: Some("Agronomy".into()), designation: Some("Officer".into()) };
        let admin = users::register_admin(&self.state.db, account, profile, false).await.unwrap();
        (admin.user.id.clone(), self.token_for(email).await)
    }

    /// Uploads a generated PNG and returns the `data` object.
    pub async fn upload_png(&self, token: &str) -> Value {
        let png = crate::imaging::sample_png(64, 48);
        let (status, body) = self.send(upload_request(token, "leaf.png", "image/png", &png)).await;
        assert_eq!(status, StatusCode::CREATED, "upload failed: {}", body);
        body["data"].clone()
    }
}
