//! Client for the external disease-prediction service.
//!
//! The service exposes `GET /health`, `GET /models/info` and a multipart
//! `POST /predict` taking an `image` field.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::MlConfig;

#[derive(Debug, Error)]
pub enum MlError {
    /// Health check failed before a prediction was attempted.
    #[error("ML service is unavailable")]
    Unavailable,
    #[error("ML service is not running: {0}")]
    NotRunning(String),
    #[error("ML service timed out")]
    Timeout,
    /// The service answered with `success: false` or a non-2xx status.
    #[error("prediction failed: {0}")]
    PredictionFailed(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for MlError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            MlError::Timeout
        } else if err.is_connect() {
            MlError::NotRunning(err.to_string())
        } else if err.is_decode() {
            MlError::InvalidResponse(err.to_string())
        } else {
            MlError::Transport(err.to_string())
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone)]
pub struct MlHealth {
    pub status: Option<String>,
    pub timestamp: Option<String>,
    pub raw: Value,
}

/// A parsed answer from `POST /predict`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionOutcome {
    pub label: String,
    pub confidence: f64,
    pub is_healthy: bool,
    pub treatment: Option<Value>,
    pub processing_time_seconds: Option<f64>,
    pub image_info: Option<Value>,
    pub timestamp: Option<String>,
    #[serde(skip)]
    pub raw: Value,
}

impl PredictionOutcome {
    /// Treatment as stored in the database: strings verbatim, anything else as JSON.
    pub fn treatment_text(&self) -> Option<String> {
        match &self.treatment {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default)]
    success: bool,
    prediction: Option<RawPrediction>,
    treatment: Option<Value>,
    processing_time_seconds: Option<f64>,
    image_info: Option<Value>,
    timestamp: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct RawPrediction {
    disease: Option<String>,
    class: Option<String>,
    confidence: f64,
    is_healthy: Option<bool>,
}

/// Parses and validates a prediction response body.
pub fn parse_prediction(body: Value) -> Result<PredictionOutcome, MlError> {
    let resp: PredictResponse =
        serde_json::from_value(body.clone()).map_err(|e| MlError::InvalidResponse(e.to_string()))?;

    if !resp.success {
        return Err(MlError::PredictionFailed(
            resp.error.unwrap_or_else(|| "service reported success=false".to_string()),
        ));
    }
    let pred = resp
        .prediction
        .ok_or_else(|| MlError::InvalidResponse("missing prediction".to_string()))?;
    let label = pred
        .disease
        .or(pred.class)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| MlError::InvalidResponse("missing predicted label".to_string()))?;
    if !pred.confidence.is_finite() || !(0.0..=1.0).contains(&pred.confidence) {
        return Err(MlError::InvalidResponse(format!("confidence out of range: {}", pred.confidence)));
    }
    let is_healthy = pred.is_healthy.unwrap_or_else(|| label.to_lowercase().contains("healthy"));

    Ok(PredictionOutcome {
        label,
        confidence: pred.confidence,
        is_healthy,
        treatment: resp.treatment,
        processing_time_seconds: resp.processing_time_seconds,
        image_info: resp.image_info,
        timestamp: resp.timestamp,
        raw: body,
    })
}

#[async_trait]
pub trait PredictionClient: Send + Sync {
    fn service_url(&self) -> &str;

    async fn health(&self) -> Result<MlHealth, MlError>;

    async fn model_info(&self) -> Result<Value, MlError>;

    async fn predict(&self, image: Vec<u8>, filename: &str) -> Result<PredictionOutcome, MlError>;
}

/// `PredictionClient` over HTTP.
pub struct HttpPredictionClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    health_timeout: Duration,
}

impl HttpPredictionClient {
    pub fn new(cfg: &MlConfig) -> Result<Self, MlError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(cfg.health_timeout_ms))
            .build()
            .map_err(|e| MlError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: cfg.service_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_millis(cfg.timeout_ms),
            health_timeout: Duration::from_millis(cfg.health_timeout_ms),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json(&self, path: &str) -> Result<Value, MlError> {
        let resp = self.http.get(self.url(path)).timeout(self.health_timeout).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(MlError::Transport(format!("GET {} returned {}", path, status)));
        }
        Ok(resp.json::<Value>().await?)
    }
}

#[async_trait]
impl PredictionClient for HttpPredictionClient {
    fn service_url(&self) -> &str {
        &self.base_url
    }

    async fn health(&self) -> Result<MlHealth, MlError> {
        let raw = self.get_json("/health").await?;
        Ok(MlHealth {
            status: raw.get("status").and_then(Value::as_str).map(str::to_string),
            timestamp: raw.get("timestamp").and_then(Value::as_str).map(str::to_string),
            raw,
        })
    }

    async fn model_info(&self) -> Result<Value, MlError> {
        self.get_json("/models/info").await
    }

    async fn predict(&self, image: Vec<u8>, filename: &str) -> Result<PredictionOutcome, MlError> {
        let part = Part::bytes(image)
            .file_name(filename.to_string())
            .mime_str("image/jpeg")
            .map_err(|e| MlError::Transport(e.to_string()))?;
        let form = Form::new().part("image", part);

        let started = std::time::Instant::now();
        let resp = self.http.post(self.url("/predict")).multipart(form).timeout(self.timeout).send().await?;
        let status = resp.status();
        let body: Value = resp.json().await?;
        tracing::debug!(
            status = %status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ML service answered prediction request"
        );
        if !status.is_success() {
            let detail = body
                .get("error")
                .or_else(|| body.get("detail"))
                .map(|v| v.to_string())
                .unwrap_or_else(|| status.to_string());
            return Err(MlError::PredictionFailed(detail));
        }
        parse_prediction(body)
    }
}
