use super::ip::extract_ip_from_headers;
use axum::{
    extract::{connect_info::ConnectInfo, Request, State},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

use crate::error::AppError;
use crate::state::AppState;

/// Paths that never count against the limit (probes).
const EXEMPT_PATHS: &[&str] = &["/health", "/readyz"];

/// A thread-safe rate limiter based on the sliding window algorithm.
#[derive(Clone)]
pub struct RateLimiter {
    requests: Arc<RwLock<HashMap<IpAddr, Vec<Instant>>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    /// Creates a new `RateLimiter`.
    ///
    /// # Arguments
    ///
    /// * `max_requests` - The maximum number of requests allowed within the time window.
    /// * `window_seconds` - The duration of the time window in seconds.
    pub fn new(max_requests: usize, window_seconds: u64) -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window: Duration::from_secs(window_seconds),
        }
    }

    /// Records a request from `ip` if it fits in the window.
    ///
    /// On rejection returns the number of seconds until the oldest request
    /// leaves the window (at least 1).
    pub async fn check_rate_limit(&self, ip: IpAddr) -> Result<(), u64> {
        let now = Instant::now();
        let mut requests = self.requests.write().await;
        let timestamps = requests.entry(ip).or_default();

        // On clock skew keep the timestamp
        timestamps.retain(|&t| now.checked_duration_since(t).map(|d| d < self.window).unwrap_or(true));

        if timestamps.len() >= self.max_requests {
            let oldest = timestamps.first().copied().unwrap_or(now);
            let retry_after = match now.checked_duration_since(oldest) {
                Some(elapsed) => self.window.saturating_sub(elapsed),
                None => Duration::from_secs(1),
            };
            return Err(retry_after.as_secs().max(1));
        }

        timestamps.push(now);
        Ok(())
    }

    /// Drops timestamps outside the window and forgets idle IPs.
    pub async fn cleanup_old_entries(&self) {
        let now = Instant::now();
        let mut requests = self.requests.write().await;
        requests.retain(|_, timestamps| {
            timestamps.retain(|&t| now.checked_duration_since(t).map(|d| d < self.window).unwrap_or(true));
            !timestamps.is_empty()
        });
    }

    pub async fn tracked_ips(&self) -> usize {
        self.requests.read().await.len()
    }
}

/// Per-IP limiting for every request, plus the tighter per-endpoint limits
/// on `POST` credential routes.
pub async fn rate_limit_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    if EXEMPT_PATHS.contains(&path.as_str()) {
        return next.run(req).await;
    }

    let remote_ip = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0.ip());
    let ip = extract_ip_from_headers(req.headers(), remote_ip);

    if let Err(retry_after) = state.rate_limiter.check_rate_limit(ip).await {
        tracing::warn!(ip = %ip, path = %path, "Global rate limit exceeded");
        return rate_limited(retry_after);
    }

    if req.method() == Method::POST {
        if let Err(retry_after) = state.endpoint_limiter.check_endpoint_limit(&path, ip).await {
            tracing::warn!(ip = %ip, path = %path, "Endpoint rate limit exceeded");
            return rate_limited(retry_after);
        }
    }

    next.run(req).await
}

fn rate_limited(retry_after_seconds: u64) -> Response {
    let mut res = AppError::RateLimited { retry_after_seconds }.into_response();
    if let Ok(v) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
        res.headers_mut().insert(header::RETRY_AFTER, v);
    }
    res
}

/// A manager for per-endpoint rate limiters.
///
/// This struct holds a collection of `RateLimiter` instances, each associated with a
/// specific endpoint path.
#[derive(Clone, Default)]
pub struct EndpointRateLimiter {
    limiters: Arc<HashMap<String, RateLimiter>>,
}

impl EndpointRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces limits.
    ///
    /// # Arguments
    ///
    /// * `limits` - Tuples of endpoint path, maximum number of requests and
    ///   window in seconds.
    pub fn with_limits(self, limits: Vec<(&str, usize, u64)>) -> Self {
        let mut map = Arc::try_unwrap(self.limiters).unwrap_or_else(|arc| (*arc).clone());
        for (endpoint, max_requests, window_seconds) in limits {
            map.insert(endpoint.to_string(), RateLimiter::new(max_requests, window_seconds));
        }
        Self { limiters: Arc::new(map) }
    }

    /// Endpoints without a configured limit always pass.
    pub async fn check_endpoint_limit(&self, endpoint: &str, ip: IpAddr) -> Result<(), u64> {
        match self.limiters.get(endpoint) {
            Some(limiter) => limiter.check_rate_limit(ip).await,
            None => Ok(()),
        }
    }

    pub async fn cleanup_all(&self) {
        for limiter in self.limiters.values() {
            limiter.cleanup_old_entries().await;
        }
    }
}

/// Periodically prunes both limiters held by the state.
pub async fn cleanup_task(state: AppState, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        state.rate_limiter.cleanup_old_entries().await;
        state.endpoint_limiter.cleanup_all().await;
    }
}
