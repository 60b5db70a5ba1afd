use std::sync::Arc;

use crate::auth::TokenService;
use crate::config::AppConfig;
use crate::metrics::Metrics;
use crate::middleware::rate_limit::{EndpointRateLimiter, RateLimiter};
use crate::ml::PredictionClient;
use crate::storage::ImageStore;

pub const LOGIN_PATH: &str = "/api/v1/auth/login";
pub const REGISTER_FARMER_PATH: &str = "/api/v1/auth/register/farmer";

/// The shared application state.
///
/// Cloned into every handler; all fields are cheap handles.
#[derive(Clone)]
pub struct AppState {
    /// The database connection pool.
    pub db: sqlx::SqlitePool,
    pub config: Arc<AppConfig>,
    pub metrics: Metrics,
    /// Global per-IP limiter applied to every request.
    pub rate_limiter: RateLimiter,
    /// Tighter limits for credential endpoints.
    pub endpoint_limiter: EndpointRateLimiter,
    pub tokens: TokenService,
    pub store: Arc<dyn ImageStore>,
    pub ml: Arc<dyn PredictionClient>,
}

impl AppState {
    pub fn new(
        db: sqlx::SqlitePool,
        config: AppConfig,
        store: Arc<dyn ImageStore>,
        ml: Arc<dyn PredictionClient>,
    ) -> Self {
        let rl = &config.rate_limit;
        let rate_limiter = RateLimiter::new(rl.max_requests, rl.window_seconds);
        let endpoint_limiter = EndpointRateLimiter::new().with_limits(vec![
            (LOGIN_PATH, rl.login_max_requests, rl.window_seconds),
            (REGISTER_FARMER_PATH, rl.register_max_requests, rl.window_seconds),
        ]);
        let tokens = TokenService::new(&config.jwt);

        Self {
            db,
            config: Arc::new(config),
            metrics: Metrics::new(),
            rate_limiter,
            endpoint_limiter,
            tokens,
            store,
            ml,
        }
    }
}
