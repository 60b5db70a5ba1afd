use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub production: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    #[serde(default)]
    pub seed_diseases: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub access_secret: String,
    pub access_ttl_secs: i64,
    pub refresh_secret: String,
    pub refresh_ttl_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Settings {
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub use_path_style: bool,
    /// Public URL prefix for objects (CDN or bucket website). Falls back to endpoint/bucket.
    pub public_base_url: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: String,
    pub local_dir: String,
    pub public_base_url: String,
    pub s3: Option<S3Settings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MlConfig {
    pub service_url: String,
    pub timeout_ms: u64,
    pub health_timeout_ms: u64,
    #[serde(default)]
    pub predict_on_upload: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_seconds: u64,
    pub login_max_requests: usize,
    pub register_max_requests: usize,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BootstrapConfig {
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub admin_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SecurityConfig {
    pub enable_hsts: Option<bool>,
    pub hsts_max_age: Option<u64>,
    pub hsts_include_subdomains: Option<bool>,
    pub csp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub ml: MlConfig,
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    pub security: Option<SecurityConfig>,
}

const DEFAULTS: &str = include_str!("../config/default.toml");

impl Default for AppConfig {
    fn default() -> Self {
        // Fallback: parse the embedded default TOML
        match ::config::Config::builder()
            .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
            .build()
        {
            Ok(cfg) => match cfg.try_deserialize() {
                Ok(app_cfg) => app_cfg,
                Err(e) => {
                    eprintln!("FATAL: Failed to deserialize default config: {}", e);
                    panic!("Failed to deserialize default config: {}", e);
                }
            },
            Err(e) => {
                eprintln!("FATAL: Failed to parse default config: {}", e);
                panic!("Failed to parse default config: {}", e);
            }
        }
    }
}

pub fn load() -> anyhow::Result<AppConfig> {
    // Load .env first (optional)
    let _ = dotenvy::dotenv();
    let custom = std::env::var("CROPDOC_CONFIG").ok();
    load_from(custom.as_deref())
}

/// Layers embedded defaults, `cropdoc.toml` in the CWD, an optional extra file and
/// `CROPDOC__*` environment variables (highest precedence).
pub fn load_from(extra_file: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut builder = ::config::Config::builder()
        .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
        .add_source(::config::File::with_name("cropdoc").required(false));

    if let Some(path) = extra_file {
        builder = builder.add_source(::config::File::with_name(path).required(false));
    }
    builder = builder.add_source(
        ::config::Environment::with_prefix("CROPDOC")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("server.allowed_origins"),
    );

    let cfg = builder.build()?;
    let app_cfg: AppConfig = cfg.try_deserialize()?;
    validate(&app_cfg)?;
    Ok(app_cfg)
}

pub fn validate(cfg: &AppConfig) -> anyhow::Result<()> {
    // Server
    if cfg.server.port == 0 {
        return Err(anyhow::anyhow!("invalid server.port: {}", cfg.server.port));
    }
    #[cfg(unix)]
    if cfg.server.port < 1024 {
        tracing::warn!("Using privileged port {} - may require elevated permissions", cfg.server.port);
    }
    if cfg.server.max_body_bytes < 1024 * 1024 {
        return Err(anyhow::anyhow!("server.max_body_bytes must be at least 1 MiB"));
    }

    // JWT
    let jwt = &cfg.jwt;
    if jwt.access_secret.trim().is_empty() || jwt.refresh_secret.trim().is_empty() {
        return Err(anyhow::anyhow!("jwt.access_secret and jwt.refresh_secret must be set"));
    }
    if jwt.access_secret == jwt.refresh_secret {
        return Err(anyhow::anyhow!("jwt.access_secret and jwt.refresh_secret must differ"));
    }
    if cfg.server.production && (jwt.access_secret.len() < 32 || jwt.refresh_secret.len() < 32) {
        return Err(anyhow::anyhow!("jwt secrets must be at least 32 characters in production"));
    }
    if jwt.access_ttl_secs <= 0 || jwt.refresh_ttl_secs <= 0 {
        return Err(anyhow::anyhow!("jwt ttl values must be > 0"));
    }
    if jwt.refresh_ttl_secs < jwt.access_ttl_secs {
        tracing::warn!("jwt.refresh_ttl_secs is shorter than jwt.access_ttl_secs");
    }

    // Storage
    match cfg.storage.backend.as_str() {
        "local" => {
            if cfg.storage.local_dir.trim().is_empty() {
                return Err(anyhow::anyhow!("storage.local_dir must be set for the local backend"));
            }
        }
        "s3" => match cfg.storage.s3.as_ref() {
            Some(s3) if !s3.bucket.trim().is_empty() => {}
            _ => return Err(anyhow::anyhow!("storage.s3.bucket must be set for the s3 backend")),
        },
        other => return Err(anyhow::anyhow!("unknown storage.backend: {}", other)),
    }

    // ML
    if cfg.ml.service_url.trim().is_empty() {
        return Err(anyhow::anyhow!("ml.service_url must be set"));
    }
    if cfg.ml.timeout_ms == 0 || cfg.ml.health_timeout_ms == 0 {
        return Err(anyhow::anyhow!("ml timeouts must be > 0"));
    }

    // Rate limiting
    if cfg.rate_limit.max_requests == 0 || cfg.rate_limit.window_seconds == 0 {
        return Err(anyhow::anyhow!("rate_limit.max_requests and window_seconds must be > 0"));
    }
    if cfg.rate_limit.login_max_requests == 0 || cfg.rate_limit.register_max_requests == 0 {
        return Err(anyhow::anyhow!("rate_limit.login_max_requests and register_max_requests must be > 0"));
    }

    Ok(())
}

pub fn ensure_sqlite_parent_dir(url: &str) -> anyhow::Result<()> {
    if let Some(path) = url.strip_prefix("sqlite://") {
        let path = path.split('?').next().unwrap_or(path);
        let p = Path::new(path);
        if let Some(parent) = p.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    Ok(())
}
