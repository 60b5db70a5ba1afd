#[cfg(test)]
mod tests {
    use crate::config::{self, AppConfig, S3Settings};
    use lazy_static::lazy_static;
    use std::env;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    lazy_static! {
        // Environment variables are process-wide
        static ref ENV_LOCK: Mutex<()> = Mutex::new(());
    }

    fn expect_invalid(cfg: &AppConfig, needle: &str) {
        let err = config::validate(cfg).unwrap_err().to_string();
        assert!(err.contains(needle), "expected '{}' in '{}'", needle, err);
    }

    #[test]
    fn test_valid_config_does_not_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        assert!(config::load_from(None).is_ok());
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.max_body_bytes, 11 * 1024 * 1024);
        assert!(!config.server.production);
        assert_eq!(config.database.url, "sqlite://data/cropdoc.db");
        assert!(config.database.seed_diseases);
        assert_eq!(config.jwt.access_ttl_secs, 3600);
        assert_eq!(config.jwt.refresh_ttl_secs, 30 * 24 * 3600);
        assert_eq!(config.storage.backend, "local");
        assert!(config.ml.predict_on_upload);
        assert_eq!(config.rate_limit.login_max_requests, 10);
        assert!(config.bootstrap.admin_email.is_none());
        assert!(config.security.is_none());
        assert!(config::validate(&config).is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("CROPDOC__SERVER__PORT", "4100");
        env::set_var("CROPDOC__ML__PREDICT_ON_UPLOAD", "false");
        env::set_var("CROPDOC__SERVER__ALLOWED_ORIGINS", "https://a.example,https://b.example");
        let result = config::load_from(None);
        env::remove_var("CROPDOC__SERVER__PORT");
        env::remove_var("CROPDOC__ML__PREDICT_ON_UPLOAD");
        env::remove_var("CROPDOC__SERVER__ALLOWED_ORIGINS");

        let cfg = result.unwrap();
        assert_eq!(cfg.server.port, 4100);
        assert!(!cfg.ml.predict_on_upload);
        assert_eq!(cfg.server.allowed_origins, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn test_invalid_server_port_from_env() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("CROPDOC__SERVER__PORT", "0");
        let result = config::load_from(None);
        env::remove_var("CROPDOC__SERVER__PORT");

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("invalid server.port"));
    }

    #[test]
    fn test_extra_file_layer() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("override.toml");
        fs::write(&path, "[storage]\nbackend = \"local\"\nlocal_dir = \"/srv/images\"\n").unwrap();

        let cfg = config::load_from(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(cfg.storage.local_dir, "/srv/images");
        assert_eq!(cfg.storage.public_base_url, "http://127.0.0.1:3000");
    }

    #[test]
    fn test_jwt_rules() {
        let mut cfg = AppConfig::default();
        cfg.jwt.refresh_secret = cfg.jwt.access_secret.clone();
        expect_invalid(&cfg, "must differ");

        let mut cfg = AppConfig::default();
        cfg.jwt.access_secret = "  ".into();
        expect_invalid(&cfg, "must be set");

        let mut cfg = AppConfig::default();
        cfg.server.production = true;
        cfg.jwt.access_secret = "short".into();
        expect_invalid(&cfg, "at least 32 characters");

        let mut cfg = AppConfig::default();
        cfg.jwt.access_ttl_secs = 0;
        expect_invalid(&cfg, "ttl");
    }

    #[test]
    fn test_storage_rules() {
        let mut cfg = AppConfig::default();
        cfg.storage.backend = "cloud".into();
        expect_invalid(&cfg, "unknown storage.backend");

        cfg.storage.backend = "s3".into();
        expect_invalid(&cfg, "storage.s3.bucket");

        cfg.storage.s3 = Some(S3Settings {
            bucket: "crop-images".into(),
            region: "ap-south-1".into(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            use_path_style: false,
            public_base_url: None,
        });
        assert!(config::validate(&cfg).is_ok());
    }

    #[test]
    fn test_limits_and_ml_rules() {
        let mut cfg = AppConfig::default();
        cfg.server.max_body_bytes = 1024;
        expect_invalid(&cfg, "max_body_bytes");

        let mut cfg = AppConfig::default();
        cfg.ml.service_url = String::new();
        expect_invalid(&cfg, "ml.service_url");

        let mut cfg = AppConfig::default();
        cfg.rate_limit.login_max_requests = 0;
        expect_invalid(&cfg, "login_max_requests");
    }

    #[test]
    fn test_ensure_sqlite_parent_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b").join("cropdoc.db");
        let url = format!("sqlite://{}?mode=rwc", nested.display());
        config::ensure_sqlite_parent_dir(&url).unwrap();
        assert!(nested.parent().unwrap().is_dir());

        // Non-file URLs are left alone
        assert!(config::ensure_sqlite_parent_dir("sqlite::memory:").is_ok());
    }
}
