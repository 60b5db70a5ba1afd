use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Process-wide counters, exposed on `/metrics`.
#[derive(Clone)]
pub struct Metrics {
    pub users_registered: Arc<AtomicU64>,
    pub logins_succeeded: Arc<AtomicU64>,
    pub logins_failed: Arc<AtomicU64>,
    pub images_uploaded: Arc<AtomicU64>,
    pub images_deleted: Arc<AtomicU64>,
    pub bytes_uploaded: Arc<AtomicU64>,
    pub predictions_completed: Arc<AtomicU64>,
    pub predictions_failed: Arc<AtomicU64>,
    pub ml_errors: Arc<AtomicU64>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            users_registered: Arc::new(AtomicU64::new(0)),
            logins_succeeded: Arc::new(AtomicU64::new(0)),
            logins_failed: Arc::new(AtomicU64::new(0)),
            images_uploaded: Arc::new(AtomicU64::new(0)),
            images_deleted: Arc::new(AtomicU64::new(0)),
            bytes_uploaded: Arc::new(AtomicU64::new(0)),
            predictions_completed: Arc::new(AtomicU64::new(0)),
            predictions_failed: Arc::new(AtomicU64::new(0)),
            ml_errors: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn inc_users_registered(&self) {
        self.users_registered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_login(&self, ok: bool) {
        if ok {
            self.logins_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.logins_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_upload(&self, bytes: u64) {
        self.images_uploaded.fetch_add(1, Ordering::Relaxed);
        self.bytes_uploaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_images_deleted(&self, count: u64) {
        self.images_deleted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_prediction(&self, ok: bool) {
        if ok {
            self.predictions_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.predictions_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_ml_errors(&self) {
        self.ml_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            users_registered: self.users_registered.load(Ordering::Relaxed),
            logins_succeeded: self.logins_succeeded.load(Ordering::Relaxed),
            logins_failed: self.logins_failed.load(Ordering::Relaxed),
            images_uploaded: self.images_uploaded.load(Ordering::Relaxed),
            images_deleted: self.images_deleted.load(Ordering::Relaxed),
            bytes_uploaded: self.bytes_uploaded.load(Ordering::Relaxed),
            predictions_completed: self.predictions_completed.load(Ordering::Relaxed),
            predictions_failed: self.predictions_failed.load(Ordering::Relaxed),
            ml_errors: self.ml_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub users_registered: u64,
    pub logins_succeeded: u64,
    pub logins_failed: u64,
    pub images_uploaded: u64,
    pub images_deleted: u64,
    pub bytes_uploaded: u64,
    pub predictions_completed: u64,
    pub predictions_failed: u64,
    pub ml_errors: u64,
    pub uptime_seconds: u64,
}

impl MetricsSnapshot {
    /// Prometheus text exposition format.
    pub fn to_prometheus(&self) -> String {
        let counters: [(&str, &str, u64); 9] = [
            ("users_registered", "Farmer and admin accounts created", self.users_registered),
            ("logins_succeeded", "Successful logins", self.logins_succeeded),
            ("logins_failed", "Rejected logins", self.logins_failed),
            ("images_uploaded", "Images uploaded", self.images_uploaded),
            ("images_deleted", "Images deleted", self.images_deleted),
            ("bytes_uploaded", "Bytes of original images uploaded", self.bytes_uploaded),
            ("predictions_completed", "Predictions stored", self.predictions_completed),
            ("predictions_failed", "Predictions that failed", self.predictions_failed),
            ("ml_errors", "Errors talking to the ML service", self.ml_errors),
        ];
        let mut out = String::new();
        for (name, help, value) in counters {
            out.push_str(&format!(
                "# HELP cropdoc_{name} {help}\n# TYPE cropdoc_{name} counter\ncropdoc_{name} {value}\n"
            ));
        }
        out.push_str(&format!(
            "# HELP cropdoc_uptime_seconds Uptime seconds\n# TYPE cropdoc_uptime_seconds gauge\ncropdoc_uptime_seconds {}\n",
            self.uptime_seconds
        ));
        out
    }
}
