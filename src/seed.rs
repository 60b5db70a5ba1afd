//! Startup data: the disease catalog and the bootstrap admin account.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::BootstrapConfig;
use crate::db;
use crate::models::{AdminProfileInput, Severity};
use crate::services::users::{self, NewAccount};

struct SeedDisease {
    name: &'static str,
    scientific_name: Option<&'static str>,
    description: &'static str,
    symptoms: &'static [&'static str],
    causes: &'static [&'static str],
    treatment: &'static str,
    prevention: &'static str,
    severity: Severity,
    crops: &'static [&'static str],
}

const CATALOG: &[SeedDisease] = &[
    SeedDisease {
        name: "Healthy Crop",
        scientific_name: None,
        description: "Plant appears healthy with no disease symptoms detected",
        symptoms: &["Green healthy leaves", "Normal growth pattern"],
        causes: &[],
        treatment: "Continue current farming practices",
        prevention: "Regular monitoring, proper spacing, balanced fertilization",
        severity: Severity::Low,
        crops: &["All crops"],
    },
    SeedDisease {
        name: "Leaf Spot Disease",
        scientific_name: Some("Cercospora spp."),
        description: "Fungal or bacterial disease causing circular spots on leaves",
        symptoms: &["Small circular brown spots", "Yellow halos around spots"],
        causes: &["High humidity", "Poor air circulation", "Overhead watering"],
        treatment: "Remove affected leaves. Apply copper-based fungicide.",
        prevention: "Avoid overhead watering, ensure proper plant spacing",
        severity: Severity::Medium,
        crops: &["Apple", "Corn", "Potato", "Tomato"],
    },
    SeedDisease {
        name: "Blight Disease",
        scientific_name: Some("Phytophthora infestans"),
        description: "Serious fungal disease causing rapid browning of plant tissues",
        symptoms: &["Rapid browning of leaves", "Water-soaked lesions"],
        causes: &["Cool wet weather", "High humidity", "Poor drainage"],
        treatment: "Remove infected plants. Apply systemic fungicide.",
        prevention: "Use resistant varieties, ensure good drainage",
        severity: Severity::High,
        crops: &["Potato", "Tomato"],
    },
    SeedDisease {
        name: "Rust Disease",
        scientific_name: Some("Puccinia spp."),
        description: "Fungal disease with orange/brown pustules on leaves",
        symptoms: &["Orange/brown pustules", "Yellow spots that turn rusty"],
        causes: &["Moderate temperatures", "High humidity", "Dense canopy"],
        treatment: "Apply systemic fungicide. Remove infected leaves.",
        prevention: "Plant resistant varieties, proper spacing",
        severity: Severity::Medium,
        crops: &["Wheat", "Corn", "Apple"],
    },
    SeedDisease {
        name: "Bacterial Spot",
        scientific_name: Some("Xanthomonas campestris"),
        description: "Bacterial infection causing dark spots on leaves and fruits",
        symptoms: &["Small dark brown spots", "Yellow halos", "Fruit lesions"],
        causes: &["Warm humid weather", "Water splash", "Contaminated tools"],
        treatment: "Apply copper-based bactericide. Improve sanitation.",
        prevention: "Use clean tools, avoid water splash, crop rotation",
        severity: Severity::High,
        crops: &["Tomato", "Pepper", "Peach"],
    },
    SeedDisease {
        name: "Mosaic Virus",
        scientific_name: Some("Tobacco Mosaic Virus"),
        description: "Viral infection causing mottled yellow/green patterns",
        symptoms: &["Mottled leaf patterns", "Stunted growth", "Distorted leaves"],
        causes: &["Infected seeds", "Insect vectors", "Contaminated tools"],
        treatment: "Remove infected plants. Control insect vectors.",
        prevention: "Use virus-free seeds, control insects, sanitize tools",
        severity: Severity::High,
        crops: &["Tomato", "Pepper", "Cucumber"],
    },
];

/// Inserts missing catalog entries. Existing names are left untouched.
/// Returns the number of rows inserted.
pub async fn seed_diseases(pool: &SqlitePool) -> anyhow::Result<u64> {
    let mut inserted = 0;
    let mut tx = pool.begin().await?;
    for d in CATALOG {
        let now = db::now();
        let res = sqlx::query(
            "INSERT OR IGNORE INTO diseases (id, name, scientific_name, description, symptoms, causes, treatment, \
                prevention, severity, crops, is_active, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(d.name)
        .bind(d.scientific_name)
        .bind(d.description)
        .bind(serde_json::to_string(d.symptoms)?)
        .bind(serde_json::to_string(d.causes)?)
        .bind(d.treatment)
        .bind(d.prevention)
        .bind(d.severity.as_str())
        .bind(serde_json::to_string(d.crops)?)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        inserted += res.rows_affected();
    }
    tx.commit().await?;

    if inserted > 0 {
        tracing::info!(inserted, "Seeded disease catalog");
    }
    Ok(inserted)
}

/// Creates the configured admin when both credentials are set and the email
/// is still free. The account must change its password on first login.
pub async fn bootstrap_admin(pool: &SqlitePool, cfg: &BootstrapConfig) -> anyhow::Result<bool> {
    let (Some(email), Some(password)) = (cfg.admin_email.as_deref(), cfg.admin_password.as_deref()) else {
        return Ok(false);
    };
    if email.trim().is_empty() || password.is_empty() {
        return Ok(false);
    }
    if users::email_exists(pool, email).await.map_err(|e| anyhow::anyhow!("{}", e))? {
        return Ok(false);
    }

    let account = NewAccount {
        email: email.to_string(),
        password: password.to_string(),
        name: cfg.admin_name.clone().unwrap_or_else(|| "Administrator".to_string()),
        phone: None,
        address: None,
        photo: None,
    };
    let admin = users::register_admin(pool, account, AdminProfileInput::default(), true)
        .await
        .map_err(|e| anyhow::anyhow!("failed to create bootstrap admin: {}", e))?;
    tracing::info!(user_id = %admin.user.id, "Created bootstrap admin");
    Ok(true)
}
