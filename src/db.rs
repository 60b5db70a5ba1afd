use chrono::{SecondsFormat, Utc};
use sqlx::SqlitePool;

/// Timestamp format stored in every `*_at` column: RFC 3339, UTC, millisecond precision.
/// Fixed width keeps lexical and chronological order identical.
pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub async fn init_db(pool: &SqlitePool) -> anyhow::Result<()> {
    if let Err(e) = sqlx::query("PRAGMA journal_mode=WAL;").execute(pool).await {
        tracing::warn!("Failed to set WAL journal mode: {}", e);
    }
    if let Err(e) = sqlx::query("PRAGMA synchronous=NORMAL;").execute(pool).await {
        tracing::warn!("Failed to set synchronous mode: {}", e);
    }
    // Foreign keys are critical - fail if this doesn't work
    sqlx::query("PRAGMA foreign_keys=ON;").execute(pool).await?;
    if let Err(e) = sqlx::query("PRAGMA busy_timeout=10000;").execute(pool).await {
        tracing::warn!("Failed to set busy_timeout: {}", e);
    }

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            name TEXT NOT NULL,
            phone TEXT NULL,
            address TEXT NULL,
            photo TEXT NULL,
            role TEXT NOT NULL CHECK (role IN ('ADMIN', 'FARMER')),
            is_active INTEGER NOT NULL DEFAULT 1,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            need_password_change INTEGER NOT NULL DEFAULT 0,
            last_login_at TEXT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS farmer_profiles (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL UNIQUE,
            crop_types TEXT NOT NULL,
            farm_size REAL NULL,
            farming_experience INTEGER NULL,
            farm_location TEXT NULL,
            soil_type TEXT NULL,
            irrigation_type TEXT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS admin_profiles (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL UNIQUE,
            department TEXT NULL,
            designation TEXT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS images (
            id TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            original_name TEXT NOT NULL,
            mimetype TEXT NOT NULL,
            size INTEGER NOT NULL,
            path TEXT NOT NULL,
            processed_path TEXT NULL,
            thumbnail_path TEXT NULL,
            original_key TEXT NOT NULL,
            processed_key TEXT NULL,
            thumbnail_key TEXT NULL,
            width INTEGER NULL,
            height INTEGER NULL,
            processing_status TEXT NOT NULL DEFAULT 'PENDING'
                CHECK (processing_status IN ('PENDING', 'PROCESSING', 'COMPLETED', 'FAILED')),
            processing_error TEXT NULL,
            user_id TEXT NOT NULL,
            uploaded_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS diseases (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            scientific_name TEXT NULL,
            description TEXT NULL,
            symptoms TEXT NOT NULL DEFAULT '[]',
            causes TEXT NOT NULL DEFAULT '[]',
            treatment TEXT NULL,
            prevention TEXT NULL,
            severity TEXT NOT NULL CHECK (severity IN ('LOW', 'MEDIUM', 'HIGH', 'CRITICAL')),
            crops TEXT NOT NULL DEFAULT '[]',
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS predictions (
            id TEXT PRIMARY KEY,
            image_id TEXT NOT NULL,
            disease_id TEXT NULL,
            user_id TEXT NOT NULL,
            predicted_label TEXT NOT NULL,
            confidence REAL NOT NULL,
            is_healthy INTEGER NOT NULL,
            treatment TEXT NULL,
            processing_time_seconds REAL NULL,
            raw_response TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(image_id) REFERENCES images(id) ON DELETE CASCADE,
            FOREIGN KEY(disease_id) REFERENCES diseases(id) ON DELETE SET NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS disease_history (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            disease_id TEXT NOT NULL,
            image_id TEXT NULL,
            prediction_id TEXT NULL,
            confidence REAL NOT NULL,
            detected_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY(disease_id) REFERENCES diseases(id) ON DELETE CASCADE,
            FOREIGN KEY(image_id) REFERENCES images(id) ON DELETE SET NULL,
            FOREIGN KEY(prediction_id) REFERENCES predictions(id) ON DELETE SET NULL
        )"#,
    )
    .execute(pool)
    .await?;

    let indexes = [
        ("idx_users_role_created", "CREATE INDEX IF NOT EXISTS idx_users_role_created ON users(role, created_at DESC)"),
        ("idx_images_user_uploaded", "CREATE INDEX IF NOT EXISTS idx_images_user_uploaded ON images(user_id, uploaded_at DESC)"),
        ("idx_images_status", "CREATE INDEX IF NOT EXISTS idx_images_status ON images(processing_status)"),
        ("idx_predictions_image", "CREATE INDEX IF NOT EXISTS idx_predictions_image ON predictions(image_id, created_at DESC)"),
        ("idx_history_user_detected", "CREATE INDEX IF NOT EXISTS idx_history_user_detected ON disease_history(user_id, detected_at DESC)"),
    ];

    for (name, query) in indexes {
        if let Err(e) = sqlx::query(query).execute(pool).await {
            tracing::warn!("Failed to create index {}: {}", name, e);
        }
    }

    Ok(())
}
