#[cfg(test)]
mod tests {
    use crate::{db, seed};
    use sqlx::migrate::MigrateDatabase;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::NamedTempFile;
    use uuid::Uuid;

    async fn setup_test_db() -> (sqlx::SqlitePool, NamedTempFile) {
        let temp_db = NamedTempFile::new().unwrap();
        let db_url = format!("sqlite:{}", temp_db.path().display());

        sqlx::Sqlite::create_database(&db_url).await.unwrap();

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&db_url)
            .await
            .unwrap();

        db::init_db(&pool).await.unwrap();

        (pool, temp_db)
    }

    async fn insert_user(pool: &sqlx::SqlitePool, role: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let now = db::now();
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, name, role, created_at, updated_at) VALUES (?1, ?2, 'x', 'Test', ?3, ?4, ?4)",
        )
        .bind(&id)
        .bind(format!("{}@example.com", id))
        .bind(role)
        .bind(&now)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    async fn insert_image(pool: &sqlx::SqlitePool, user_id: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let now = db::now();
        sqlx::query(
            r#"INSERT INTO images (id, filename, original_name, mimetype, size, path, original_key, user_id, uploaded_at, updated_at)
               VALUES (?1, ?2, 'leaf.png', 'image/png', 10, 'http://x/leaf.png', ?2, ?3, ?4, ?4)"#,
        )
        .bind(&id)
        .bind(format!("crop-disease/original/{}.png", id))
        .bind(user_id)
        .bind(&now)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    async fn insert_detection(pool: &sqlx::SqlitePool, user_id: &str, image_id: &str, disease_id: &str) {
        let prediction_id = Uuid::new_v4().to_string();
        let now = db::now();
        sqlx::query(
            r#"INSERT INTO predictions (id, image_id, disease_id, user_id, predicted_label, confidence, is_healthy, raw_response, created_at)
               VALUES (?1, ?2, ?3, ?4, 'leaf_spot', 0.9, 0, '{}', ?5)"#,
        )
        .bind(&prediction_id)
        .bind(image_id)
        .bind(disease_id)
        .bind(user_id)
        .bind(&now)
        .execute(pool)
        .await
        .unwrap();
        sqlx::query(
            r#"INSERT INTO disease_history (id, user_id, disease_id, image_id, prediction_id, confidence, detected_at)
               VALUES (?1, ?2, ?3, ?4, ?5, 0.9, ?6)"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(disease_id)
        .bind(image_id)
        .bind(&prediction_id)
        .bind(&now)
        .execute(pool)
        .await
        .unwrap();
    }

    async fn count(pool: &sqlx::SqlitePool, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table)).fetch_one(pool).await.unwrap()
    }

    #[tokio::test]
    async fn test_init_db() {
        let (pool, _file) = setup_test_db().await;

        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();

        for table in
            ["users", "farmer_profiles", "admin_profiles", "images", "diseases", "predictions", "disease_history"]
        {
            assert!(tables.contains(&table.to_string()), "missing table {}", table);
        }

        // Running again must not fail or duplicate anything
        db::init_db(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let (pool, _file) = setup_test_db().await;
        let first = seed::seed_diseases(&pool).await.unwrap();
        let second = seed::seed_diseases(&pool).await.unwrap();
        assert_eq!(first, 6);
        assert_eq!(second, 0);
        assert_eq!(count(&pool, "diseases").await, 6);
    }

    #[tokio::test]
    async fn test_role_and_severity_checks() {
        let (pool, _file) = setup_test_db().await;
        let now = db::now();

        let bad_role = sqlx::query(
            "INSERT INTO users (id, email, password_hash, name, role, created_at, updated_at) VALUES ('u', 'u@example.com', 'x', 'U', 'ROOT', ?1, ?1)",
        )
        .bind(&now)
        .execute(&pool)
        .await;
        assert!(bad_role.is_err());

        let bad_severity = sqlx::query(
            "INSERT INTO diseases (id, name, severity, created_at, updated_at) VALUES ('d', 'Odd', 'EXTREME', ?1, ?1)",
        )
        .bind(&now)
        .execute(&pool)
        .await;
        assert!(bad_severity.is_err());
    }

    #[tokio::test]
    async fn test_hard_user_delete_cascades() {
        let (pool, _file) = setup_test_db().await;
        seed::seed_diseases(&pool).await.unwrap();
        let disease_id: String =
            sqlx::query_scalar("SELECT id FROM diseases LIMIT 1").fetch_one(&pool).await.unwrap();

        let user_id = insert_user(&pool, "FARMER").await;
        let now = db::now();
        sqlx::query(
            "INSERT INTO farmer_profiles (id, user_id, crop_types, created_at, updated_at) VALUES (?1, ?2, '[\"Rice\"]', ?3, ?3)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&user_id)
        .bind(&now)
        .execute(&pool)
        .await
        .unwrap();
        let image_id = insert_image(&pool, &user_id).await;
        insert_detection(&pool, &user_id, &image_id, &disease_id).await;

        sqlx::query("DELETE FROM users WHERE id = ?1").bind(&user_id).execute(&pool).await.unwrap();

        assert_eq!(count(&pool, "farmer_profiles").await, 0);
        assert_eq!(count(&pool, "images").await, 0);
        assert_eq!(count(&pool, "predictions").await, 0);
        assert_eq!(count(&pool, "disease_history").await, 0);
    }

    #[tokio::test]
    async fn test_image_delete_keeps_history() {
        let (pool, _file) = setup_test_db().await;
        seed::seed_diseases(&pool).await.unwrap();
        let disease_id: String =
            sqlx::query_scalar("SELECT id FROM diseases LIMIT 1").fetch_one(&pool).await.unwrap();

        let user_id = insert_user(&pool, "FARMER").await;
        let image_id = insert_image(&pool, &user_id).await;
        insert_detection(&pool, &user_id, &image_id, &disease_id).await;

        sqlx::query("DELETE FROM images WHERE id = ?1").bind(&image_id).execute(&pool).await.unwrap();

        assert_eq!(count(&pool, "predictions").await, 0);
        let (image_ref, prediction_ref): (Option<String>, Option<String>) =
            sqlx::query_as("SELECT image_id, prediction_id FROM disease_history")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(image_ref.is_none());
        assert!(prediction_ref.is_none());
    }
}
