#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::tests::support::spawn_app;

    #[tokio::test]
    async fn test_health_reports_both_states_with_200() {
        let app = spawn_app().await;
        let (_, token) = app.farmer("ml@example.com").await;

        let (status, body) = app.call(Method::GET, "/api/v1/ml/health", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["isHealthy"], true);
        assert_eq!(body["data"]["status"], "healthy");

        app.ml.set_healthy(false);
        let (status, body) = app.call(Method::GET, "/api/v1/ml/health", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "ML service is not available");
        assert_eq!(body["data"]["isHealthy"], false);
        assert_eq!(body["data"]["error"], "ML service not available");
    }

    #[tokio::test]
    async fn test_info_includes_service_url() {
        let app = spawn_app().await;
        let (_, token) = app.farmer("info@example.com").await;

        let (status, body) = app.call(Method::GET, "/api/v1/ml/info", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["models"]["model"], "mock-resnet");
        assert_eq!(body["data"]["serviceUrl"], "http://ml.invalid");

        app.ml.set_healthy(false);
        let (status, body) = app.call(Method::GET, "/api/v1/ml/info", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["error"], "ML service information unavailable");
    }

    #[tokio::test]
    async fn test_ml_routes_require_auth() {
        let app = spawn_app().await;
        let (status, _) = app.call(Method::GET, "/api/v1/ml/health", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_predict_links_disease_case_insensitively() {
        let app = spawn_app().await;
        let (user_id, token) = app.farmer("predict@example.com").await;
        let id = app.upload_png(&token).await["id"].as_str().unwrap().to_string();
        app.ml.set_label("leaf spot DISEASE", false);

        let (status, body) =
            app.call(Method::POST, &format!("/api/v1/ml/predict/{}", id), Some(&token), None).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["message"], "Disease prediction completed successfully");
        assert_eq!(body["data"]["predictedLabel"], "leaf spot DISEASE");
        assert_eq!(body["data"]["confidence"], 0.91);
        assert_eq!(body["data"]["disease"]["name"], "Leaf Spot Disease");
        assert_eq!(body["data"]["disease"]["severity"], "MEDIUM");
        assert_eq!(body["data"]["treatment"], "Apply copper-based fungicide");
        assert!(body["data"].get("rawResponse").is_none());

        let (status, body) = app.call(Method::GET, &format!("/api/v1/image/{}", id), Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["processingStatus"], "COMPLETED");
        assert_eq!(body["data"]["predictions"].as_array().unwrap().len(), 1);

        let (history_user, image_id): (String, Option<String>) =
            sqlx::query_as("SELECT user_id, image_id FROM disease_history").fetch_one(&app.state.db).await.unwrap();
        assert_eq!(history_user, user_id);
        assert_eq!(image_id.as_deref(), Some(id.as_str()));
        assert_eq!(app.state.metrics.get_snapshot().predictions_completed, 1);
    }

    #[tokio::test]
    async fn test_healthy_and_unknown_labels() {
        let app = spawn_app().await;
        let (_, token) = app.farmer("labels@example.com").await;
        let first = app.upload_png(&token).await["id"].as_str().unwrap().to_string();
        let second = app.upload_png(&token).await["id"].as_str().unwrap().to_string();

        app.ml.set_label("Tomato___healthy", true);
        let (_, body) = app.call(Method::POST, &format!("/api/v1/ml/predict/{}", first), Some(&token), None).await;
        assert_eq!(body["data"]["isHealthy"], true);
        assert_eq!(body["data"]["disease"]["name"], "Healthy Crop");

        app.ml.set_label("Alien Fungus", false);
        let (status, body) =
            app.call(Method::POST, &format!("/api/v1/ml/predict/{}", second), Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["disease"].is_null());
        assert!(body["data"]["diseaseId"].is_null());

        let history: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM disease_history").fetch_one(&app.state.db).await.unwrap();
        assert_eq!(history, 1);
        let predictions: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM predictions").fetch_one(&app.state.db).await.unwrap();
        assert_eq!(predictions, 2);
    }

    #[tokio::test]
    async fn test_unhealthy_service_marks_image_failed() {
        let app = spawn_app().await;
        let (_, token) = app.farmer("down@example.com").await;
        let id = app.upload_png(&token).await["id"].as_str().unwrap().to_string();
        app.ml.set_healthy(false);

        let (status, body) =
            app.call(Method::POST, &format!("/api/v1/ml/predict/{}", id), Some(&token), None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["message"], "ML prediction service is currently unavailable");
        assert_eq!(app.ml.predict_calls.load(Ordering::SeqCst), 0);

        let (status_text, error): (String, Option<String>) =
            sqlx::query_as("SELECT processing_status, processing_error FROM images WHERE id = ?")
                .bind(&id)
                .fetch_one(&app.state.db)
                .await
                .unwrap();
        assert_eq!(status_text, "FAILED");
        assert!(error.is_some());
        let snapshot = app.state.metrics.get_snapshot();
        assert_eq!(snapshot.predictions_failed, 1);
        assert_eq!(snapshot.ml_errors, 1);
    }

    #[tokio::test]
    async fn test_predict_rejected_by_model() {
        let app = spawn_app().await;
        let (_, token) = app.farmer("reject@example.com").await;
        let id = app.upload_png(&token).await["id"].as_str().unwrap().to_string();
        app.ml.fail_predict.store(true, Ordering::SeqCst);

        let (status, body) =
            app.call(Method::POST, &format!("/api/v1/ml/predict/{}", id), Some(&token), None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "ML prediction failed");
    }

    #[tokio::test]
    async fn test_predict_access_rules() {
        let app = spawn_app().await;
        let (_, owner) = app.farmer("owner@example.com").await;
        let (_, other) = app.farmer("other@example.com").await;
        let (_, admin) = app.admin("root@example.com").await;
        let id = app.upload_png(&owner).await["id"].as_str().unwrap().to_string();
        let uri = format!("/api/v1/ml/predict/{}", id);

        assert_eq!(app.call(Method::POST, &uri, Some(&other), None).await.0, StatusCode::FORBIDDEN);
        assert_eq!(app.call(Method::POST, &uri, Some(&admin), None).await.0, StatusCode::OK);

        let missing = format!("/api/v1/ml/predict/{}", uuid::Uuid::new_v4());
        assert_eq!(app.call(Method::POST, &missing, Some(&owner), None).await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_batch_predict() {
        let app = spawn_app().await;
        let (_, alice) = app.farmer("alice@example.com").await;
        let (_, bob) = app.farmer("bob@example.com").await;
        let a1 = app.upload_png(&alice).await["id"].as_str().unwrap().to_string();
        let a2 = app.upload_png(&alice).await["id"].as_str().unwrap().to_string();
        let b1 = app.upload_png(&bob).await["id"].as_str().unwrap().to_string();
        let unknown = uuid::Uuid::new_v4().to_string();

        let (status, body) = app
            .call(
                Method::POST,
                "/api/v1/ml/batch-predict",
                Some(&alice),
                Some(json!({ "imageIds": [a1, unknown, a2, a1] })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["data"]["total"], 2);
        assert_eq!(body["data"]["successful"], 2);
        assert_eq!(body["data"]["failed"], 0);
        assert_eq!(body["data"]["results"][0]["imageId"], a1.as_str());
        assert_eq!(body["data"]["results"][0]["status"], "fulfilled");

        let (status, _) = app
            .call(Method::POST, "/api/v1/ml/batch-predict", Some(&alice), Some(json!({ "imageIds": [a1, b1] })))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .call(Method::POST, "/api/v1/ml/batch-predict", Some(&alice), Some(json!({ "imageIds": [unknown] })))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "No valid images found");

        let too_many: Vec<String> = (0..11).map(|_| uuid::Uuid::new_v4().to_string()).collect();
        let (status, _) = app
            .call(Method::POST, "/api/v1/ml/batch-predict", Some(&alice), Some(json!({ "imageIds": too_many })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_batch_reports_individual_failures() {
        let app = spawn_app().await;
        let (_, token) = app.farmer("partial@example.com").await;
        let id = app.upload_png(&token).await["id"].as_str().unwrap().to_string();
        app.ml.fail_predict.store(true, Ordering::SeqCst);

        let (status, body) = app
            .call(Method::POST, "/api/v1/ml/batch-predict", Some(&token), Some(json!({ "imageIds": [id] })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["failed"], 1);
        assert_eq!(body["data"]["results"][0]["status"], "rejected");
        assert_eq!(body["data"]["results"][0]["error"], "ML prediction failed");
    }
}
