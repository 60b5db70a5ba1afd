#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::{json, Value};

    use crate::tests::support::{spawn_app, TestApp, PASSWORD};

    async fn register(app: &TestApp, email: &str, name: &str, crops: Value, soil: &str) -> String {
        let (status, body) = app
            .call(
                Method::POST,
                "/api/v1/auth/register/farmer",
                None,
                Some(json!({
                    "email": email,
                    "password": PASSWORD,
                    "name": name,
                    "farmerProfile": { "cropTypes": crops, "soilType": soil, "farmSize": 1.5 }
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    fn names(body: &Value) -> Vec<String> {
        body["data"].as_array().unwrap().iter().map(|u| u["name"].as_str().unwrap().to_string()).collect()
    }

    #[tokio::test]
    async fn test_farmer_directory_filters_and_sorting() {
        let app = spawn_app().await;
        let (_, admin) = app.admin("root@example.com").await;
        register(&app, "zaman@example.com", "Zaman", json!(["Rice", "Jute"]), "clay").await;
        register(&app, "amina@example.com", "Amina", json!(["Wheat"]), "loamy").await;
        register(&app, "babul@example.com", "Babul", json!(["rice"]), "loamy").await;

        let (status, body) =
            app.call(Method::GET, "/api/v1/farmer?sortBy=name&sortOrder=asc", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(names(&body), vec!["Amina", "Babul", "Zaman"]);
        assert_eq!(body["meta"]["total"], 3);

        let (_, body) = app.call(Method::GET, "/api/v1/farmer?cropType=RICE&sortBy=name", Some(&admin), None).await;
        assert_eq!(names(&body), vec!["Zaman", "Babul"]);

        let (_, body) = app.call(Method::GET, "/api/v1/farmer?search=amina", Some(&admin), None).await;
        assert_eq!(names(&body), vec!["Amina"]);

        // Unknown sort keys fall back to newest first
        let (status, body) =
            app.call(Method::GET, "/api/v1/farmer?sortBy=passwordHash&sortOrder=asc", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(names(&body), vec!["Babul", "Amina", "Zaman"]);
    }

    #[tokio::test]
    async fn test_farmer_stats_and_crop_lookup() {
        let app = spawn_app().await;
        let (_, admin) = app.admin("root@example.com").await;
        register(&app, "a@example.com", "A", json!(["Rice", "Jute"]), "clay").await;
        register(&app, "b@example.com", "B", json!(["rice"]), "loamy").await;
        let inactive = register(&app, "c@example.com", "C", json!(["Rice"]), "loamy").await;
        app.call(
            Method::PATCH,
            &format!("/api/v1/user/{}/status", inactive),
            Some(&admin),
            Some(json!({ "isActive": false })),
        )
        .await;

        let (status, body) = app.call(Method::GET, "/api/v1/farmer/stats", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        let stats = &body["data"];
        assert_eq!(stats["totalFarmers"], 3);
        assert_eq!(stats["activeFarmers"], 2);
        assert_eq!(stats["inactiveFarmers"], 1);
        assert_eq!(stats["bySoilType"][0], json!({ "soilType": "loamy", "count": 2 }));
        assert_eq!(stats["topCropTypes"][0], json!({ "cropType": "rice", "count": 3 }));

        let (status, body) = app.call(Method::GET, "/api/v1/farmer/crop/Rice?limit=5", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Farmers with crop type 'Rice' retrieved successfully");
        assert_eq!(body["data"].as_array().unwrap().len(), 2);

        let (status, _) = app.call(Method::GET, "/api/v1/farmer/crop/Rice?limit=0", Some(&admin), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_farmer_by_id() {
        let app = spawn_app().await;
        let (admin_id, admin) = app.admin("root@example.com").await;
        let (farmer_id, _) = app.farmer("f@example.com").await;

        let (status, body) =
            app.call(Method::GET, &format!("/api/v1/farmer/{}", farmer_id), Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["farmerProfile"]["soilType"], "loamy");

        let (status, body) = app.call(Method::GET, &format!("/api/v1/farmer/{}", admin_id), Some(&admin), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Farmer not found");
    }

    #[tokio::test]
    async fn test_farmer_updates_own_profile() {
        let app = spawn_app().await;
        let (_, admin) = app.admin("root@example.com").await;
        let (_, farmer) = app.farmer("f@example.com").await;

        let (status, body) = app
            .call(
                Method::PATCH,
                "/api/v1/farmer",
                Some(&farmer),
                Some(json!({ "cropTypes": [" Maize ", ""], "irrigationType": "rainfed" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        let profile = &body["data"]["farmerProfile"];
        assert_eq!(profile["cropTypes"], json!(["Maize"]));
        assert_eq!(profile["irrigationType"], "rainfed");
        assert_eq!(profile["soilType"], "loamy");
        assert_eq!(profile["farmSize"], 2.5);

        let (status, _) = app
            .call(Method::PATCH, "/api/v1/farmer", Some(&farmer), Some(json!({ "farmSize": -1 })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app.call(Method::PATCH, "/api/v1/farmer", Some(&admin), Some(json!({}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app.call(Method::GET, "/api/v1/farmer", Some(&farmer), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_admin_directory() {
        let app = spawn_app().await;
        let (root_id, root) = app.admin("root@example.com").await;
        let (_, farmer) = app.farmer("f@example.com").await;
        let (status, _) = app
            .call(
                Method::POST,
                "/api/v1/auth/register/admin",
                Some(&root),
                Some(json!({
                    "email": "path@example.com",
                    "password": PASSWORD,
                    "name": "Pathologist",
                    "adminProfile": { "department": "Plant Pathology" }
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) =
            app.call(Method::GET, "/api/v1/admin?sortBy=department&sortOrder=asc", Some(&root), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["total"], 2);
        assert_eq!(body["data"][0]["adminProfile"]["department"], "Agronomy");

        let (_, body) = app.call(Method::GET, "/api/v1/admin/stats", Some(&root), None).await;
        assert_eq!(body["data"]["totalAdmins"], 2);
        assert_eq!(body["data"]["activeAdmins"], 2);
        assert_eq!(body["data"]["byDepartment"].as_array().unwrap().len(), 2);

        let (status, body) =
            app.call(Method::GET, "/api/v1/admin/department/plant%20pathology", Some(&root), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["email"], "path@example.com");

        let (status, body) = app.call(Method::GET, &format!("/api/v1/admin/{}", root_id), Some(&root), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["adminProfile"]["designation"], "Officer");

        let (status, _) = app.call(Method::GET, "/api/v1/admin", Some(&farmer), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_admin_updates_own_profile() {
        let app = spawn_app().await;
        let (_, root) = app.admin("root@example.com").await;

        let (status, body) = app
            .call(Method::PATCH, "/api/v1/admin", Some(&root), Some(json!({ "designation": "Director" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Admin profile updated successfully");
        assert_eq!(body["data"]["adminProfile"]["designation"], "Director");
        assert_eq!(body["data"]["adminProfile"]["department"], "Agronomy");
    }

    #[tokio::test]
    async fn test_admin_directory_filters() {
        let app = spawn_app().await;
        let (_, root) = app.admin("root@example.com").await;
        let (status, body) = app
            .call(
                Method::POST,
                "/api/v1/auth/register/admin",
                Some(&root),
                Some(json!({
                    "email": "path@example.com",
                    "password": PASSWORD,
                    "name": "Pathologist",
                    "adminProfile": { "department": "Plant Pathology" }
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let path_id = body["data"]["id"].as_str().unwrap().to_string();
        app.call(
            Method::PATCH,
            &format!("/api/v1/user/{}/status", path_id),
            Some(&root),
            Some(json!({ "isActive": false })),
        )
        .await;

        // Crop filters only narrow farmer listings
        let (status, body) = app.call(Method::GET, "/api/v1/admin?cropType=rice", Some(&root), None).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["meta"]["total"], 2);

        let (status, body) = app.call(Method::GET, "/api/v1/admin?isActive=false", Some(&root), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["total"], 1);
        assert_eq!(body["data"][0]["email"], "path@example.com");

        let (_, body) = app
            .call(Method::GET, "/api/v1/admin?search=ROOT&cropType=wheat&sortBy=email", Some(&root), None)
            .await;
        assert_eq!(body["meta"]["total"], 1);
        assert_eq!(body["data"][0]["email"], "root@example.com");

        let (status, body) = app.call(Method::GET, "/api/v1/admin?page=3&limit=1", Some(&root), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 0);
        assert_eq!(body["meta"]["totalPages"], 2);
        assert_eq!(body["meta"]["hasNextPage"], false);
        assert_eq!(body["meta"]["hasPrevPage"], true);

        let (status, body) =
            app.call(Method::GET, "/api/v1/farmer?page=9223372036854775807", Some(&root), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["details"]["field"], "page");
    }

    #[tokio::test]
    async fn test_missing_farmer_profile_needs_crops() {
        let app = spawn_app().await;
        let (farmer_id, farmer) = app.farmer("bare@example.com").await;
        sqlx::query("DELETE FROM farmer_profiles WHERE user_id = ?")
            .bind(&farmer_id)
            .execute(&app.state.db)
            .await
            .unwrap();

        let (status, body) = app
            .call(Method::PATCH, "/api/v1/farmer", Some(&farmer), Some(json!({ "soilType": "clay" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["details"]["field"], "cropTypes");
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM farmer_profiles")
            .fetch_one(&app.state.db)
            .await
            .unwrap();
        assert_eq!(rows, 0);

        let (status, body) = app
            .call(
                Method::PATCH,
                "/api/v1/farmer",
                Some(&farmer),
                Some(json!({ "soilType": "clay", "cropTypes": ["Potato"] })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["data"]["farmerProfile"]["cropTypes"], json!(["Potato"]));
    }
}
