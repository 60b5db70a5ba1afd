use axum::{extract::State, routing::get, Router};
use serde::Deserialize;

use crate::{
    auth::RequireAdmin,
    error::AppResult,
    extract::{AppJson, AppPath, AppQuery},
    models::{AdminProfileInput, UserWithProfiles},
    response::ApiResponse,
    services::{
        admins::{self, AdminStats},
        MemberListQuery,
    },
    state::AppState,
};

/// Every route here is admin-only.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_admins).patch(update_my_profile))
        .route("/stats", get(stats))
        .route("/department/{department}", get(by_department))
        .route("/{user_id}", get(get_admin))
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

pub async fn list_admins(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    AppQuery(query): AppQuery<MemberListQuery>,
) -> AppResult<ApiResponse<Vec<UserWithProfiles>>> {
    let (admins, meta) = admins::list_admins(&state.db, &query).await?;
    Ok(ApiResponse::paged("Admins retrieved successfully", admins, meta))
}

pub async fn stats(State(state): State<AppState>, RequireAdmin(_): RequireAdmin) -> AppResult<ApiResponse<AdminStats>> {
    let stats = admins::admin_stats(&state.db).await?;
    Ok(ApiResponse::ok("Admins statistics retrieved successfully", stats))
}

pub async fn get_admin(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    AppPath(user_id): AppPath<String>,
) -> AppResult<ApiResponse<UserWithProfiles>> {
    let admin = admins::get_admin(&state.db, &user_id).await?;
    Ok(ApiResponse::ok("Admin retrieved successfully", admin))
}

pub async fn by_department(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    AppPath(department): AppPath<String>,
    AppQuery(query): AppQuery<LimitQuery>,
) -> AppResult<ApiResponse<Vec<UserWithProfiles>>> {
    let admins = admins::admins_by_department(&state.db, &department, query.limit).await?;
    let message = format!("Admins in '{}' department retrieved successfully", department.trim());
    Ok(ApiResponse::ok(message, admins))
}

pub async fn update_my_profile(
    State(state): State<AppState>,
    RequireAdmin(caller): RequireAdmin,
    AppJson(input): AppJson<AdminProfileInput>,
) -> AppResult<ApiResponse<UserWithProfiles>> {
    let admin = admins::update_admin_profile(&state.db, &caller.user_id, input).await?;
    Ok(ApiResponse::ok("Admin profile updated successfully", admin))
}
