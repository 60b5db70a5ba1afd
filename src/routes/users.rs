use axum::{
    extract::State,
    routing::{get, patch},
    Router,
};
use serde::Deserialize;

use crate::{
    auth::{AuthUser, RequireAdmin},
    error::AppResult,
    extract::{AppJson, AppPath},
    middleware::validation::validate_uuid,
    models::UserWithProfiles,
    response::ApiResponse,
    services::users::{self, DeletedUser, StatusChange},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(my_profile))
        .route("/{id}", get(get_user).delete(delete_user))
        .route("/{id}/status", patch(update_status))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub is_active: bool,
}

pub async fn my_profile(State(state): State<AppState>, caller: AuthUser) -> AppResult<ApiResponse<UserWithProfiles>> {
    let profile = users::get_profile(&state.db, &caller.user_id).await?;
    Ok(ApiResponse::ok("Profile retrieved successfully", profile))
}

pub async fn get_user(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    AppPath(id): AppPath<String>,
) -> AppResult<ApiResponse<UserWithProfiles>> {
    validate_uuid("id", &id)?;
    let user = users::get_user(&state.db, &id).await?;
    Ok(ApiResponse::ok("User retrieved successfully", user))
}

pub async fn update_status(
    State(state): State<AppState>,
    RequireAdmin(caller): RequireAdmin,
    AppPath(id): AppPath<String>,
    AppJson(req): AppJson<StatusRequest>,
) -> AppResult<ApiResponse<StatusChange>> {
    validate_uuid("id", &id)?;
    let changed = users::set_status(&state.db, &id, req.is_active).await?;
    tracing::info!(admin_id = %caller.user_id, user_id = %changed.id, is_active = changed.is_active, "User status changed");
    let message = if changed.is_active { "User activated successfully" } else { "User deactivated successfully" };
    Ok(ApiResponse::ok(message, changed))
}

pub async fn delete_user(
    State(state): State<AppState>,
    RequireAdmin(caller): RequireAdmin,
    AppPath(id): AppPath<String>,
) -> AppResult<ApiResponse<DeletedUser>> {
    validate_uuid("id", &id)?;
    let deleted = users::soft_delete(&state.db, &id).await?;
    tracing::info!(admin_id = %caller.user_id, user_id = %deleted.id, "User soft-deleted");
    Ok(ApiResponse::ok("User deleted successfully", deleted))
}
