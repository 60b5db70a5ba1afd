use axum::{extract::State, routing::get, Router};

use super::admins::LimitQuery;
use crate::{
    auth::{RequireAdmin, RequireFarmer},
    error::AppResult,
    extract::{AppJson, AppPath, AppQuery},
    models::{FarmerProfileInput, UserWithProfiles},
    response::ApiResponse,
    services::{
        farmers::{self, FarmerStats},
        MemberListQuery,
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_farmers).patch(update_my_profile))
        .route("/stats", get(stats))
        .route("/crop/{crop_type}", get(by_crop))
        .route("/{user_id}", get(get_farmer))
}

pub async fn update_my_profile(
    State(state): State<AppState>,
    RequireFarmer(caller): RequireFarmer,
    AppJson(input): AppJson<FarmerProfileInput>,
) -> AppResult<ApiResponse<UserWithProfiles>> {
    let farmer = farmers::update_farmer_profile(&state.db, &caller.user_id, input).await?;
    Ok(ApiResponse::ok("Farmer profile updated successfully", farmer))
}

pub async fn list_farmers(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    AppQuery(query): AppQuery<MemberListQuery>,
) -> AppResult<ApiResponse<Vec<UserWithProfiles>>> {
    let (farmers, meta) = farmers::list_farmers(&state.db, &query).await?;
    Ok(ApiResponse::paged("Farmers retrieved successfully", farmers, meta))
}

pub async fn stats(State(state): State<AppState>, RequireAdmin(_): RequireAdmin) -> AppResult<ApiResponse<FarmerStats>> {
    let stats = farmers::farmer_stats(&state.db).await?;
    Ok(ApiResponse::ok("Farmers statistics retrieved successfully", stats))
}

pub async fn by_crop(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    AppPath(crop_type): AppPath<String>,
    AppQuery(query): AppQuery<LimitQuery>,
) -> AppResult<ApiResponse<Vec<UserWithProfiles>>> {
    let farmers = farmers::farmers_by_crop(&state.db, &crop_type, query.limit).await?;
    let message = format!("Farmers with crop type '{}' retrieved successfully", crop_type.trim());
    Ok(ApiResponse::ok(message, farmers))
}

pub async fn get_farmer(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    AppPath(user_id): AppPath<String>,
) -> AppResult<ApiResponse<UserWithProfiles>> {
    let farmer = farmers::get_farmer(&state.db, &user_id).await?;
    Ok(ApiResponse::ok("Farmer retrieved successfully", farmer))
}
