use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};

use crate::{
    auth::{AuthUser, RequireAdmin, TokenKind},
    error::{AppError, AppResult},
    extract::{AppJson, AppQuery},
    models::{AdminProfileInput, FarmerProfileInput, UserDto, UserWithProfiles},
    response::ApiResponse,
    services::users::{self, NewAccount, ProfileUpdate, UserListQuery},
    state::AppState,
};

pub const REFRESH_COOKIE: &str = "refreshToken";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register/farmer", post(register_farmer))
        .route("/login", post(login))
        .route("/refresh-token", post(refresh_token))
        .route("/logout", post(logout))
        .route("/profile", get(get_profile).put(update_profile))
        .route("/change-password", post(change_password))
        .route("/deactivate", post(deactivate))
        .route("/register/admin", post(register_admin))
        .route("/users", get(list_users))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterFarmerRequest {
    #[serde(flatten)]
    pub account: NewAccount,
    pub farmer_profile: FarmerProfileInput,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAdminRequest {
    #[serde(flatten)]
    pub account: NewAccount,
    #[serde(default)]
    pub admin_profile: AdminProfileInput,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    pub access_token: String,
    pub refresh_token: String,
    pub need_password_change: bool,
    pub user: UserDto,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenData {
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

fn refresh_cookie(state: &AppState, value: String) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, value))
        .http_only(true)
        .secure(state.config.server.production)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

pub async fn register_farmer(
    State(state): State<AppState>,
    AppJson(req): AppJson<RegisterFarmerRequest>,
) -> AppResult<ApiResponse<UserWithProfiles>> {
    let user = users::register_farmer(&state.db, req.account, req.farmer_profile).await?;
    state.metrics.inc_users_registered();
    Ok(ApiResponse::created("Farmer registered successfully", user))
}

pub async fn register_admin(
    State(state): State<AppState>,
    RequireAdmin(caller): RequireAdmin,
    AppJson(req): AppJson<RegisterAdminRequest>,
) -> AppResult<ApiResponse<UserWithProfiles>> {
    let user = users::register_admin(&state.db, req.account, req.admin_profile, false).await?;
    state.metrics.inc_users_registered();
    tracing::info!(created_by = %caller.user_id, user_id = %user.user.id, "Admin account created");
    Ok(ApiResponse::created("Admin registered successfully", user))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(req): AppJson<LoginRequest>,
) -> AppResult<(CookieJar, ApiResponse<LoginData>)> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::ValidationError {
            field: "email".to_string(),
            message: "Email and password are required".to_string(),
        });
    }

    let user = match users::authenticate(&state.db, &req.email, &req.password).await {
        Ok(user) => {
            state.metrics.record_login(true);
            user
        }
        Err(e) => {
            state.metrics.record_login(false);
            return Err(e);
        }
    };

    let pair = state.tokens.issue_pair(&user.id, &user.email, user.role()?)?;
    let jar = jar.add(refresh_cookie(&state, pair.refresh_token.clone()));
    tracing::info!(user_id = %user.id, "User logged in");

    let data = LoginData {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        need_password_change: user.need_password_change,
        user: user.into(),
    };
    Ok((jar, ApiResponse::ok("Login successful", data)))
}

/// Accepts the refresh token from the cookie, or from `{refreshToken}` in the body.
pub async fn refresh_token(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> AppResult<ApiResponse<AccessTokenData>> {
    let from_body = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<RefreshRequest>(&body).ok().and_then(|r| r.refresh_token)
    };
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
        .or(from_body)
        .ok_or_else(|| AppError::Unauthorized("Refresh token is required".to_string()))?;

    let claims = state.tokens.verify_refresh(&token)?;
    let user = users::find_active_by_id(&state.db, &claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found or inactive".to_string()))?;
    let access_token = state.tokens.issue(&user.id, &user.email, user.role()?, TokenKind::Access)?;

    Ok(ApiResponse::ok("Access token generated successfully!", AccessTokenData { access_token }))
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, ApiResponse<()>) {
    let jar = jar.remove(refresh_cookie(&state, String::new()));
    (jar, ApiResponse::message("Logged out successfully"))
}

pub async fn get_profile(
    State(state): State<AppState>,
    caller: AuthUser,
) -> AppResult<ApiResponse<UserWithProfiles>> {
    let profile = users::get_profile(&state.db, &caller.user_id).await?;
    Ok(ApiResponse::ok("Profile retrieved successfully", profile))
}

pub async fn update_profile(
    State(state): State<AppState>,
    caller: AuthUser,
    AppJson(update): AppJson<ProfileUpdate>,
) -> AppResult<ApiResponse<UserWithProfiles>> {
    let profile = users::update_profile(&state.db, &caller.user_id, update).await?;
    Ok(ApiResponse::ok("Profile updated successfully", profile))
}

pub async fn change_password(
    State(state): State<AppState>,
    caller: AuthUser,
    AppJson(req): AppJson<ChangePasswordRequest>,
) -> AppResult<ApiResponse<()>> {
    if req.current_password.is_empty() {
        return Err(AppError::ValidationError {
            field: "currentPassword".to_string(),
            message: "Current password is required".to_string(),
        });
    }
    if req.confirm_password != req.new_password {
        return Err(AppError::ValidationError {
            field: "confirmPassword".to_string(),
            message: "Passwords do not match".to_string(),
        });
    }
    users::change_password(&state.db, &caller.user_id, &req.current_password, &req.new_password).await?;
    Ok(ApiResponse::message("Password changed successfully"))
}

pub async fn deactivate(State(state): State<AppState>, caller: AuthUser) -> AppResult<ApiResponse<()>> {
    users::deactivate(&state.db, &caller.user_id).await?;
    Ok(ApiResponse::message("Account deactivated successfully"))
}

pub async fn list_users(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    AppQuery(query): AppQuery<UserListQuery>,
) -> AppResult<ApiResponse<Vec<UserDto>>> {
    let (users, meta) = users::list_users(&state.db, &query).await?;
    Ok(ApiResponse::paged("Users retrieved successfully", users, meta))
}
