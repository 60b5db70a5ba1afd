use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

use crate::error::AppError;
use crate::models::Role;
use crate::state::AppState;

/// The authenticated caller. Extracting it verifies the bearer token and
/// re-checks that the account is still active.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_role(&self, allowed: &[Role]) -> Result<(), AppError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            tracing::debug!(user_id = %self.user_id, role = %self.role, "Role not permitted");
            Err(AppError::Forbidden("Insufficient permissions".to_string()))
        }
    }

    /// Owners and admins may touch a resource; everyone else gets 403.
    pub fn ensure_owner_or_admin(&self, owner_id: &str) -> Result<(), AppError> {
        if self.is_admin() || self.user_id == owner_id {
            Ok(())
        } else {
            Err(AppError::Forbidden("Access denied".to_string()))
        }
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| AppError::Unauthorized("Access token is required".to_string()))?;
        let claims = state.tokens.verify_access(token)?;

        let row: Option<(String, String, String)> =
            sqlx::query_as("SELECT id, email, role FROM users WHERE id = ? AND is_active = 1 AND is_deleted = 0")
                .bind(&claims.sub)
                .fetch_optional(&state.db)
                .await?;
        let (user_id, email, role) =
            row.ok_or_else(|| AppError::Unauthorized("User not found or inactive".to_string()))?;
        let role = Role::parse(&role)
            .ok_or_else(|| AppError::Unauthorized("User not found or inactive".to_string()))?;

        Ok(AuthUser { user_id, email, role })
    }
}

macro_rules! role_extractor {
    ($(#[$meta:meta])* $name:ident, [$($role:expr),+]) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name(pub AuthUser);

        impl FromRequestParts<AppState> for $name {
            type Rejection = AppError;

            async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
                let user = AuthUser::from_request_parts(parts, state).await?;
                user.require_role(&[$($role),+])?;
                Ok($name(user))
            }
        }
    };
}

role_extractor!(
    /// Admins only.
    RequireAdmin,
    [Role::Admin]
);
role_extractor!(
    /// Farmers only.
    RequireFarmer,
    [Role::Farmer]
);
role_extractor!(
    /// Any account role (admin or farmer).
    RequireMember,
    [Role::Admin, Role::Farmer]
);
