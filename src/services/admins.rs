use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

use super::users::{active_members_where, find_active_by_id, get_member, list_members, load_profiles};
use super::MemberListQuery;
use crate::db;
use crate::error::{AppError, AppResult};
use crate::models::{AdminProfileInput, Role, UserWithProfiles};
use crate::response::PageMeta;

const ADMIN_SORTS: &[(&str, &str)] = &[
    ("name", "u.name"),
    ("email", "u.email"),
    ("createdAt", "u.created_at"),
    ("lastLoginAt", "u.last_login_at"),
    ("department", "p.department"),
    ("designation", "p.designation"),
];

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DepartmentCount {
    pub department: Option<String>,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total_admins: i64,
    pub active_admins: i64,
    pub inactive_admins: i64,
    pub by_department: Vec<DepartmentCount>,
}

pub async fn list_admins(db: &SqlitePool, query: &MemberListQuery) -> AppResult<(Vec<UserWithProfiles>, PageMeta)> {
    list_members(db, Role::Admin, "admin_profiles", ADMIN_SORTS, query).await
}

pub async fn admin_stats(db: &SqlitePool) -> AppResult<AdminStats> {
    let (total, active): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COALESCE(SUM(is_active), 0) FROM users WHERE role = 'ADMIN' AND is_deleted = 0",
    )
    .fetch_one(db)
    .await?;

    let by_department: Vec<DepartmentCount> = sqlx::query_as(
        "SELECT p.department AS department, COUNT(*) AS count FROM admin_profiles p \
         JOIN users u ON u.id = p.user_id WHERE u.is_deleted = 0 \
         GROUP BY p.department ORDER BY count DESC, p.department ASC",
    )
    .fetch_all(db)
    .await?;

    Ok(AdminStats { total_admins: total, active_admins: active, inactive_admins: total - active, by_department })
}

pub async fn get_admin(db: &SqlitePool, user_id: &str) -> AppResult<UserWithProfiles> {
    get_member(db, Role::Admin, user_id, "Admin").await
}

/// Active admins whose department matches case-insensitively.
pub async fn admins_by_department(
    db: &SqlitePool,
    department: &str,
    limit: Option<i64>,
) -> AppResult<Vec<UserWithProfiles>> {
    let department = department.trim();
    if department.is_empty() {
        return Err(AppError::ValidationError {
            field: "department".to_string(),
            message: "Department is required".to_string(),
        });
    }
    active_members_where(
        db,
        Role::Admin,
        "admin_profiles",
        "LOWER(p.department) = LOWER(?)",
        department.to_string(),
        limit,
    )
    .await
}

/// Updates the caller's admin profile, creating it if the account predates profiles.
pub async fn update_admin_profile(
    db: &SqlitePool,
    user_id: &str,
    input: AdminProfileInput,
) -> AppResult<UserWithProfiles> {
    let user = find_active_by_id(db, user_id)
        .await?
        .filter(|u| u.role == Role::Admin.as_str())
        .ok_or_else(|| AppError::NotFound("Admin not found".to_string()))?;

    let now = db::now();
    sqlx::query(
        "INSERT INTO admin_profiles (id, user_id, department, designation, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?) \
         ON CONFLICT(user_id) DO UPDATE SET \
            department = COALESCE(excluded.department, admin_profiles.department), \
            designation = COALESCE(excluded.designation, admin_profiles.designation), \
            updated_at = excluded.updated_at",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&user.id)
    .bind(input.department.as_deref().map(str::trim))
    .bind(input.designation.as_deref().map(str::trim))
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await?;

    tracing::info!(user_id = %user.id, "Admin profile updated");
    load_profiles(db, user).await
}
