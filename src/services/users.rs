use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use super::{like_pattern, non_blank, resolve_sort, MemberListQuery, USER_COLUMNS_U};
use crate::auth::{hash_password, verify_password};
use crate::db;
use crate::error::{validation, AppError, AppResult, OptionExt};
use crate::models::{
    AdminProfile, AdminProfileInput, FarmerProfile, FarmerProfileInput, FarmerProfileRow, Role, UserDto, UserRow,
    UserWithProfiles,
};
use crate::response::{PageMeta, Pagination};

const USER_COLUMNS: &str = "id, email, password_hash, name, phone, address, photo, role, is_active, is_deleted, \
     need_password_change, last_login_at, created_at, updated_at";

const FARMER_PROFILE_COLUMNS: &str = "id, user_id, crop_types, farm_size, farming_experience, farm_location, \
     soil_type, irrigation_type, created_at, updated_at";

const ADMIN_PROFILE_COLUMNS: &str = "id, user_id, department, designation, created_at, updated_at";

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Account fields shared by farmer and admin registration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub photo: Option<String>,
}

impl NewAccount {
    pub fn validate(&self) -> AppResult<()> {
        validation::validate_email(self.email.trim())?;
        validation::validate_password("password", &self.password)?;
        validation::validate_name(&self.name)?;
        if let Some(phone) = self.phone.as_deref() {
            validation::validate_phone(phone.trim())?;
        }
        if let Some(photo) = self.photo.as_deref() {
            validation::validate_url("photo", photo.trim())?;
        }
        Ok(())
    }
}

/// Body of `PUT /auth/profile`. Absent fields stay unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub photo: Option<String>,
}

impl ProfileUpdate {
    pub fn validate(&self) -> AppResult<()> {
        if let Some(name) = self.name.as_deref() {
            validation::validate_name(name)?;
        }
        if let Some(phone) = self.phone.as_deref() {
            validation::validate_phone(phone.trim())?;
        }
        if let Some(photo) = self.photo.as_deref() {
            validation::validate_url("photo", photo.trim())?;
        }
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.name.is_none() && self.phone.is_none() && self.address.is_none() && self.photo.is_none()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub role: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub id: String,
    pub email: String,
    pub name: String,
    pub is_active: bool,
    pub role: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletedUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: String,
}

pub async fn find_by_id(db: &SqlitePool, id: &str) -> AppResult<Option<UserRow>> {
    let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(row)
}

/// Users that may sign in: active and not deleted.
pub async fn find_active_by_email(db: &SqlitePool, email: &str) -> AppResult<Option<UserRow>> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {} FROM users WHERE email = ? AND is_active = 1 AND is_deleted = 0",
        USER_COLUMNS
    ))
    .bind(normalize_email(email))
    .fetch_optional(db)
    .await?;
    Ok(row)
}

pub async fn find_active_by_id(db: &SqlitePool, id: &str) -> AppResult<Option<UserRow>> {
    Ok(find_by_id(db, id).await?.filter(|u| u.is_active && !u.is_deleted))
}

pub async fn email_exists(db: &SqlitePool, email: &str) -> AppResult<bool> {
    let found: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind(normalize_email(email))
        .fetch_optional(db)
        .await?;
    Ok(found.is_some())
}

/// Attaches whichever profiles exist for `user`.
pub async fn load_profiles(db: &SqlitePool, user: UserRow) -> AppResult<UserWithProfiles> {
    let mut all = load_profiles_for(db, vec![user]).await?;
    all.pop().ok_or_else(|| AppError::Internal(anyhow::anyhow!("profile lookup lost its user row")))
}

/// Batch variant of [`load_profiles`]; two `IN` queries regardless of list size. Order is preserved.
pub async fn load_profiles_for(db: &SqlitePool, users: Vec<UserRow>) -> AppResult<Vec<UserWithProfiles>> {
    if users.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM farmer_profiles WHERE user_id IN (",
        FARMER_PROFILE_COLUMNS
    ));
    let mut sep = qb.separated(", ");
    for u in &users {
        sep.push_bind(u.id.clone());
    }
    sep.push_unseparated(")");
    let farmer_rows: Vec<FarmerProfileRow> = qb.build_query_as().fetch_all(db).await?;
    let mut farmers: HashMap<String, FarmerProfile> =
        farmer_rows.into_iter().map(|r| (r.user_id.clone(), FarmerProfile::from(r))).collect();

    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM admin_profiles WHERE user_id IN (",
        ADMIN_PROFILE_COLUMNS
    ));
    let mut sep = qb.separated(", ");
    for u in &users {
        sep.push_bind(u.id.clone());
    }
    sep.push_unseparated(")");
    let admin_rows: Vec<AdminProfile> = qb.build_query_as().fetch_all(db).await?;
    let mut admins: HashMap<String, AdminProfile> =
        admin_rows.into_iter().map(|r| (r.user_id.clone(), r)).collect();

    Ok(users
        .into_iter()
        .map(|u| UserWithProfiles {
            farmer_profile: farmers.remove(&u.id),
            admin_profile: admins.remove(&u.id),
            user: UserDto::from(u),
        })
        .collect())
}

async fn insert_user(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    account: &NewAccount,
    password_hash: String,
    role: Role,
    need_password_change: bool,
) -> AppResult<String> {
    let id = Uuid::new_v4().to_string();
    let now = db::now();
    sqlx::query(
        "INSERT INTO users (id, email, password_hash, name, phone, address, photo, role, is_active, is_deleted, \
         need_password_change, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, 0, ?, ?, ?)",
    )
    .bind(&id)
    .bind(normalize_email(&account.email))
    .bind(password_hash)
    .bind(account.name.trim())
    .bind(account.phone.as_deref().map(str::trim))
    .bind(account.address.as_deref())
    .bind(account.photo.as_deref().map(str::trim))
    .bind(role.as_str())
    .bind(need_password_change)
    .bind(&now)
    .bind(&now)
    .execute(&mut **tx)
    .await?;
    Ok(id)
}

/// Creates a farmer account and its profile atomically.
pub async fn register_farmer(
    db: &SqlitePool,
    account: NewAccount,
    profile: FarmerProfileInput,
) -> AppResult<UserWithProfiles> {
    account.validate()?;
    profile.validate(true)?;
    let crops = serde_json::to_string(&profile.normalized_crops().unwrap_or_default())?;
    let password_hash = hash_password(&account.password).await?;

    let mut tx = db.begin().await?;
    let user_id = insert_user(&mut tx, &account, password_hash, Role::Farmer, false).await?;
    let now = db::now();
    sqlx::query(
        "INSERT INTO farmer_profiles (id, user_id, crop_types, farm_size, farming_experience, farm_location, \
         soil_type, irrigation_type, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&user_id)
    .bind(crops)
    .bind(profile.farm_size)
    .bind(profile.farming_experience)
    .bind(profile.farm_location.as_deref())
    .bind(profile.soil_type.map(|s| s.as_str()))
    .bind(profile.irrigation_type.map(|i| i.as_str()))
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(user_id = %user_id, "Registered farmer");
    let user = find_by_id(db, &user_id).await?.ok_or_not_found("User")?;
    load_profiles(db, user).await
}

/// Creates an admin account and its profile atomically.
pub async fn register_admin(
    db: &SqlitePool,
    account: NewAccount,
    profile: AdminProfileInput,
    need_password_change: bool,
) -> AppResult<UserWithProfiles> {
    account.validate()?;
    let password_hash = hash_password(&account.password).await?;

    let mut tx = db.begin().await?;
    let user_id = insert_user(&mut tx, &account, password_hash, Role::Admin, need_password_change).await?;
    let now = db::now();
    sqlx::query(
        "INSERT INTO admin_profiles (id, user_id, department, designation, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&user_id)
    .bind(profile.department.as_deref().map(str::trim))
    .bind(profile.designation.as_deref().map(str::trim))
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(user_id = %user_id, "Registered admin");
    let user = find_by_id(db, &user_id).await?.ok_or_not_found("User")?;
    load_profiles(db, user).await
}

/// Checks credentials against active accounts and records the sign-in.
/// Unknown emails and wrong passwords get the same answer.
pub async fn authenticate(db: &SqlitePool, email: &str, password: &str) -> AppResult<UserRow> {
    let rejected = || AppError::Unauthorized("Invalid credentials".to_string());
    let user = find_active_by_email(db, email).await?.ok_or_else(rejected)?;
    if !verify_password(password, &user.password_hash).await? {
        tracing::debug!(user_id = %user.id, "Password mismatch on login");
        return Err(rejected());
    }
    touch_last_login(db, &user.id).await?;
    Ok(user)
}

pub async fn touch_last_login(db: &SqlitePool, user_id: &str) -> AppResult<()> {
    let now = db::now();
    sqlx::query("UPDATE users SET last_login_at = ?, updated_at = ? WHERE id = ?")
        .bind(&now)
        .bind(&now)
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn get_profile(db: &SqlitePool, user_id: &str) -> AppResult<UserWithProfiles> {
    let user = find_active_by_id(db, user_id).await?.ok_or_not_found("User")?;
    load_profiles(db, user).await
}

pub async fn update_profile(db: &SqlitePool, user_id: &str, update: ProfileUpdate) -> AppResult<UserWithProfiles> {
    update.validate()?;
    let user = find_active_by_id(db, user_id).await?.ok_or_not_found("User")?;
    if update.is_empty() {
        return load_profiles(db, user).await;
    }

    sqlx::query(
        "UPDATE users SET name = COALESCE(?, name), phone = COALESCE(?, phone), address = COALESCE(?, address), \
         photo = COALESCE(?, photo), updated_at = ? WHERE id = ?",
    )
    .bind(update.name.as_deref().map(str::trim))
    .bind(update.phone.as_deref().map(str::trim))
    .bind(update.address.as_deref())
    .bind(update.photo.as_deref().map(str::trim))
    .bind(db::now())
    .bind(&user.id)
    .execute(db)
    .await?;

    get_profile(db, user_id).await
}

pub async fn change_password(db: &SqlitePool, user_id: &str, current: &str, new_password: &str) -> AppResult<()> {
    validation::validate_password("newPassword", new_password)?;
    let user = find_active_by_id(db, user_id).await?.ok_or_not_found("User")?;
    if !verify_password(current, &user.password_hash).await? {
        return Err(AppError::Unauthorized("Current password is incorrect".to_string()));
    }

    let hash = hash_password(new_password).await?;
    sqlx::query("UPDATE users SET password_hash = ?, need_password_change = 0, updated_at = ? WHERE id = ?")
        .bind(hash)
        .bind(db::now())
        .bind(user_id)
        .execute(db)
        .await?;
    tracing::info!(user_id = %user_id, "Password changed");
    Ok(())
}

pub async fn deactivate(db: &SqlitePool, user_id: &str) -> AppResult<()> {
    let res = sqlx::query("UPDATE users SET is_active = 0, updated_at = ? WHERE id = ? AND is_deleted = 0")
        .bind(db::now())
        .bind(user_id)
        .execute(db)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }
    tracing::info!(user_id = %user_id, "Account deactivated");
    Ok(())
}

fn push_user_filters<'a>(qb: &mut QueryBuilder<'a, Sqlite>, role: Option<Role>, search: Option<&str>) {
    if let Some(role) = role {
        qb.push(" AND role = ").push_bind(role.as_str());
    }
    if let Some(term) = search {
        let pattern = like_pattern(term);
        qb.push(" AND (LOWER(name) LIKE LOWER(")
            .push_bind(pattern.clone())
            .push(") ESCAPE '\\' OR LOWER(email) LIKE LOWER(")
            .push_bind(pattern)
            .push(") ESCAPE '\\')");
    }
}

/// Non-deleted users, newest first.
pub async fn list_users(db: &SqlitePool, query: &UserListQuery) -> AppResult<(Vec<UserDto>, PageMeta)> {
    let paging = Pagination::from_query(query.page, query.limit)?;
    let role = match non_blank(query.role.as_deref()) {
        Some(r) => Some(Role::parse(r).ok_or_else(|| AppError::ValidationError {
            field: "role".to_string(),
            message: "Role must be ADMIN or FARMER".to_string(),
        })?),
        None => None,
    };
    let search = non_blank(query.search.as_deref());

    let mut count_qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM users WHERE is_deleted = 0");
    push_user_filters(&mut count_qb, role, search);
    let total: i64 = count_qb.build_query_scalar().fetch_one(db).await?;

    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM users WHERE is_deleted = 0", USER_COLUMNS));
    push_user_filters(&mut qb, role, search);
    qb.push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(paging.limit)
        .push(" OFFSET ")
        .push_bind(paging.offset());
    let rows: Vec<UserRow> = qb.build_query_as().fetch_all(db).await?;

    Ok((rows.into_iter().map(UserDto::from).collect(), paging.meta(total)))
}

/// A non-deleted user by id, with profiles.
pub async fn get_user(db: &SqlitePool, id: &str) -> AppResult<UserWithProfiles> {
    let user = find_by_id(db, id).await?.filter(|u| !u.is_deleted).ok_or_not_found("User")?;
    load_profiles(db, user).await
}

pub async fn set_status(db: &SqlitePool, id: &str, is_active: bool) -> AppResult<StatusChange> {
    let res = sqlx::query("UPDATE users SET is_active = ?, updated_at = ? WHERE id = ? AND is_deleted = 0")
        .bind(is_active)
        .bind(db::now())
        .bind(id)
        .execute(db)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }
    let user = find_by_id(db, id).await?.ok_or_not_found("User")?;
    tracing::info!(user_id = %id, is_active, "User status changed");
    Ok(StatusChange { id: user.id, email: user.email, name: user.name, is_active: user.is_active, role: user.role })
}

/// Marks a user deleted and inactive and frees the email address. Calling it
/// again on a deleted user returns the stored record without changes.
pub async fn soft_delete(db: &SqlitePool, id: &str) -> AppResult<DeletedUser> {
    let user = find_by_id(db, id).await?.ok_or_not_found("User")?;
    if !user.is_deleted {
        let tombstone = format!("deleted_{}_{}", chrono::Utc::now().timestamp_millis(), user.email);
        sqlx::query(
            "UPDATE users SET is_deleted = 1, is_active = 0, email = ?, updated_at = ? WHERE id = ? AND is_deleted = 0",
        )
        .bind(tombstone)
        .bind(db::now())
        .bind(id)
        .execute(db)
        .await?;
        tracing::info!(user_id = %id, "User soft-deleted");
    }

    let user = find_by_id(db, id).await?.ok_or_not_found("User")?;
    Ok(DeletedUser { id: user.id, email: user.email, name: user.name, role: user.role })
}

fn push_member_filters(qb: &mut QueryBuilder<'_, Sqlite>, role: Role, query: &MemberListQuery) {
    qb.push(" WHERE u.role = ").push_bind(role.as_str()).push(" AND u.is_deleted = 0");
    if let Some(active) = query.is_active {
        qb.push(" AND u.is_active = ").push_bind(active);
    }
    if let Some(term) = non_blank(query.search.as_deref()) {
        let pattern = like_pattern(term);
        qb.push(" AND (");
        for (i, column) in ["u.name", "u.email", "u.phone", "u.address"].iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            qb.push(format!("LOWER(COALESCE({}, '')) LIKE LOWER(", column))
                .push_bind(pattern.clone())
                .push(") ESCAPE '\\'");
        }
        qb.push(")");
    }
    // Only farmer profiles carry a crop list
    let crop = if role == Role::Farmer { non_blank(query.crop_type.as_deref()) } else { None };
    if let Some(crop) = crop {
        qb.push(" AND EXISTS (SELECT 1 FROM json_each(p.crop_types) WHERE LOWER(json_each.value) = LOWER(")
            .push_bind(crop.to_string())
            .push("))");
    }
}

/// Paged directory of one role's non-deleted accounts, joined with its profile table as `p`.
///
/// `sorts` maps `sortBy` wire names to columns; see [`resolve_sort`].
pub(crate) async fn list_members(
    db: &SqlitePool,
    role: Role,
    profile_table: &'static str,
    sorts: &[(&str, &'static str)],
    query: &MemberListQuery,
) -> AppResult<(Vec<UserWithProfiles>, PageMeta)> {
    let paging = Pagination::from_query(query.page, query.limit)?;
    let from = format!(" FROM users u LEFT JOIN {} p ON p.user_id = u.id", profile_table);

    let mut count_qb = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*){}", from));
    push_member_filters(&mut count_qb, role, query);
    let total: i64 = count_qb.build_query_scalar().fetch_one(db).await?;

    let (column, order) = resolve_sort(sorts, query.sort_by.as_deref(), query.sort_order.as_deref());
    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {}{}", USER_COLUMNS_U, from));
    push_member_filters(&mut qb, role, query);
    qb.push(format!(" ORDER BY {} {}, u.id ASC LIMIT ", column, order.as_sql()))
        .push_bind(paging.limit)
        .push(" OFFSET ")
        .push_bind(paging.offset());
    let rows: Vec<UserRow> = qb.build_query_as().fetch_all(db).await?;

    Ok((load_profiles_for(db, rows).await?, paging.meta(total)))
}

/// Active accounts of `role` whose profile matches `condition` (a `p.` predicate with one bind), newest first.
pub(crate) async fn active_members_where(
    db: &SqlitePool,
    role: Role,
    profile_table: &'static str,
    condition: &str,
    value: String,
    limit: Option<i64>,
) -> AppResult<Vec<UserWithProfiles>> {
    let limit = limit.unwrap_or(crate::response::DEFAULT_LIMIT);
    if !(1..=crate::response::MAX_LIMIT).contains(&limit) {
        return Err(AppError::ValidationError {
            field: "limit".to_string(),
            message: format!("Limit must be between 1 and {}", crate::response::MAX_LIMIT),
        });
    }
    let sql = format!(
        "SELECT {} FROM users u JOIN {} p ON p.user_id = u.id \
         WHERE u.role = ? AND u.is_deleted = 0 AND u.is_active = 1 AND {} \
         ORDER BY u.created_at DESC LIMIT ?",
        USER_COLUMNS_U, profile_table, condition
    );
    let rows: Vec<UserRow> =
        sqlx::query_as(&sql).bind(role.as_str()).bind(value).bind(limit).fetch_all(db).await?;
    load_profiles_for(db, rows).await
}

/// A non-deleted account of `role`, or 404 "`entity` not found".
pub(crate) async fn get_member(db: &SqlitePool, role: Role, id: &str, entity: &str) -> AppResult<UserWithProfiles> {
    let user = find_by_id(db, id)
        .await?
        .filter(|u| !u.is_deleted && u.role == role.as_str())
        .ok_or_not_found(entity)?;
    load_profiles(db, user).await
}
