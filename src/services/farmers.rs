use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

use super::users::{active_members_where, find_active_by_id, get_member, list_members, load_profiles};
use super::MemberListQuery;
use crate::db;
use crate::error::{AppError, AppResult};
use crate::models::{FarmerProfileInput, Role, UserWithProfiles};
use crate::response::PageMeta;

const FARMER_SORTS: &[(&str, &str)] = &[
    ("name", "u.name"),
    ("email", "u.email"),
    ("createdAt", "u.created_at"),
    ("lastLoginAt", "u.last_login_at"),
    ("farmSize", "p.farm_size"),
    ("farmingExperience", "p.farming_experience"),
];

const TOP_CROP_LIMIT: i64 = 10;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SoilTypeCount {
    pub soil_type: Option<String>,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct IrrigationTypeCount {
    pub irrigation_type: Option<String>,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CropTypeCount {
    pub crop_type: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmerStats {
    pub total_farmers: i64,
    pub active_farmers: i64,
    pub inactive_farmers: i64,
    pub by_soil_type: Vec<SoilTypeCount>,
    pub by_irrigation_type: Vec<IrrigationTypeCount>,
    pub top_crop_types: Vec<CropTypeCount>,
}

/// Partial update of the caller's farmer profile. Absent fields stay unchanged.
pub async fn update_farmer_profile(
    db: &SqlitePool,
    user_id: &str,
    input: FarmerProfileInput,
) -> AppResult<UserWithProfiles> {
    let user = find_active_by_id(db, user_id)
        .await?
        .filter(|u| u.role == Role::Farmer.as_str())
        .ok_or_else(|| AppError::NotFound("Farmer not found".to_string()))?;
    // A missing profile row is created here, so it needs its crop list
    let has_profile: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM farmer_profiles WHERE user_id = ?)")
        .bind(&user.id)
        .fetch_one(db)
        .await?;
    input.validate(!has_profile)?;

    let crops = match input.normalized_crops() {
        Some(crops) => Some(serde_json::to_string(&crops)?),
        None => None,
    };
    let now = db::now();
    sqlx::query(
        "INSERT INTO farmer_profiles (id, user_id, crop_types, farm_size, farming_experience, farm_location, \
            soil_type, irrigation_type, created_at, updated_at) \
         VALUES (?, ?, COALESCE(?, '[]'), ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(user_id) DO UPDATE SET \
            crop_types = COALESCE(?, farmer_profiles.crop_types), \
            farm_size = COALESCE(excluded.farm_size, farmer_profiles.farm_size), \
            farming_experience = COALESCE(excluded.farming_experience, farmer_profiles.farming_experience), \
            farm_location = COALESCE(excluded.farm_location, farmer_profiles.farm_location), \
            soil_type = COALESCE(excluded.soil_type, farmer_profiles.soil_type), \
            irrigation_type = COALESCE(excluded.irrigation_type, farmer_profiles.irrigation_type), \
            updated_at = excluded.updated_at",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&user.id)
    .bind(crops.as_deref())
    .bind(input.farm_size)
    .bind(input.farming_experience)
    .bind(input.farm_location.as_deref().map(str::trim))
    .bind(input.soil_type.map(|s| s.as_str()))
    .bind(input.irrigation_type.map(|i| i.as_str()))
    .bind(&now)
    .bind(&now)
    .bind(crops.as_deref())
    .execute(db)
    .await?;

    tracing::info!(user_id = %user.id, "Farmer profile updated");
    load_profiles(db, user).await
}

pub async fn list_farmers(db: &SqlitePool, query: &MemberListQuery) -> AppResult<(Vec<UserWithProfiles>, PageMeta)> {
    list_members(db, Role::Farmer, "farmer_profiles", FARMER_SORTS, query).await
}

pub async fn farmer_stats(db: &SqlitePool) -> AppResult<FarmerStats> {
    let (total, active): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COALESCE(SUM(is_active), 0) FROM users WHERE role = 'FARMER' AND is_deleted = 0",
    )
    .fetch_one(db)
    .await?;

    let by_soil_type: Vec<SoilTypeCount> = sqlx::query_as(
        "SELECT p.soil_type AS soil_type, COUNT(*) AS count FROM farmer_profiles p \
         JOIN users u ON u.id = p.user_id WHERE u.is_deleted = 0 \
         GROUP BY p.soil_type ORDER BY count DESC, p.soil_type ASC",
    )
    .fetch_all(db)
    .await?;

    let by_irrigation_type: Vec<IrrigationTypeCount> = sqlx::query_as(
        "SELECT p.irrigation_type AS irrigation_type, COUNT(*) AS count FROM farmer_profiles p \
         JOIN users u ON u.id = p.user_id WHERE u.is_deleted = 0 \
         GROUP BY p.irrigation_type ORDER BY count DESC, p.irrigation_type ASC",
    )
    .fetch_all(db)
    .await?;

    let top_crop_types: Vec<CropTypeCount> = sqlx::query_as(
        "SELECT LOWER(j.value) AS crop_type, COUNT(*) AS count FROM farmer_profiles p \
         JOIN users u ON u.id = p.user_id \
         JOIN json_each(p.crop_types) j \
         WHERE u.is_deleted = 0 \
         GROUP BY LOWER(j.value) ORDER BY count DESC, crop_type ASC LIMIT ?",
    )
    .bind(TOP_CROP_LIMIT)
    .fetch_all(db)
    .await?;

    Ok(FarmerStats {
        total_farmers: total,
        active_farmers: active,
        inactive_farmers: total - active,
        by_soil_type,
        by_irrigation_type,
        top_crop_types,
    })
}

/// Active farmers whose crop list contains `crop_type` (case-insensitive).
pub async fn farmers_by_crop(db: &SqlitePool, crop_type: &str, limit: Option<i64>) -> AppResult<Vec<UserWithProfiles>> {
    let crop_type = crop_type.trim();
    if crop_type.is_empty() {
        return Err(AppError::ValidationError {
            field: "cropType".to_string(),
            message: "Crop type is required".to_string(),
        });
    }
    active_members_where(
        db,
        Role::Farmer,
        "farmer_profiles",
        "EXISTS (SELECT 1 FROM json_each(p.crop_types) WHERE LOWER(json_each.value) = LOWER(?))",
        crop_type.to_string(),
        limit,
    )
    .await
}

pub async fn get_farmer(db: &SqlitePool, user_id: &str) -> AppResult<UserWithProfiles> {
    get_member(db, Role::Farmer, user_id, "Farmer").await
}
