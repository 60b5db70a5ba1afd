use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Farmer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Farmer => "FARMER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ADMIN" => Some(Role::Admin),
            "FARMER" => Some(Role::Farmer),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoilType {
    Clay,
    Sandy,
    Loamy,
    Silt,
    Peat,
    Chalk,
}

impl SoilType {
    pub fn as_str(self) -> &'static str {
        match self {
            SoilType::Clay => "clay",
            SoilType::Sandy => "sandy",
            SoilType::Loamy => "loamy",
            SoilType::Silt => "silt",
            SoilType::Peat => "peat",
            SoilType::Chalk => "chalk",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IrrigationType {
    Drip,
    Sprinkler,
    Flood,
    Manual,
    Rainfed,
}

impl IrrigationType {
    pub fn as_str(self) -> &'static str {
        match self {
            IrrigationType::Drip => "drip",
            IrrigationType::Sprinkler => "sprinkler",
            IrrigationType::Flood => "flood",
            IrrigationType::Manual => "manual",
            IrrigationType::Rainfed => "rainfed",
        }
    }
}

/// A `users` row. Holds the password hash and therefore never leaves the service layer.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub photo: Option<String>,
    pub role: String,
    pub is_active: bool,
    pub is_deleted: bool,
    pub need_password_change: bool,
    pub last_login_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl UserRow {
    pub fn role(&self) -> AppResult<Role> {
        Role::parse(&self.role)
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown role '{}' for user {}", self.role, self.id)))
    }
}

/// Public view of a user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: String,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub photo: Option<String>,
    pub role: String,
    pub is_active: bool,
    pub need_password_change: bool,
    pub last_login_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<UserRow> for UserDto {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            name: row.name,
            phone: row.phone,
            address: row.address,
            photo: row.photo,
            role: row.role,
            is_active: row.is_active,
            need_password_change: row.need_password_change,
            last_login_at: row.last_login_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct FarmerProfileRow {
    pub id: String,
    pub user_id: String,
    pub crop_types: String,
    pub farm_size: Option<f64>,
    pub farming_experience: Option<i64>,
    pub farm_location: Option<String>,
    pub soil_type: Option<String>,
    pub irrigation_type: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmerProfile {
    pub id: String,
    pub user_id: String,
    pub crop_types: Vec<String>,
    pub farm_size: Option<f64>,
    pub farming_experience: Option<i64>,
    pub farm_location: Option<String>,
    pub soil_type: Option<String>,
    pub irrigation_type: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<FarmerProfileRow> for FarmerProfile {
    fn from(row: FarmerProfileRow) -> Self {
        let crop_types = serde_json::from_str(&row.crop_types).unwrap_or_else(|e| {
            tracing::warn!(profile_id = %row.id, "Unreadable crop_types column: {}", e);
            Vec::new()
        });
        Self {
            id: row.id,
            user_id: row.user_id,
            crop_types,
            farm_size: row.farm_size,
            farming_experience: row.farming_experience,
            farm_location: row.farm_location,
            soil_type: row.soil_type,
            irrigation_type: row.irrigation_type,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AdminProfile {
    pub id: String,
    pub user_id: String,
    pub department: Option<String>,
    pub designation: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A user together with whichever profile belongs to its role.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserWithProfiles {
    #[serde(flatten)]
    pub user: UserDto,
    pub farmer_profile: Option<FarmerProfile>,
    pub admin_profile: Option<AdminProfile>,
}

/// Farmer profile fields accepted on registration and update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmerProfileInput {
    pub crop_types: Option<Vec<String>>,
    pub farm_size: Option<f64>,
    pub farming_experience: Option<i64>,
    pub farm_location: Option<String>,
    pub soil_type: Option<SoilType>,
    pub irrigation_type: Option<IrrigationType>,
}

impl FarmerProfileInput {
    /// `require_crops` is set on registration, where at least one crop type is mandatory.
    pub fn validate(&self, require_crops: bool) -> AppResult<()> {
        match &self.crop_types {
            Some(crops) if crops.is_empty() || crops.iter().all(|c| c.trim().is_empty()) => {
                return Err(invalid("cropTypes", "At least one crop type is required"));
            }
            None if require_crops => return Err(invalid("cropTypes", "At least one crop type is required")),
            _ => {}
        }
        if let Some(size) = self.farm_size {
            if !size.is_finite() || size <= 0.0 {
                return Err(invalid("farmSize", "Farm size must be positive"));
            }
        }
        if let Some(exp) = self.farming_experience {
            if exp < 0 {
                return Err(invalid("farmingExperience", "Experience cannot be negative"));
            }
            if exp > 100 {
                return Err(invalid("farmingExperience", "Experience seems unrealistic"));
            }
        }
        Ok(())
    }

    /// Trimmed, non-empty crop names.
    pub fn normalized_crops(&self) -> Option<Vec<String>> {
        self.crop_types.as_ref().map(|crops| {
            crops.iter().map(|c| c.trim().to_string()).filter(|c| !c.is_empty()).collect()
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminProfileInput {
    pub department: Option<String>,
    pub designation: Option<String>,
}

fn invalid(field: &str, message: &str) -> AppError {
    AppError::ValidationError { field: field.to_string(), message: message.to_string() }
}
