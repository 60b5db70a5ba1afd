//! Database rows and the DTOs built from them.

pub mod disease;
pub mod image;
pub mod user;

pub use disease::{Disease, DiseaseRow, DiseaseSummary, HistoryEntry, PredictionRow, PredictionSummary, Severity};
pub use image::{ImageDto, ImageRow, ImageStats, ImageUrls, OwnerSummary, ProcessingStatus, StatusCount};
pub use user::{
    AdminProfile, AdminProfileInput, FarmerProfile, FarmerProfileInput, FarmerProfileRow, IrrigationType, Role,
    SoilType, UserDto, UserRow, UserWithProfiles,
};
