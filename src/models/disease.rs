use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DiseaseRow {
    pub id: String,
    pub name: String,
    pub scientific_name: Option<String>,
    pub description: Option<String>,
    pub symptoms: String,
    pub causes: String,
    pub treatment: Option<String>,
    pub prevention: Option<String>,
    pub severity: String,
    pub crops: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Disease {
    pub id: String,
    pub name: String,
    pub scientific_name: Option<String>,
    pub description: Option<String>,
    pub symptoms: Vec<String>,
    pub causes: Vec<String>,
    pub treatment: Option<String>,
    pub prevention: Option<String>,
    pub severity: String,
    pub crops: Vec<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

fn json_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

impl From<DiseaseRow> for Disease {
    fn from(row: DiseaseRow) -> Self {
        Self {
            symptoms: json_list(&row.symptoms),
            causes: json_list(&row.causes),
            crops: json_list(&row.crops),
            id: row.id,
            name: row.name,
            scientific_name: row.scientific_name,
            description: row.description,
            treatment: row.treatment,
            prevention: row.prevention,
            severity: row.severity,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DiseaseSummary {
    pub id: String,
    pub name: String,
    pub severity: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRow {
    pub id: String,
    pub image_id: String,
    pub disease_id: Option<String>,
    pub user_id: String,
    pub predicted_label: String,
    pub confidence: f64,
    pub is_healthy: bool,
    pub treatment: Option<String>,
    pub processing_time_seconds: Option<f64>,
    #[serde(skip)]
    pub raw_response: String,
    pub created_at: String,
}

/// A prediction with its linked catalog entry, if any.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionSummary {
    #[serde(flatten)]
    pub prediction: PredictionRow,
    pub disease: Option<DiseaseSummary>,
}

/// Row shape of the prediction/disease left join.
#[derive(Debug, Clone, FromRow)]
pub struct PredictionJoinRow {
    pub id: String,
    pub image_id: String,
    pub disease_id: Option<String>,
    pub user_id: String,
    pub predicted_label: String,
    pub confidence: f64,
    pub is_healthy: bool,
    pub treatment: Option<String>,
    pub processing_time_seconds: Option<f64>,
    pub raw_response: String,
    pub created_at: String,
    pub disease_name: Option<String>,
    pub disease_severity: Option<String>,
}

impl From<PredictionJoinRow> for PredictionSummary {
    fn from(row: PredictionJoinRow) -> Self {
        let disease = match (&row.disease_id, row.disease_name, row.disease_severity) {
            (Some(id), Some(name), Some(severity)) => Some(DiseaseSummary { id: id.clone(), name, severity }),
            _ => None,
        };
        Self {
            prediction: PredictionRow {
                id: row.id,
                image_id: row.image_id,
                disease_id: row.disease_id,
                user_id: row.user_id,
                predicted_label: row.predicted_label,
                confidence: row.confidence,
                is_healthy: row.is_healthy,
                treatment: row.treatment,
                processing_time_seconds: row.processing_time_seconds,
                raw_response: row.raw_response,
                created_at: row.created_at,
            },
            disease,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub disease_id: String,
    pub disease_name: String,
    pub severity: String,
    pub image_id: Option<String>,
    pub prediction_id: Option<String>,
    pub confidence: f64,
    pub detected_at: String,
}
