use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::{like_pattern, non_blank};
use crate::error::{AppError, AppResult};
use crate::models::{Disease, DiseaseRow, DiseaseSummary, HistoryEntry, Severity};
use crate::response::{PageMeta, Pagination};

const DISEASE_COLUMNS: &str = "id, name, scientific_name, description, symptoms, causes, treatment, prevention, \
     severity, crops, is_active, created_at, updated_at";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiseaseQuery {
    pub severity: Option<Severity>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Active catalog entries ordered by name.
pub async fn list_diseases(db: &SqlitePool, query: &DiseaseQuery) -> AppResult<Vec<Disease>> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM diseases WHERE is_active = 1", DISEASE_COLUMNS));
    if let Some(severity) = query.severity {
        qb.push(" AND severity = ").push_bind(severity.as_str());
    }
    if let Some(term) = non_blank(query.search.as_deref()) {
        let pattern = like_pattern(term);
        qb.push(" AND (LOWER(name) LIKE LOWER(")
            .push_bind(pattern.clone())
            .push(") ESCAPE '\\' OR LOWER(COALESCE(description, '')) LIKE LOWER(")
            .push_bind(pattern)
            .push(") ESCAPE '\\')");
    }
    qb.push(" ORDER BY name ASC");
    let rows: Vec<DiseaseRow> = qb.build_query_as().fetch_all(db).await?;
    Ok(rows.into_iter().map(Disease::from).collect())
}

pub async fn get_disease(db: &SqlitePool, id: &str) -> AppResult<Disease> {
    let row: Option<DiseaseRow> =
        sqlx::query_as(&format!("SELECT {} FROM diseases WHERE id = ?", DISEASE_COLUMNS))
            .bind(id)
            .fetch_optional(db)
            .await?;
    row.map(Disease::from).ok_or_else(|| AppError::NotFound("Disease not found".to_string()))
}

/// Case-insensitive exact name lookup among active entries.
pub async fn find_active_by_name(db: &SqlitePool, name: &str) -> AppResult<Option<DiseaseSummary>> {
    let row = sqlx::query_as::<_, DiseaseSummary>(
        "SELECT id, name, severity FROM diseases WHERE LOWER(name) = LOWER(?) AND is_active = 1 LIMIT 1",
    )
    .bind(name.trim())
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// A user's detections, newest first.
pub async fn history_for(
    db: &SqlitePool,
    user_id: &str,
    query: &HistoryQuery,
) -> AppResult<(Vec<HistoryEntry>, PageMeta)> {
    let paging = Pagination::from_query(query.page, query.limit)?;
    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM disease_history WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(db)
        .await?;

    let rows: Vec<HistoryEntry> = sqlx::query_as(
        "SELECT h.id, h.disease_id, d.name AS disease_name, d.severity, h.image_id, h.prediction_id, \
            h.confidence, h.detected_at \
         FROM disease_history h JOIN diseases d ON d.id = h.disease_id \
         WHERE h.user_id = ? ORDER BY h.detected_at DESC, h.id ASC LIMIT ? OFFSET ?",
    )
    .bind(user_id)
    .bind(paging.limit)
    .bind(paging.offset())
    .fetch_all(db)
    .await?;

    Ok((rows, paging.meta(total)))
}
