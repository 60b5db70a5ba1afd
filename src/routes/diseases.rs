use axum::{extract::State, routing::get, Router};

use crate::{
    auth::AuthUser,
    error::AppResult,
    extract::{AppPath, AppQuery},
    models::{Disease, HistoryEntry},
    response::ApiResponse,
    services::diseases::{self, DiseaseQuery, HistoryQuery},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_diseases))
        .route("/history/me", get(my_history))
        .route("/{id}", get(get_disease))
}

pub async fn list_diseases(
    State(state): State<AppState>,
    _caller: AuthUser,
    AppQuery(query): AppQuery<DiseaseQuery>,
) -> AppResult<ApiResponse<Vec<Disease>>> {
    let list = diseases::list_diseases(&state.db, &query).await?;
    Ok(ApiResponse::ok("Diseases retrieved successfully", list))
}

pub async fn get_disease(
    State(state): State<AppState>,
    _caller: AuthUser,
    AppPath(id): AppPath<String>,
) -> AppResult<ApiResponse<Disease>> {
    let disease = diseases::get_disease(&state.db, &id).await?;
    Ok(ApiResponse::ok("Disease retrieved successfully", disease))
}

pub async fn my_history(
    State(state): State<AppState>,
    caller: AuthUser,
    AppQuery(query): AppQuery<HistoryQuery>,
) -> AppResult<ApiResponse<Vec<HistoryEntry>>> {
    let (entries, meta) = diseases::history_for(&state.db, &caller.user_id, &query).await?;
    Ok(ApiResponse::paged("Disease history retrieved successfully", entries, meta))
}
