//! Semantic search endpoint

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::IntoResponse,
};
use clinai_core::SearchResponse;
use serde::Deserialize;

use crate::AppState;
use crate::error::AppError;

/// Request body for semantic search
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    query: Option<String>,
}

/// POST /api/search - Rank stored records against a free-text query
pub async fn search(
    State(state): State<AppState>,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(body) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let query = body.query.as_deref().map(str::trim).unwrap_or_default();
    if query.is_empty() {
        return Err(AppError::BadRequest("Query is required".to_string()));
    }

    tracing::info!(query, "Semantic search");
    let results = state.search_pipeline().run(query).await;

    Ok(Json(SearchResponse::new(query, results)))
}
