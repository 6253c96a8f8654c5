use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::models::{SearchRequest, SearchResponse};
use crate::state::AppState;

/// POST /api/search - Semantic search over the corpus.
pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let query = req.query.trim().to_string();
    if query.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Query is required".to_string()));
    }

    let top_k = req.top_k.unwrap_or(state.config.search.top_k);
    let min_similarity = req
        .min_similarity
        .unwrap_or(state.config.search.min_similarity);

    let results = state
        .context()
        .search(&query, top_k, min_similarity)
        .await
        .map_err(|e| (StatusCode::SERVICE_UNAVAILABLE, e.to_string()))?;

    Ok(Json(SearchResponse { query, results }))
}
