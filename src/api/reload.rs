use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::state::AppState;

/// POST /api/reload - Re-read corpus and rules, regenerating embeddings if stale.
pub async fn reload(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    state.reload().await.map_err(|e| {
        tracing::error!("Reload failed: {e:#}");
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Reload failed: {e:#}"))
    })?;

    let context = state.context();
    Ok(Json(serde_json::json!({
        "positions": context.search.len(),
        "rules": context.rules.len(),
    })))
}
