use axum::extract::State;
use axum::Json;

use crate::state::AppState;

/// GET /api/providers - Generation providers with a configured credential.
pub async fn list_providers(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "providers": state.providers.available() }))
}
