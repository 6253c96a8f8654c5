use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::deduce::format_chain;
use crate::models::{DeduceRequest, DeduceResponse};
use crate::state::AppState;

/// POST /api/deduce - Run the rule chain over a phenomenon.
pub async fn deduce(
    State(state): State<AppState>,
    Json(req): Json<DeduceRequest>,
) -> Result<Json<DeduceResponse>, (StatusCode, String)> {
    if req.phenomenon.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Phenomenon is required".to_string()));
    }

    let max_rules = req.max_rules.unwrap_or(state.config.max_rules);
    let fired = state.context().deduce(&req.phenomenon, max_rules);
    let chain = format_chain(&fired);

    Ok(Json(DeduceResponse { fired, chain }))
}
