use axum::{
    Json,
    extract::{Path, Query, State},
};
use flowlens_core::utils::unix_now;
use flowlens_sdk::objects::{ProjectionQuery, SnapshotResponse, SuperTokenView};

use super::{ApiError, parse_address};
use crate::state::AppState;

/// `GET /state` — the whole projected state.
pub(super) async fn get_state(
    State(state): State<AppState>,
    Query(query): Query<ProjectionQuery>,
) -> Json<SnapshotResponse> {
    let now = query.at.unwrap_or_else(unix_now);
    Json(state.projector.current_state().to_response(now))
}

/// `GET /tokens/{address}` — one super token.
pub(super) async fn get_token(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<ProjectionQuery>,
) -> Result<Json<SuperTokenView>, ApiError> {
    let address = parse_address(&address)?;
    let now = query.at.unwrap_or_else(unix_now);
    let snapshot = state.projector.current_state();
    let token = snapshot
        .super_tokens
        .get(&address)
        .ok_or(ApiError::TokenNotFound)?;
    Ok(Json(token.to_view(now)))
}
