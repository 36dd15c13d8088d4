use axum::{
    Json,
    extract::{Query, State},
};
use flowlens_core::entities::FlowDirection;
use flowlens_core::utils::unix_now;
use flowlens_sdk::objects::{FlowView, FlowsQuery};

use super::{ApiError, parse_address};
use crate::state::AppState;

/// `GET /flows` — flows of the tracked agent.
///
/// Cancelled flows are only listed with `include_cancelled=true`.
pub(super) async fn list_flows(
    State(state): State<AppState>,
    Query(query): Query<FlowsQuery>,
) -> Result<Json<Vec<FlowView>>, ApiError> {
    let token = query.token.as_deref().map(parse_address).transpose()?;
    let direction = query.direction.map(FlowDirection::from);
    let now = query.at.unwrap_or_else(unix_now);

    let snapshot = state.projector.current_state();
    let flows = snapshot
        .flows
        .iter()
        .filter(|flow| query.include_cancelled || !flow.is_cancelled)
        .filter(|flow| token.is_none_or(|token| flow.super_token_address == token))
        .filter(|flow| direction.is_none_or(|direction| flow.direction == direction))
        .map(|flow| {
            let period = snapshot
                .super_tokens
                .get(&flow.super_token_address)
                .map(|token| token.liquidation_period_seconds)
                .unwrap_or_default();
            flow.to_view(now, period)
        })
        .collect();
    Ok(Json(flows))
}
