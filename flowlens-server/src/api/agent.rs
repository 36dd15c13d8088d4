use axum::{Json, extract::State};
use flowlens_core::processors::ProjectorError;
use flowlens_core::utils::unix_now;
use flowlens_sdk::objects::{ChangeAgentRequest, SnapshotResponse};

use super::{ApiError, parse_address};
use crate::state::AppState;

/// `POST /agent` — switch the tracked agent.
///
/// Responds once the projector has rebound its state and resubscribed,
/// with the snapshot for the new agent.
pub(super) async fn change_agent(
    State(state): State<AppState>,
    Json(request): Json<ChangeAgentRequest>,
) -> Result<Json<SnapshotResponse>, ApiError> {
    let agent = parse_address(&request.address)?;
    tracing::info!(%agent, "Agent change requested");

    state
        .projector
        .on_agent_changed(agent)
        .await
        .map_err(|e: ProjectorError| {
            tracing::warn!(error = %e, "Agent change not applied");
            ApiError::ProjectorStopped
        })?;

    Ok(Json(
        state.projector.current_state().to_response(unix_now()),
    ))
}
