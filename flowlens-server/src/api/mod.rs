//! Read API over the projected state.
//!
//! # Endpoints
//!
//! - `GET  /state`            – full snapshot projected to `?at=` (default: now)
//! - `GET  /state/ws`         – WebSocket snapshot stream
//! - `GET  /tokens/{address}` – one super token
//! - `GET  /flows`            – flows, filtered by token, direction and status
//! - `POST /agent`            – switch the tracked agent
//! - `POST /intents`          – accept an action intent for the signing layer
//! - `GET  /intents/ws`       – WebSocket stream of accepted intents

use alloy_primitives::Address;
use axum::{
    Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use crate::state::AppState;

mod agent;
mod flows;
mod intents;
mod state;
mod ws;

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/state", get(state::get_state))
        .route("/state/ws", get(ws::state_ws))
        .route("/tokens/{address}", get(state::get_token))
        .route("/flows", get(flows::list_flows))
        .route("/agent", post(agent::change_agent))
        .route("/intents", post(intents::submit_intent))
        .route("/intents/ws", get(intents::intents_ws))
}

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

/// Errors that can occur in API handlers.
#[derive(Debug)]
enum ApiError {
    /// A path or body field is not a valid address.
    InvalidAddress(String),
    /// The requested super token is not part of the state.
    TokenNotFound,
    /// The projector task has ended.
    ProjectorStopped,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::InvalidAddress(raw) => (
                StatusCode::BAD_REQUEST,
                format!("invalid address: {raw}"),
            )
                .into_response(),
            ApiError::TokenNotFound => {
                (StatusCode::NOT_FOUND, "super token not found").into_response()
            }
            ApiError::ProjectorStopped => {
                tracing::error!("API request reached a stopped projector");
                (StatusCode::SERVICE_UNAVAILABLE, "projector stopped").into_response()
            }
        }
    }
}

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::InvalidAddress(raw.to_owned()))
}
