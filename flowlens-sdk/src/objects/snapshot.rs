use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Direction of a flow relative to the tracked agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowDirection {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnderlyingTokenView {
    pub address: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// A super token as seen at `SnapshotResponse::projected_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuperTokenView {
    pub address: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub underlying_token: UnderlyingTokenView,
    /// Last on-chain balance, exact at `last_update_timestamp`.
    pub balance: String,
    /// `balance` projected under `net_flow`.
    pub current_balance: String,
    pub net_flow: String,
    pub last_update_timestamp: u64,
    pub liquidation_period_seconds: u64,
    /// When the projected balance reaches zero; absent if never.
    pub depletion_date: Option<u64>,
    #[serde(rename = "logoURI")]
    pub logo_uri: Option<String>,
    pub mainnet_token_equivalent_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowView {
    pub direction: FlowDirection,
    /// The counterparty.
    pub entity: String,
    pub super_token_address: String,
    pub flow_rate: String,
    /// Checkpoint: amount streamed up to `last_timestamp`.
    pub accumulated_amount: String,
    /// Amount streamed up to `SnapshotResponse::projected_at`.
    pub current_amount: String,
    /// Collateral the flow locks; zero once cancelled.
    pub required_deposit: String,
    pub creation_timestamp: u64,
    pub last_timestamp: u64,
    pub is_cancelled: bool,
    pub description: String,
}

/// The full projected state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResponse {
    pub agent_address: String,
    pub is_syncing: bool,
    /// Instant every `current_*` field and depletion date is computed for.
    pub projected_at: u64,
    pub super_tokens: Vec<SuperTokenView>,
    pub flows: Vec<FlowView>,
    pub block_numbers_cache: BTreeMap<String, u64>,
}

/// `?at=<unix seconds>`; defaults to the server's clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionQuery {
    pub at: Option<u64>,
}

/// Filters of `GET /flows`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowsQuery {
    pub token: Option<String>,
    pub direction: Option<FlowDirection>,
    #[serde(default)]
    pub include_cancelled: bool,
    pub at: Option<u64>,
}

/// Body of `POST /agent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeAgentRequest {
    pub address: String,
}
