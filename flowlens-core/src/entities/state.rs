use super::{Flow, FlowKey, SuperToken};
use alloy::primitives::Address;
use flowlens_sdk::objects::SnapshotResponse;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Last safely cached block per subscription cache key.
pub type BlockNumbersCache = BTreeMap<String, u64>;

/// Aggregate projected state.
///
/// Owned by the projector's consumer task and only changed by the reducer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectorState {
    pub agent_address: Address,
    pub is_syncing: bool,
    pub super_tokens: BTreeMap<Address, SuperToken>,
    /// In creation order. Cancelled flows stay in place.
    pub flows: Vec<Flow>,
    pub block_numbers_cache: BlockNumbersCache,
}

impl ProjectorState {
    pub fn new(agent_address: Address) -> Self {
        Self {
            agent_address,
            ..Self::default()
        }
    }

    /// Index of the non-cancelled flow for `key`.
    pub fn active_flow_index(&self, key: &FlowKey) -> Option<usize> {
        self.flows
            .iter()
            .position(|flow| !flow.is_cancelled && flow.key() == *key)
    }

    /// Most recent flow (cancelled or not) under `key`.
    pub fn latest_flow(&self, key: &FlowKey) -> Option<&Flow> {
        self.flows.iter().rev().find(|flow| flow.key() == *key)
    }

    pub fn active_flows(&self) -> impl Iterator<Item = &Flow> {
        self.flows.iter().filter(|flow| !flow.is_cancelled)
    }

    /// Record `block` for `key`, never moving an entry backwards.
    pub fn advance_cache(&mut self, key: &str, block: u64) {
        let entry = self.block_numbers_cache.entry(key.to_owned()).or_insert(block);
        *entry = (*entry).max(block);
    }

    pub fn cached_block(&self, key: &str) -> Option<u64> {
        self.block_numbers_cache.get(key).copied()
    }

    /// Snapshot view with every continuous quantity projected to `now`.
    pub fn to_response(&self, now: u64) -> SnapshotResponse {
        SnapshotResponse {
            agent_address: self.agent_address.to_string(),
            is_syncing: self.is_syncing,
            projected_at: now,
            super_tokens: self
                .super_tokens
                .values()
                .map(|token| token.to_view(now))
                .collect(),
            flows: self
                .flows
                .iter()
                .map(|flow| {
                    let period = self
                        .super_tokens
                        .get(&flow.super_token_address)
                        .map(|token| token.liquidation_period_seconds)
                        .unwrap_or_default();
                    flow.to_view(now, period)
                })
                .collect(),
            block_numbers_cache: self.block_numbers_cache.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::FlowDirection;
    use alloy::primitives::I256;

    #[test]
    fn test_advance_cache_is_monotonic() {
        let mut state = ProjectorState::default();
        state.advance_cache("0xapp", 150);
        state.advance_cache("0xapp", 120);
        assert_eq!(state.cached_block("0xapp"), Some(150));
        state.advance_cache("0xapp", 151);
        assert_eq!(state.cached_block("0xapp"), Some(151));
        assert_eq!(state.cached_block("0xother"), None);
    }

    #[test]
    fn test_state_survives_json_round_trip() {
        let agent = Address::repeat_byte(0x0a);
        let token = Address::repeat_byte(0x01);
        let mut state = ProjectorState::new(agent);
        state
            .super_tokens
            .insert(token, SuperToken::unresolved(token));
        let key = FlowKey {
            direction: FlowDirection::Incoming,
            entity: Address::repeat_byte(0x0b),
            super_token: token,
        };
        state.flows.push(Flow::open(
            key,
            I256::try_from(-5i64).unwrap_or_default(),
            7,
            "salary".into(),
        ));
        state.advance_cache("contract", 99);

        let json = serde_json::to_string(&state).unwrap_or_default();
        let restored: Option<ProjectorState> = serde_json::from_str(&json).ok();
        assert_eq!(restored, Some(state));
    }
}
