use crate::chain::LogPosition;
use crate::utils::checkpoint::{current_amount, required_deposit};
use alloy::primitives::{Address, I256};
use flowlens_sdk::objects::FlowView;
use serde::{Deserialize, Serialize};

/// Direction of a flow relative to the tracked agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowDirection {
    Incoming,
    Outgoing,
}

/// Identity of a flow: at most one non-cancelled flow exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub direction: FlowDirection,
    /// The counterparty.
    pub entity: Address,
    pub super_token: Address,
}

/// A continuous stream between the agent and one counterparty.
///
/// `accumulated_amount` is the amount streamed up to `last_timestamp` under
/// earlier rates. Once cancelled, the flow no longer grows; `flow_rate`
/// keeps its last value for auditing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow {
    pub direction: FlowDirection,
    pub entity: Address,
    pub super_token_address: Address,
    pub flow_rate: I256,
    pub accumulated_amount: I256,
    pub creation_timestamp: u64,
    pub last_timestamp: u64,
    pub is_cancelled: bool,
    pub description: String,
    /// Last log applied to this flow; replays at or before it are ignored.
    #[serde(default)]
    pub last_position: Option<LogPosition>,
}

impl Flow {
    /// A new flow opened at `timestamp`.
    pub fn open(key: FlowKey, flow_rate: I256, timestamp: u64, description: String) -> Self {
        Self {
            direction: key.direction,
            entity: key.entity,
            super_token_address: key.super_token,
            flow_rate,
            accumulated_amount: I256::ZERO,
            creation_timestamp: timestamp,
            last_timestamp: timestamp,
            is_cancelled: false,
            description,
            last_position: None,
        }
    }

    pub fn key(&self) -> FlowKey {
        FlowKey {
            direction: self.direction,
            entity: self.entity,
            super_token: self.super_token_address,
        }
    }

    /// Rate used for projection; zero once cancelled.
    pub fn effective_rate(&self) -> I256 {
        if self.is_cancelled {
            I256::ZERO
        } else {
            self.flow_rate
        }
    }

    /// Total streamed up to `now`.
    pub fn current_amount(&self, now: u64) -> I256 {
        current_amount(
            self.accumulated_amount,
            self.effective_rate(),
            self.last_timestamp,
            now,
        )
    }

    /// Fold the time elapsed since the last checkpoint into
    /// `accumulated_amount` under the current rate, and move the checkpoint
    /// to `timestamp`.
    pub fn settle(&mut self, timestamp: u64) {
        self.accumulated_amount = self.current_amount(timestamp);
        self.last_timestamp = self.last_timestamp.max(timestamp);
    }

    pub fn to_view(&self, now: u64, liquidation_period_seconds: u64) -> FlowView {
        FlowView {
            direction: self.direction.into(),
            entity: self.entity.to_string(),
            super_token_address: self.super_token_address.to_string(),
            flow_rate: self.flow_rate.to_string(),
            accumulated_amount: self.accumulated_amount.to_string(),
            current_amount: self.current_amount(now).to_string(),
            required_deposit: required_deposit(self.effective_rate(), liquidation_period_seconds)
                .to_string(),
            creation_timestamp: self.creation_timestamp,
            last_timestamp: self.last_timestamp,
            is_cancelled: self.is_cancelled,
            description: self.description.clone(),
        }
    }
}
