//! Event type definitions for the projector pipeline.
//!
//! Subscription tasks emit [`PipelineMessage`]s carrying raw logs and
//! lifecycle markers; the consumer normalizes raw logs into
//! [`DomainEvent`]s and folds them into the state.

use crate::chain::abi::FlowUpdated as FlowUpdatedLog;
use crate::chain::{LogFilter, RawLog};
use alloy::primitives::{Address, Bytes, I256};
use alloy::sol_types::SolEvent;
use tokio::sync::oneshot;

/// Which logs of a contract a subscription watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionFilter {
    /// Every log of the contract.
    All,
    /// `FlowUpdated` logs sent by this account.
    Sender(Address),
    /// `FlowUpdated` logs received by this account.
    Receiver(Address),
}

/// A (contract, filter) pair with its own subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchedContract {
    pub address: Address,
    pub filter: SubscriptionFilter,
}

impl WatchedContract {
    pub fn all(address: Address) -> Self {
        Self {
            address,
            filter: SubscriptionFilter::All,
        }
    }

    pub fn flows_sent_by(address: Address, sender: Address) -> Self {
        Self {
            address,
            filter: SubscriptionFilter::Sender(sender),
        }
    }

    pub fn flows_received_by(address: Address, receiver: Address) -> Self {
        Self {
            address,
            filter: SubscriptionFilter::Receiver(receiver),
        }
    }

    /// Key of this subscription in the block numbers cache.
    pub fn cache_key(&self) -> String {
        match self.filter {
            SubscriptionFilter::All => self.address.to_string(),
            SubscriptionFilter::Sender(account) => format!("{}:sender:{account}", self.address),
            SubscriptionFilter::Receiver(account) => {
                format!("{}:receiver:{account}", self.address)
            }
        }
    }

    /// Whether this subscription follows a particular agent.
    pub fn is_agent_scoped(&self) -> bool {
        !matches!(self.filter, SubscriptionFilter::All)
    }

    pub fn log_filter(&self) -> LogFilter {
        let filter = LogFilter::new(self.address);
        match self.filter {
            SubscriptionFilter::All => filter,
            SubscriptionFilter::Sender(account) => filter
                .with_topic(0, FlowUpdatedLog::SIGNATURE_HASH)
                .with_topic(2, account.into_word()),
            SubscriptionFilter::Receiver(account) => filter
                .with_topic(0, FlowUpdatedLog::SIGNATURE_HASH)
                .with_topic(3, account.into_word()),
        }
    }
}

impl std::fmt::Display for WatchedContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.cache_key())
    }
}

/// Phase markers a subscription emits between its logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    /// Historical scan is starting.
    Syncing,
    /// Every log up to `to_block` (the reorg-safe height) was emitted.
    Cached,
    /// The unsafe tail was emitted; the subscription is going live.
    Synced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionLifecycle {
    pub phase: LifecyclePhase,
    pub watched: WatchedContract,
    pub from_block: u64,
    pub to_block: u64,
}

/// A flow between `sender` and `receiver` changed rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowUpdated {
    pub token: Address,
    pub sender: Address,
    pub receiver: Address,
    /// Rate of this sender/receiver pair; zero means deleted.
    pub flow_rate: I256,
    pub total_sender_flow_rate: I256,
    pub total_receiver_flow_rate: I256,
    pub user_data: Bytes,
    /// `user_data` decoded as an ABI string, or empty.
    pub description: String,
    pub block_number: u64,
}

/// Normalized events the reducer understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    FlowUpdated(FlowUpdated),
    /// Vault deposit or transfer: the agent's balance of `token` changed.
    VaultBalanceChanged {
        token: Address,
        block_number: u64,
    },
    AgentChanged {
        new_agent_address: Address,
    },
    SubscriptionLifecycle(SubscriptionLifecycle),
}

impl DomainEvent {
    /// Whether folding this event needs the containing block's timestamp.
    pub fn needs_block_timestamp(&self) -> bool {
        matches!(
            self,
            DomainEvent::FlowUpdated(_) | DomainEvent::VaultBalanceChanged { .. }
        )
    }
}

/// Identifies one running subscription task.
pub type SubscriptionId = u64;

/// Payload emitted by a subscription task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    Log(RawLog),
    Lifecycle(SubscriptionLifecycle),
    /// The historical scan gave up; the projector cannot continue.
    Failed { reason: String },
}

/// A [`PipelineEvent`] tagged with the subscription that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineMessage {
    pub subscription_id: SubscriptionId,
    pub event: PipelineEvent,
}

/// Requests to the projector from outside the chain.
#[derive(Debug)]
pub enum ProjectorCommand {
    /// Switch the tracked agent; `done` fires once new subscriptions run.
    ChangeAgent {
        agent: Address,
        done: oneshot::Sender<()>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_keys_are_distinct_per_filter() {
        let cfa = Address::repeat_byte(0xcf);
        let agent = Address::repeat_byte(0xa9);
        let all = WatchedContract::all(cfa).cache_key();
        let sent = WatchedContract::flows_sent_by(cfa, agent).cache_key();
        let received = WatchedContract::flows_received_by(cfa, agent).cache_key();
        assert_eq!(all, cfa.to_string());
        assert_ne!(sent, received);
        assert!(sent.starts_with(&all));
        assert!(sent.contains(":sender:"));
    }

    #[test]
    fn test_log_filters_select_agent_side() {
        let cfa = Address::repeat_byte(0xcf);
        let agent = Address::repeat_byte(0xa9);
        let sent = WatchedContract::flows_sent_by(cfa, agent).log_filter();
        assert_eq!(sent.topics[0], Some(FlowUpdatedLog::SIGNATURE_HASH));
        assert_eq!(sent.topics[2], Some(agent.into_word()));
        assert_eq!(sent.topics[3], None);

        let received = WatchedContract::flows_received_by(cfa, agent).log_filter();
        assert_eq!(received.topics[3], Some(agent.into_word()));
        assert_eq!(received.topics[2], None);

        assert_eq!(WatchedContract::all(cfa).log_filter().topics, [None; 4]);
        assert!(!WatchedContract::all(cfa).is_agent_scoped());
    }
}
