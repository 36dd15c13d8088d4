//! The state reducer: folds one [`DomainEvent`] into a [`ProjectorState`].
//!
//! Reduction never fails. On-chain reads that go wrong leave the affected
//! fields stale and are logged; the next event touching the same token
//! refreshes them.
//!
//! Subscriptions deliver their logs concurrently, so events of different
//! subscriptions arrive in any interleaving. Token checkpoints and flows
//! remember the log they were last written by and ignore anything older.

use crate::chain::{ChainClient, LogPosition, TokenHandleCache};
use crate::config::TokenOverrides;
use crate::entities::{Flow, FlowDirection, FlowKey, ProjectorState, SuperToken};
use crate::events::{DomainEvent, FlowUpdated, LifecyclePhase, SubscriptionLifecycle};
use alloy::primitives::{Address, I256, U256};
use kanau::processor::Processor;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Inputs that do not come from the event itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReduceContext {
    /// Timestamp of the block containing the event, when known.
    pub block_timestamp: Option<u64>,
    /// Where the event's log sits in the chain.
    pub position: Option<LogPosition>,
}

/// One fold step: `(state, event) -> state`.
#[derive(Debug, Clone)]
pub struct Reduction {
    pub state: ProjectorState,
    pub event: DomainEvent,
    pub context: ReduceContext,
}

/// The chain instant an event-driven balance read belongs to.
#[derive(Debug, Clone, Copy)]
struct Checkpoint {
    timestamp: u64,
    block: u64,
    position: Option<LogPosition>,
}

impl Checkpoint {
    /// Whether this checkpoint is at least as recent as the token's.
    fn supersedes(&self, token: &SuperToken) -> bool {
        match (token.last_update_position, self.position) {
            (Some(stored), Some(position)) => position >= stored,
            (None, Some(_)) => true,
            (_, None) => self.timestamp >= token.last_update_timestamp,
        }
    }
}

/// Applies domain events to the projected state.
///
/// Holds the chain reader for balance and metadata reads, and the shared
/// token-handle cache so metadata is read once per token.
#[derive(Clone)]
pub struct StateReducer {
    chain: Arc<dyn ChainClient>,
    tokens: TokenHandleCache,
    overrides: TokenOverrides,
}

impl StateReducer {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        tokens: TokenHandleCache,
        overrides: TokenOverrides,
    ) -> Self {
        Self {
            chain,
            tokens,
            overrides,
        }
    }

    fn apply_lifecycle(state: &mut ProjectorState, lifecycle: &SubscriptionLifecycle) {
        match lifecycle.phase {
            LifecyclePhase::Syncing => {
                state.is_syncing = true;
            }
            LifecyclePhase::Cached => {
                state.advance_cache(&lifecycle.watched.cache_key(), lifecycle.to_block);
            }
            LifecyclePhase::Synced => {
                if state.is_syncing {
                    info!(agent = %state.agent_address, "Projector synced");
                }
                state.is_syncing = false;
            }
        }
    }

    /// Make sure `token` has an entry, reading its metadata on first sight.
    ///
    /// A token whose metadata cannot be read is still created so balances
    /// and flows can attach to it; resolution is retried on later events.
    async fn ensure_token(&self, state: &mut ProjectorState, token: Address) {
        let resolved = state
            .super_tokens
            .get(&token)
            .map(|t| t.metadata_resolved);
        if resolved == Some(true) {
            return;
        }

        let handle = match self.tokens.get_or_fetch(self.chain.as_ref(), token).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!(%token, error = %e, "Failed to read super token metadata");
                None
            }
        };

        let entry = state.super_tokens.entry(token).or_insert_with(|| {
            let mut fresh = SuperToken::unresolved(token);
            if let Some(extra) = self.overrides.get(&token) {
                fresh.logo_uri = extra.logo_uri.clone();
                fresh.mainnet_token_equivalent_address = extra.mainnet_token_equivalent_address;
            }
            debug!(%token, "Tracking new super token");
            fresh
        });
        if let Some(handle) = handle {
            entry.resolve(&handle);
        }
    }

    async fn read_balance(&self, token: Address, holder: Address, block: Option<u64>) -> Option<U256> {
        match self.chain.balance_of(token, holder, block).await {
            Ok(balance) => Some(balance),
            Err(e) => {
                error!(%token, %holder, ?block, error = %e, "Failed to read balance, keeping stale value");
                None
            }
        }
    }

    /// Move the token checkpoint to `at`, reading the balance as of its block.
    ///
    /// Nothing changes when the token already reflects a later log.
    /// `net_flow` is only written together with a successful balance read,
    /// so the checkpoint stays consistent.
    async fn refresh_balance(
        &self,
        state: &mut ProjectorState,
        token: Address,
        at: Checkpoint,
        net_flow: Option<I256>,
    ) {
        let agent = state.agent_address;
        let Some(entry) = state.super_tokens.get(&token) else {
            return;
        };
        if !at.supersedes(entry) {
            debug!(
                %token,
                timestamp = at.timestamp,
                checkpoint = entry.last_update_timestamp,
                "Token checkpoint is newer than event, keeping it"
            );
            return;
        }
        let Some(balance) = self.read_balance(token, agent, Some(at.block)).await else {
            return;
        };
        let Some(entry) = state.super_tokens.get_mut(&token) else {
            return;
        };
        entry.balance = balance;
        if let Some(net_flow) = net_flow {
            entry.net_flow = net_flow;
        }
        entry.last_update_timestamp = at.timestamp;
        entry.last_update_position = at.position;
    }

    async fn apply_flow_updated(
        &self,
        mut state: ProjectorState,
        event: FlowUpdated,
        context: ReduceContext,
    ) -> ProjectorState {
        let agent = state.agent_address;
        let (direction, entity, net_flow) = if event.sender == agent {
            (FlowDirection::Outgoing, event.receiver, event.total_sender_flow_rate)
        } else if event.receiver == agent {
            (FlowDirection::Incoming, event.sender, event.total_receiver_flow_rate)
        } else {
            debug!(sender = %event.sender, receiver = %event.receiver, "Ignoring flow not touching agent");
            return state;
        };
        let Some(timestamp) = context.block_timestamp else {
            warn!(block = event.block_number, "No block timestamp for FlowUpdated, skipping");
            return state;
        };

        let key = FlowKey {
            direction,
            entity,
            super_token: event.token,
        };
        if let Some(latest) = state.latest_flow(&key) {
            let replayed = match (latest.last_position, context.position) {
                (Some(applied), Some(position)) => position <= applied,
                _ => timestamp < latest.last_timestamp,
            };
            if replayed {
                debug!(
                    %entity,
                    token = %event.token,
                    timestamp,
                    checkpoint = latest.last_timestamp,
                    "Skipping FlowUpdated already reflected in flow"
                );
                return state;
            }
        }

        self.ensure_token(&mut state, event.token).await;
        let at = Checkpoint {
            timestamp,
            block: event.block_number,
            position: context.position,
        };
        self.refresh_balance(&mut state, event.token, at, Some(net_flow))
            .await;

        let rate = event.flow_rate;
        match state.active_flow_index(&key) {
            Some(index) => {
                let flow = &mut state.flows[index];
                flow.settle(timestamp);
                if rate.is_zero() {
                    flow.is_cancelled = true;
                    debug!(%entity, token = %event.token, "Flow cancelled");
                } else {
                    flow.flow_rate = rate;
                }
                if !event.description.is_empty() {
                    flow.description = event.description;
                }
                flow.last_position = context.position;
            }
            None if !rate.is_zero() => {
                debug!(%entity, token = %event.token, %rate, "Flow opened");
                let mut flow = Flow::open(key, rate, timestamp, event.description);
                flow.last_position = context.position;
                state.flows.push(flow);
            }
            None => {
                debug!(%entity, token = %event.token, "Deletion of unknown flow ignored");
            }
        }
        state
    }

    async fn apply_vault_balance_changed(
        &self,
        mut state: ProjectorState,
        token: Address,
        block_number: u64,
        context: ReduceContext,
    ) -> ProjectorState {
        let Some(timestamp) = context.block_timestamp else {
            warn!(block = block_number, %token, "No block timestamp for vault event, skipping");
            return state;
        };
        self.ensure_token(&mut state, token).await;
        let at = Checkpoint {
            timestamp,
            block: block_number,
            position: context.position,
        };
        self.refresh_balance(&mut state, token, at, None).await;
        state
    }

    /// Re-root `state` on a different agent.
    ///
    /// Flows are relative to the agent, so they are dropped together with
    /// the old agent's flow cache entries. Token metadata is kept and every
    /// balance is re-read at the head for the new agent, with a zero net
    /// flow until its flows are replayed. Those head reads carry no log
    /// position, so the replayed events replace them.
    pub async fn rebind_agent(
        &self,
        mut state: ProjectorState,
        stale_cache_keys: &[String],
        now: u64,
    ) -> ProjectorState {
        state.flows.clear();
        for key in stale_cache_keys {
            state.block_numbers_cache.remove(key);
        }
        let agent = state.agent_address;
        let tokens: Vec<Address> = state.super_tokens.keys().copied().collect();
        for token in tokens {
            let balance = self.read_balance(token, agent, None).await;
            if let Some(entry) = state.super_tokens.get_mut(&token) {
                if let Some(balance) = balance {
                    entry.balance = balance;
                }
                entry.net_flow = I256::ZERO;
                entry.last_update_timestamp = now;
                entry.last_update_position = None;
            }
        }
        state
    }
}

impl Processor<Reduction> for StateReducer {
    type Output = ProjectorState;
    type Error = Infallible;

    async fn process(&self, reduction: Reduction) -> Result<ProjectorState, Infallible> {
        let Reduction {
            mut state,
            event,
            context,
        } = reduction;
        let next = match event {
            DomainEvent::FlowUpdated(flow) => self.apply_flow_updated(state, flow, context).await,
            DomainEvent::VaultBalanceChanged {
                token,
                block_number,
            } => {
                self.apply_vault_balance_changed(state, token, block_number, context)
                    .await
            }
            DomainEvent::AgentChanged { new_agent_address } => {
                info!(old = %state.agent_address, new = %new_agent_address, "Agent changed");
                state.agent_address = new_agent_address;
                state
            }
            DomainEvent::SubscriptionLifecycle(lifecycle) => {
                Self::apply_lifecycle(&mut state, &lifecycle);
                state
            }
        };
        Ok(next)
    }
}
