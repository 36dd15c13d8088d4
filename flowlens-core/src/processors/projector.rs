//! Projector service.
//!
//! The projector is responsible for:
//! - Reading the agent and initialization block at startup (with retry)
//! - Restoring the persisted snapshot when it belongs to the same agent
//! - Running one `SubscriptionManager` per watched (contract, filter) pair
//! - Folding every pipeline message into the state, one at a time
//! - Publishing each new state on a watch channel
//! - Persisting the state on every `Cached`/`Synced` marker
//! - Switching agents: tearing down and recreating the agent-filtered
//!   subscriptions

use super::normalizer::normalize;
use super::reducer::{ReduceContext, Reduction, StateReducer};
use super::subscription::{SubscriptionError, SubscriptionManager};
use crate::chain::{ChainClient, ChainError, RawLog, TokenHandleCache};
use crate::config::ProjectorConfig;
use crate::entities::{ProjectorState, SnapshotStore, StoreError};
use crate::events::{
    CommandReceiver, CommandSender, DomainEvent, LifecyclePhase, PipelineEvent, PipelineMessage,
    PipelineReceiver, PipelineSender, ProjectorCommand, SubscriptionId, WatchedContract,
    command_channel, pipeline_channel,
};
use crate::utils::backoff::{RetryError, RetryPolicy, retry_with_backoff};
use crate::utils::cancellation::CancellationSignal;
use crate::utils::unix_now;
use alloy::primitives::Address;
use kanau::processor::Processor;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Errors that stop the projector.
#[derive(Debug, Error)]
pub enum ProjectorError {
    /// A startup read kept failing; the projector does not know what to watch.
    #[error("startup read {operation} failed after {attempts} attempts: {reason}")]
    Startup {
        operation: &'static str,
        attempts: u32,
        reason: String,
    },

    /// A subscription's historical scan gave up.
    #[error("subscription {watched} failed: {reason}")]
    Subscription { watched: String, reason: String },

    #[error("snapshot store error: {0}")]
    Store(#[from] StoreError),

    /// The projector task is gone or shutting down.
    #[error("projector stopped")]
    Stopped,
}

/// Cheap, cloneable access to a running projector.
#[derive(Debug, Clone)]
pub struct ProjectorHandle {
    state_rx: watch::Receiver<ProjectorState>,
    command_tx: CommandSender,
}

impl ProjectorHandle {
    pub fn new(state_rx: watch::Receiver<ProjectorState>, command_tx: CommandSender) -> Self {
        Self {
            state_rx,
            command_tx,
        }
    }

    /// Snapshot of the state after the most recent fold.
    pub fn current_state(&self) -> ProjectorState {
        self.state_rx.borrow().clone()
    }

    /// Receiver that changes after every fold.
    pub fn subscribe(&self) -> watch::Receiver<ProjectorState> {
        self.state_rx.clone()
    }

    /// Switch the tracked agent and wait until its subscriptions run.
    pub async fn on_agent_changed(&self, agent: Address) -> Result<(), ProjectorError> {
        let (done, applied) = oneshot::channel();
        self.command_tx
            .send(ProjectorCommand::ChangeAgent { agent, done })
            .await
            .map_err(|_| ProjectorError::Stopped)?;
        applied.await.map_err(|_| ProjectorError::Stopped)
    }
}

struct RunningSubscription {
    watched: WatchedContract,
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<Result<(), SubscriptionError>>,
}

/// Owner of the projected state and of every subscription.
pub struct ProjectorService {
    config: ProjectorConfig,
    chain: Arc<dyn ChainClient>,
    store: Arc<dyn SnapshotStore>,
    reducer: StateReducer,
    state: ProjectorState,
    state_tx: watch::Sender<ProjectorState>,
    pipeline_tx: PipelineSender,
    pipeline_rx: PipelineReceiver,
    command_rx: CommandReceiver,
    shutdown_rx: watch::Receiver<bool>,
    subscriptions: HashMap<SubscriptionId, RunningSubscription>,
    /// Subscriptions that have not reached the live phase yet.
    pending_sync: HashSet<SubscriptionId>,
    next_subscription_id: SubscriptionId,
    initialization_block: u64,
    /// `SetAgent` logs at or below this block are already reflected in
    /// the agent read at startup or applied through a later change.
    agent_block: u64,
    last_block_timestamp: Option<(u64, u64)>,
}

impl ProjectorService {
    /// Read startup data, restore the snapshot and start every subscription.
    ///
    /// Returns the handle for queries and the join handle of the consumer
    /// task, which resolves when the projector stops.
    ///
    /// # Arguments
    ///
    /// * `config` - Watched contracts, sync tuning and token overrides
    /// * `chain` - Chain client for log queries and reads
    /// * `store` - Snapshot store used to restore and persist state
    /// * `shutdown_rx` - Receiver for shutdown signal
    pub async fn start(
        config: ProjectorConfig,
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn SnapshotStore>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<(ProjectorHandle, JoinHandle<Result<(), ProjectorError>>), ProjectorError> {
        let app = config.app_address;
        let policy = config.sync.startup_retry;
        let mut cancel = CancellationSignal::new(shutdown_rx.clone());
        let reader = &chain;

        let agent_block = startup_read(&policy, &mut cancel, "block_number", || async move {
            reader.block_number().await
        })
        .await?;
        let agent = startup_read(&policy, &mut cancel, "agent", || async move {
            reader.agent(app).await
        })
        .await?;
        let initialization_block =
            startup_read(&policy, &mut cancel, "initialization_block", || async move {
                reader.initialization_block(app).await
            })
            .await?;
        info!(%app, %agent, initialization_block, head = agent_block, "Projector startup reads complete");

        let state = match store.load(app).await? {
            Some(saved) if saved.agent_address == agent => {
                info!(
                    %agent,
                    cached = saved.block_numbers_cache.len(),
                    flows = saved.flows.len(),
                    "Restored projector snapshot"
                );
                saved
            }
            Some(saved) => {
                info!(saved = %saved.agent_address, current = %agent, "Discarding snapshot of another agent");
                ProjectorState::new(agent)
            }
            None => ProjectorState::new(agent),
        };

        let (state_tx, state_rx) = watch::channel(state.clone());
        let (command_tx, command_rx) = command_channel();
        let (pipeline_tx, pipeline_rx) = pipeline_channel();
        let reducer = StateReducer::new(
            chain.clone(),
            TokenHandleCache::new(),
            config.token_overrides.clone(),
        );

        let mut service = Self {
            config,
            chain,
            store,
            reducer,
            state,
            state_tx,
            pipeline_tx,
            pipeline_rx,
            command_rx,
            shutdown_rx,
            subscriptions: HashMap::new(),
            pending_sync: HashSet::new(),
            next_subscription_id: 0,
            initialization_block,
            agent_block,
            last_block_timestamp: None,
        };
        let mut watched = vec![WatchedContract::all(app)];
        watched.extend(service.agent_subscriptions(agent));
        service.spawn_subscriptions(watched);

        let task = tokio::spawn(service.run());
        Ok((ProjectorHandle::new(state_rx, command_tx), task))
    }

    /// The flow-agreement subscriptions that follow `agent`.
    fn agent_subscriptions(&self, agent: Address) -> [WatchedContract; 2] {
        let cfa = self.config.flow_agreement_address;
        [
            WatchedContract::flows_sent_by(cfa, agent),
            WatchedContract::flows_received_by(cfa, agent),
        ]
    }

    fn spawn_subscriptions(&mut self, watched: impl IntoIterator<Item = WatchedContract>) {
        for watched in watched {
            let id = self.next_subscription_id;
            self.next_subscription_id += 1;
            let start_block = self
                .state
                .cached_block(&watched.cache_key())
                .map(|block| block.saturating_add(1))
                .unwrap_or(self.initialization_block);
            let (cancel_tx, cancel) = CancellationSignal::channel();
            let manager = SubscriptionManager::new(
                id,
                watched,
                start_block,
                self.chain.clone(),
                self.config.sync,
                self.pipeline_tx.clone(),
                cancel,
            );
            debug!(subscription = id, %watched, start_block, "Spawning subscription");
            let task = tokio::spawn(manager.run());
            self.pending_sync.insert(id);
            self.subscriptions.insert(
                id,
                RunningSubscription {
                    watched,
                    cancel_tx,
                    task,
                },
            );
        }
    }

    /// Cancel one subscription and wait for its task to unwind.
    async fn stop_subscription(&mut self, id: SubscriptionId) {
        let Some(subscription) = self.subscriptions.remove(&id) else {
            return;
        };
        self.pending_sync.remove(&id);
        let _ = subscription.cancel_tx.send(true);
        match subscription.task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(subscription = id, error = %e, "Subscription ended with error"),
            Err(e) => warn!(subscription = id, error = %e, "Subscription task panicked"),
        }
        debug!(subscription = id, watched = %subscription.watched, "Subscription stopped");
    }

    async fn stop_all(&mut self) {
        let ids: Vec<SubscriptionId> = self.subscriptions.keys().copied().collect();
        for id in &ids {
            if let Some(subscription) = self.subscriptions.get(id) {
                let _ = subscription.cancel_tx.send(true);
            }
        }
        for id in ids {
            self.stop_subscription(id).await;
        }
    }

    /// Consume the pipeline until shutdown or a fatal subscription failure.
    async fn run(mut self) -> Result<(), ProjectorError> {
        info!(
            app = %self.config.app_address,
            agent = %self.state.agent_address,
            subscriptions = self.subscriptions.len(),
            "Projector started"
        );

        let outcome = loop {
            tokio::select! {
                biased;

                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!("Projector received shutdown signal");
                        break Ok(());
                    }
                }

                Some(command) = self.command_rx.recv() => {
                    self.handle_command(command).await;
                }

                Some(message) = self.pipeline_rx.recv() => {
                    if let Err(e) = self.handle_message(message).await {
                        error!(error = %e, "Projector stopping on fatal error");
                        break Err(e);
                    }
                }

                else => break Ok(()),
            }
        };

        self.stop_all().await;
        self.persist().await;
        info!("Projector stopped");
        outcome
    }

    async fn handle_command(&mut self, command: ProjectorCommand) {
        match command {
            ProjectorCommand::ChangeAgent { agent, done } => {
                self.change_agent(agent).await;
                let _ = done.send(());
            }
        }
    }

    async fn handle_message(&mut self, message: PipelineMessage) -> Result<(), ProjectorError> {
        let id = message.subscription_id;
        let Some(watched) = self.subscriptions.get(&id).map(|s| s.watched) else {
            debug!(subscription = id, "Dropping message from cancelled subscription");
            return Ok(());
        };

        match message.event {
            PipelineEvent::Failed { reason } => Err(ProjectorError::Subscription {
                watched: watched.to_string(),
                reason,
            }),
            PipelineEvent::Lifecycle(lifecycle) => {
                let phase = lifecycle.phase;
                match phase {
                    LifecyclePhase::Syncing => {
                        self.pending_sync.insert(id);
                        self.apply(
                            DomainEvent::SubscriptionLifecycle(lifecycle),
                            ReduceContext::default(),
                        )
                        .await;
                    }
                    LifecyclePhase::Cached => {
                        self.apply(
                            DomainEvent::SubscriptionLifecycle(lifecycle),
                            ReduceContext::default(),
                        )
                        .await;
                        self.persist().await;
                    }
                    LifecyclePhase::Synced => {
                        self.pending_sync.remove(&id);
                        if self.pending_sync.is_empty() {
                            self.apply(
                                DomainEvent::SubscriptionLifecycle(lifecycle),
                                ReduceContext::default(),
                            )
                            .await;
                        } else {
                            debug!(
                                subscription = id,
                                remaining = self.pending_sync.len(),
                                "Subscription live, others still syncing"
                            );
                        }
                        self.persist().await;
                    }
                }
                Ok(())
            }
            PipelineEvent::Log(log) => {
                self.handle_log(log).await;
                Ok(())
            }
        }
    }

    async fn handle_log(&mut self, log: RawLog) {
        let Some(event) = normalize(&log) else {
            return;
        };

        if let DomainEvent::AgentChanged { new_agent_address } = event {
            if log.block_number <= self.agent_block {
                debug!(
                    block = log.block_number,
                    agent = %new_agent_address,
                    "Skipping historical SetAgent"
                );
                return;
            }
            self.agent_block = log.block_number;
            self.change_agent(new_agent_address).await;
            return;
        }

        let block_timestamp = if event.needs_block_timestamp() {
            self.block_timestamp(&log).await
        } else {
            None
        };
        let context = ReduceContext {
            block_timestamp,
            position: Some(log.position()),
        };
        self.apply(event, context).await;
    }

    async fn block_timestamp(&mut self, log: &RawLog) -> Option<u64> {
        if let Some(timestamp) = log.block_timestamp {
            return Some(timestamp);
        }
        if let Some((block, timestamp)) = self.last_block_timestamp
            && block == log.block_number
        {
            return Some(timestamp);
        }
        match self.chain.block_timestamp(log.block_number).await {
            Ok(timestamp) => {
                self.last_block_timestamp = Some((log.block_number, timestamp));
                Some(timestamp)
            }
            Err(e) => {
                error!(block = log.block_number, error = %e, "Failed to read block timestamp");
                None
            }
        }
    }

    /// Fold one event and publish the result.
    async fn apply(&mut self, event: DomainEvent, context: ReduceContext) {
        let reduction = Reduction {
            state: std::mem::take(&mut self.state),
            event,
            context,
        };
        let Ok(next) = self.reducer.process(reduction).await;
        self.state = next;
        self.publish();
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state.clone());
    }

    async fn persist(&self) {
        if let Err(e) = self
            .store
            .save(self.config.app_address, &self.state)
            .await
        {
            error!(error = %e, "Failed to persist projector snapshot");
        }
    }

    /// Move every agent-scoped piece of the projector to `agent`.
    async fn change_agent(&mut self, agent: Address) {
        let previous = self.state.agent_address;
        if agent == previous {
            debug!(%agent, "Agent unchanged");
            return;
        }
        info!(%previous, %agent, "Switching agent");

        let stale: Vec<SubscriptionId> = self
            .subscriptions
            .iter()
            .filter(|(_, s)| s.watched.is_agent_scoped())
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            self.stop_subscription(id).await;
        }

        self.apply(
            DomainEvent::AgentChanged {
                new_agent_address: agent,
            },
            ReduceContext::default(),
        )
        .await;
        let stale_keys: Vec<String> = self
            .agent_subscriptions(previous)
            .iter()
            .map(WatchedContract::cache_key)
            .collect();
        let state = std::mem::take(&mut self.state);
        self.state = self
            .reducer
            .rebind_agent(state, &stale_keys, unix_now())
            .await;
        self.publish();
        self.persist().await;

        let watched = self.agent_subscriptions(agent);
        self.spawn_subscriptions(watched);
    }
}

async fn startup_read<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &mut CancellationSignal,
    operation: &'static str,
    op: F,
) -> Result<T, ProjectorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChainError>>,
{
    retry_with_backoff(policy, cancel, operation, op)
        .await
        .map_err(|e| match e {
            RetryError::Cancelled => ProjectorError::Stopped,
            RetryError::Exhausted { attempts, last } => {
                error!(operation, attempts, error = %last, "Startup read failed");
                ProjectorError::Startup {
                    operation,
                    attempts,
                    reason: last.to_string(),
                }
            }
        })
}
