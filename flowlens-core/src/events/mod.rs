//! Event system for the projector pipeline.
//!
//! # Event Flow
//!
//! 1. Each `SubscriptionManager` emits `PipelineMessage`s (raw logs and
//!    lifecycle markers) into one shared channel
//! 2. The `Projector` consumes that channel, normalizes raw logs into
//!    `DomainEvent`s, and folds them with the `StateReducer`
//! 3. Every fold publishes a fresh `ProjectorState` snapshot
//!
//! Only the consumer mutates state, so no locks guard it.

pub mod channels;
pub mod types;

pub use channels::{
    CommandReceiver, CommandSender, DEFAULT_CHANNEL_BUFFER, PipelineReceiver, PipelineSender,
    command_channel, pipeline_channel,
};

pub use types::{
    DomainEvent, FlowUpdated, LifecyclePhase, PipelineEvent, PipelineMessage, ProjectorCommand,
    SubscriptionFilter, SubscriptionId, SubscriptionLifecycle, WatchedContract,
};
