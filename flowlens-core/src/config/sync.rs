//! Subscription and retry tuning.

use crate::utils::backoff::RetryPolicy;
use std::time::Duration;

/// How subscriptions scan and follow the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Blocks behind head considered safe from reorganization.
    pub reorg_safety_margin: u64,
    /// Largest block range requested in one log query.
    pub max_block_range: u64,
    /// Interval between head polls in the live phase.
    pub poll_interval: Duration,
    /// Retry policy for startup reads (agent, initialization block) and
    /// historical scans. Exhaustion is fatal.
    pub startup_retry: RetryPolicy,
    /// Retry policy for the live phase. Unbounded by default.
    pub live_retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reorg_safety_margin: 100,
            max_block_range: 5_000,
            poll_interval: Duration::from_secs(5),
            startup_retry: RetryPolicy::default(),
            live_retry: RetryPolicy {
                max_attempts: 0,
                ..RetryPolicy::default()
            },
        }
    }
}
