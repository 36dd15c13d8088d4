//! SubscriptionManager processor.
//!
//! One SubscriptionManager runs per watched (contract, filter) pair and
//! walks three phases:
//!
//! - Backfilling: `[start, head - margin]`, then a `Cached` marker
//! - GapFilling: `[head - margin + 1, head]`, then a `Synced` marker
//! - Live: polls the head and emits logs from `head + 1` onward
//!
//! Every log and marker goes to the shared pipeline channel in chain order.
//! A `Syncing` marker opens the sequence.

use crate::chain::{ChainClient, ChainError, LogFilter, RawLog};
use crate::config::SyncConfig;
use crate::events::{
    LifecyclePhase, PipelineEvent, PipelineMessage, PipelineSender, SubscriptionId,
    SubscriptionLifecycle, WatchedContract,
};
use crate::utils::backoff::{RetryError, RetryPolicy, retry_with_backoff};
use crate::utils::cancellation::CancellationSignal;
use std::ops::RangeInclusive;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

/// Errors that end a subscription.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// The historical scan kept failing.
    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        last: ChainError,
    },

    /// The consumer went away.
    #[error("pipeline channel closed")]
    PipelineClosed,

    #[error("subscription cancelled")]
    Cancelled,
}

impl SubscriptionError {
    fn from_retry(operation: &'static str) -> impl FnOnce(RetryError<ChainError>) -> Self {
        move |e| match e {
            RetryError::Cancelled => SubscriptionError::Cancelled,
            RetryError::Exhausted { attempts, last } => SubscriptionError::RetriesExhausted {
                operation,
                attempts,
                last,
            },
        }
    }
}

/// Block ranges of the two historical phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPlan {
    /// Reorg-safe range; `None` when there is nothing new below the margin.
    pub backfill: Option<RangeInclusive<u64>>,
    /// Block recorded by the `Cached` marker.
    pub cached_to: u64,
    /// Possibly-unstable tail up to the head seen at start.
    pub gap: Option<RangeInclusive<u64>>,
    /// First block the live phase asks for.
    pub live_from: u64,
}

impl ScanPlan {
    /// Split `[start, current]` at `current - margin`.
    pub fn new(start: u64, current: u64, margin: u64) -> Self {
        let safe = current.saturating_sub(margin);
        let backfill = (start <= safe).then(|| start..=safe);
        let gap_from = start.max(safe.saturating_add(1));
        let gap = (gap_from <= current).then(|| gap_from..=current);
        Self {
            backfill,
            cached_to: safe,
            gap,
            live_from: current.saturating_add(1).max(start),
        }
    }
}

/// Split `range` into consecutive chunks of at most `max_len` blocks.
pub fn chunks(range: RangeInclusive<u64>, max_len: u64) -> impl Iterator<Item = (u64, u64)> {
    let max_len = max_len.max(1);
    let (start, end) = range.into_inner();
    let mut next = Some(start).filter(|s| *s <= end);
    std::iter::from_fn(move || {
        let from = next?;
        let to = from.saturating_add(max_len - 1).min(end);
        next = to.checked_add(1).filter(|n| *n <= end);
        Some((from, to))
    })
}

/// Drives one subscription through backfill, gap fill and live polling.
pub struct SubscriptionManager {
    id: SubscriptionId,
    watched: WatchedContract,
    /// First block to scan: the cached block plus one, or the
    /// initialization block.
    start_block: u64,
    chain: Arc<dyn ChainClient>,
    config: SyncConfig,
    pipeline_tx: PipelineSender,
    cancel: CancellationSignal,
}

impl SubscriptionManager {
    /// Create a new SubscriptionManager.
    ///
    /// # Arguments
    ///
    /// * `id` - Tag attached to every message this subscription emits
    /// * `watched` - Contract and filter to follow
    /// * `start_block` - First block of the backfill
    /// * `chain` - Chain client used for log queries
    /// * `config` - Margin, chunk size, polling and retry settings
    /// * `pipeline_tx` - Sender into the projector pipeline
    /// * `cancel` - Cancellation flag for this subscription
    pub fn new(
        id: SubscriptionId,
        watched: WatchedContract,
        start_block: u64,
        chain: Arc<dyn ChainClient>,
        config: SyncConfig,
        pipeline_tx: PipelineSender,
        cancel: CancellationSignal,
    ) -> Self {
        Self {
            id,
            watched,
            start_block,
            chain,
            config,
            pipeline_tx,
            cancel,
        }
    }

    /// Run until cancelled, the pipeline closes or the historical scan
    /// gives up.
    ///
    /// A historical-scan failure is also reported through the pipeline as
    /// [`PipelineEvent::Failed`] so the projector can stop.
    pub async fn run(mut self) -> Result<(), SubscriptionError> {
        info!(
            subscription = self.id,
            watched = %self.watched,
            start_block = self.start_block,
            "SubscriptionManager started"
        );
        let outcome = match self.sync_history().await {
            Ok(live_from) => self.follow(live_from).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) | Err(SubscriptionError::Cancelled) => {
                info!(subscription = self.id, watched = %self.watched, "SubscriptionManager stopped");
                Ok(())
            }
            Err(SubscriptionError::PipelineClosed) => {
                debug!(subscription = self.id, "Pipeline closed, stopping subscription");
                Err(SubscriptionError::PipelineClosed)
            }
            Err(e) => {
                error!(subscription = self.id, watched = %self.watched, error = %e, "Subscription failed");
                let _ = self
                    .emit(PipelineEvent::Failed {
                        reason: e.to_string(),
                    })
                    .await;
                Err(e)
            }
        }
    }

    /// Backfill and gap fill. Returns the first block of the live phase.
    async fn sync_history(&mut self) -> Result<u64, SubscriptionError> {
        let policy = self.config.startup_retry;
        let current = self.head(&policy).await?;
        let plan = ScanPlan::new(self.start_block, current, self.config.reorg_safety_margin);
        debug!(subscription = self.id, current, ?plan, "Planned historical scan");

        self.emit_lifecycle(LifecyclePhase::Syncing, self.start_block, plan.cached_to)
            .await?;
        if let Some(range) = plan.backfill.clone() {
            self.scan(range, &policy).await?;
        }
        self.emit_lifecycle(LifecyclePhase::Cached, self.start_block, plan.cached_to)
            .await?;
        info!(
            subscription = self.id,
            watched = %self.watched,
            to_block = plan.cached_to,
            "Backfill complete"
        );

        let (gap_from, gap_to) = match plan.gap.clone() {
            Some(range) => {
                self.scan(range.clone(), &policy).await?;
                range.into_inner()
            }
            None => (plan.live_from, current),
        };
        self.emit_lifecycle(LifecyclePhase::Synced, gap_from, gap_to)
            .await?;
        info!(
            subscription = self.id,
            watched = %self.watched,
            live_from = plan.live_from,
            "Gap fill complete, going live"
        );
        Ok(plan.live_from)
    }

    /// Poll the head forever, emitting logs of every new block.
    async fn follow(&mut self, mut next_block: u64) -> Result<(), SubscriptionError> {
        let policy = self.config.live_retry;
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(SubscriptionError::Cancelled),
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
            let head = self.head(&policy).await?;
            if head < next_block {
                continue;
            }
            self.scan(next_block..=head, &policy).await?;
            next_block = head + 1;
        }
    }

    async fn head(&mut self, policy: &RetryPolicy) -> Result<u64, SubscriptionError> {
        let chain = &self.chain;
        retry_with_backoff(policy, &mut self.cancel, "block_number", || async move {
            chain.block_number().await
        })
        .await
        .map_err(SubscriptionError::from_retry("block_number"))
    }

    /// Fetch and emit every matching log in `range`, chunk by chunk.
    async fn scan(
        &mut self,
        range: RangeInclusive<u64>,
        policy: &RetryPolicy,
    ) -> Result<(), SubscriptionError> {
        let filter = self.watched.log_filter();
        for (from, to) in chunks(range, self.config.max_block_range) {
            let logs = self.fetch(&filter, from, to, policy).await?;
            debug!(
                subscription = self.id,
                from_block = from,
                to_block = to,
                logs = logs.len(),
                "Range scanned"
            );
            for log in logs {
                self.emit(PipelineEvent::Log(log)).await?;
            }
        }
        Ok(())
    }

    async fn fetch(
        &mut self,
        filter: &LogFilter,
        from: u64,
        to: u64,
        policy: &RetryPolicy,
    ) -> Result<Vec<RawLog>, SubscriptionError> {
        let chain = &self.chain;
        let mut logs = retry_with_backoff(policy, &mut self.cancel, "past_events", || async move {
            chain.past_events(filter, from, to).await
        })
        .await
        .map_err(SubscriptionError::from_retry("past_events"))?;
        logs.sort_by_key(RawLog::position);
        Ok(logs)
    }

    async fn emit_lifecycle(
        &mut self,
        phase: LifecyclePhase,
        from_block: u64,
        to_block: u64,
    ) -> Result<(), SubscriptionError> {
        self.emit(PipelineEvent::Lifecycle(SubscriptionLifecycle {
            phase,
            watched: self.watched,
            from_block,
            to_block,
        }))
        .await
    }

    async fn emit(&mut self, event: PipelineEvent) -> Result<(), SubscriptionError> {
        let message = PipelineMessage {
            subscription_id: self.id,
            event,
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SubscriptionError::Cancelled),
            sent = self.pipeline_tx.send(message) => {
                sent.map_err(|_| SubscriptionError::PipelineClosed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{MockChain, flow_updated_log, vault_deposit_log};
    use crate::events::{PipelineReceiver, pipeline_channel};
    use alloy::primitives::Address;
    use std::time::Duration;

    const APP: Address = Address::new([0xaa; 20]);

    #[test]
    fn test_plan_fresh_start() {
        let plan = ScanPlan::new(100, 250, 100);
        assert_eq!(plan.backfill, Some(100..=150));
        assert_eq!(plan.cached_to, 150);
        assert_eq!(plan.gap, Some(151..=250));
        assert_eq!(plan.live_from, 251);
    }

    #[test]
    fn test_plan_resumes_after_cached_block() {
        let plan = ScanPlan::new(501, 1_000, 100);
        assert_eq!(plan.backfill, Some(501..=900));
        assert_eq!(plan.gap, Some(901..=1_000));
    }

    #[test]
    fn test_plan_near_head() {
        // Start already inside the unsafe window.
        let plan = ScanPlan::new(230, 250, 100);
        assert_eq!(plan.backfill, None);
        assert_eq!(plan.gap, Some(230..=250));
        assert_eq!(plan.live_from, 251);

        // Chain shorter than the margin.
        let plan = ScanPlan::new(0, 40, 100);
        assert_eq!(plan.backfill, Some(0..=0));
        assert_eq!(plan.gap, Some(1..=40));

        // Cache ahead of the node.
        let plan = ScanPlan::new(300, 250, 100);
        assert_eq!(plan.backfill, None);
        assert_eq!(plan.gap, None);
        assert_eq!(plan.live_from, 300);
    }

    #[test]
    fn test_chunks_cover_range_exactly() {
        let parts: Vec<_> = chunks(100..=350, 100).collect();
        assert_eq!(parts, vec![(100, 199), (200, 299), (300, 350)]);
        assert_eq!(chunks(5..=5, 10).collect::<Vec<_>>(), vec![(5, 5)]);
        assert_eq!(chunks(6..=5, 10).count(), 0);
        assert_eq!(
            chunks(u64::MAX - 1..=u64::MAX, 1).collect::<Vec<_>>(),
            vec![(u64::MAX - 1, u64::MAX - 1), (u64::MAX, u64::MAX)]
        );
    }

    fn config() -> SyncConfig {
        SyncConfig {
            reorg_safety_margin: 100,
            max_block_range: 5_000,
            poll_interval: Duration::from_secs(5),
            ..SyncConfig::default()
        }
    }

    fn spawn(
        chain: Arc<MockChain>,
        watched: WatchedContract,
        start_block: u64,
        config: SyncConfig,
    ) -> (
        PipelineReceiver,
        tokio::sync::watch::Sender<bool>,
        tokio::task::JoinHandle<Result<(), SubscriptionError>>,
    ) {
        let (tx, rx) = pipeline_channel();
        let (cancel_tx, cancel) = CancellationSignal::channel();
        let manager =
            SubscriptionManager::new(7, watched, start_block, chain, config, tx, cancel);
        (rx, cancel_tx, tokio::spawn(manager.run()))
    }

    fn describe(event: &PipelineEvent) -> String {
        match event {
            PipelineEvent::Log(log) => format!("log@{}", log.block_number),
            PipelineEvent::Lifecycle(l) => {
                format!("{:?}[{},{}]", l.phase, l.from_block, l.to_block)
            }
            PipelineEvent::Failed { .. } => "failed".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_start_phases_and_ordering() {
        let chain = Arc::new(MockChain::new());
        chain.set_head(250);
        let token = Address::repeat_byte(0x01);
        chain.push_event(APP, vault_deposit_log(token, Address::repeat_byte(2), 1), 120);
        chain.push_event(APP, vault_deposit_log(token, Address::repeat_byte(2), 2), 140);
        chain.push_event(APP, vault_deposit_log(token, Address::repeat_byte(2), 3), 200);
        chain.push_event(APP, vault_deposit_log(token, Address::repeat_byte(2), 4), 99);

        let (mut rx, cancel_tx, task) = spawn(chain.clone(), WatchedContract::all(APP), 100, config());

        let mut seen = Vec::new();
        for _ in 0..6 {
            let message = rx.recv().await.unwrap();
            assert_eq!(message.subscription_id, 7);
            seen.push(describe(&message.event));
        }
        assert_eq!(
            seen,
            vec![
                "Syncing[100,150]",
                "log@120",
                "log@140",
                "Cached[100,150]",
                "log@200",
                "Synced[151,250]",
            ]
        );
        assert_eq!(chain.queried_ranges(), vec![(100, 150), (151, 250)]);

        // Live phase picks up new blocks from 251.
        chain.push_event(APP, vault_deposit_log(token, Address::repeat_byte(2), 5), 251);
        chain.set_head(260);
        let message = rx.recv().await.unwrap();
        assert_eq!(describe(&message.event), "log@251");
        assert_eq!(chain.queried_ranges().last(), Some(&(251, 260)));

        let _ = cancel_tx.send(true);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backfill_never_passes_safe_height() {
        let chain = Arc::new(MockChain::new());
        chain.set_head(10_000);
        let config = SyncConfig {
            max_block_range: 1_000,
            ..config()
        };
        let (mut rx, cancel_tx, _task) =
            spawn(chain.clone(), WatchedContract::all(APP), 501, config);

        loop {
            let message = rx.recv().await.unwrap();
            if matches!(
                &message.event,
                PipelineEvent::Lifecycle(l) if l.phase == LifecyclePhase::Synced
            ) {
                break;
            }
        }
        let ranges = chain.queried_ranges();
        assert_eq!(ranges.first(), Some(&(501, 1_500)));
        let safe = 10_000 - 100;
        assert!(ranges.iter().all(|(from, to)| *to <= safe || *from > safe));
        assert!(ranges.contains(&(9_501, safe)));
        assert_eq!(ranges.last(), Some(&(safe + 1, 10_000)));
        let _ = cancel_tx.send(true);
    }

    #[tokio::test(start_paused = true)]
    async fn test_agent_filter_only_sees_agent_flows() {
        let chain = Arc::new(MockChain::new());
        chain.set_head(300);
        let cfa = Address::repeat_byte(0xcf);
        let token = Address::repeat_byte(0x01);
        let agent = Address::repeat_byte(0x0a);
        let other = Address::repeat_byte(0x0c);
        chain.push_event(cfa, flow_updated_log(token, agent, other, 5, -5, 5, ""), 110);
        chain.push_event(cfa, flow_updated_log(token, other, agent, 6, -6, 6, ""), 111);
        chain.push_event(cfa, flow_updated_log(token, other, other, 7, -7, 7, ""), 112);

        let (mut rx, cancel_tx, _task) = spawn(
            chain,
            WatchedContract::flows_sent_by(cfa, agent),
            100,
            config(),
        );
        let mut logs = Vec::new();
        loop {
            match rx.recv().await.unwrap().event {
                PipelineEvent::Log(log) => logs.push(log.block_number),
                PipelineEvent::Lifecycle(l) if l.phase == LifecyclePhase::Synced => break,
                _ => {}
            }
        }
        assert_eq!(logs, vec![110]);
        let _ = cancel_tx.send(true);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_scan_failure_is_retried() {
        let chain = Arc::new(MockChain::new());
        chain.set_head(150);
        chain.fail_next("past_events", 2);
        let (mut rx, cancel_tx, _task) = spawn(chain.clone(), WatchedContract::all(APP), 0, config());
        loop {
            let message = rx.recv().await.unwrap();
            if let PipelineEvent::Lifecycle(l) = &message.event
                && l.phase == LifecyclePhase::Synced
            {
                break;
            }
            assert!(!matches!(message.event, PipelineEvent::Failed { .. }));
        }
        let _ = cancel_tx.send(true);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_scan_reports_failure() {
        let chain = Arc::new(MockChain::new());
        chain.set_head(150);
        chain.break_operation("past_events");
        let (mut rx, _cancel_tx, task) = spawn(chain, WatchedContract::all(APP), 0, config());

        let first = rx.recv().await.unwrap();
        assert_eq!(describe(&first.event), "Syncing[0,50]");
        let failed = rx.recv().await.unwrap();
        assert!(matches!(failed.event, PipelineEvent::Failed { .. }));
        assert!(matches!(
            task.await.unwrap(),
            Err(SubscriptionError::RetriesExhausted {
                operation: "past_events",
                attempts: 5,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_unblocks_full_pipeline() {
        let chain = Arc::new(MockChain::new());
        chain.set_head(1_000);
        for block in 0..400 {
            chain.push_event(
                APP,
                vault_deposit_log(Address::repeat_byte(1), Address::repeat_byte(2), block),
                block,
            );
        }
        // Nobody drains `rx`, so the task blocks on a full channel.
        let (_rx, cancel_tx, task) = spawn(chain, WatchedContract::all(APP), 0, config());
        tokio::time::sleep(Duration::from_secs(1)).await;
        let _ = cancel_tx.send(true);
        let outcome = tokio::time::timeout(Duration::from_secs(5), task).await;
        assert!(matches!(outcome, Ok(Ok(Ok(())))));
    }
}
