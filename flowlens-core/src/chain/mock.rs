//! Scripted [`ChainClient`] for tests.

use super::abi::{FlowUpdated, SetAgent, VaultDeposit, VaultTransfer};
use super::{ChainClient, ChainError, LogFilter, RawLog, TokenMetadata};
use crate::entities::UnderlyingToken;
use alloy::primitives::aliases::I96;
use alloy::primitives::{Address, B256, Bytes, I256, U256};
use alloy::sol_types::{SolEvent, SolValue};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct Inner {
    head: u64,
    timestamps: HashMap<u64, u64>,
    logs: Vec<RawLog>,
    agent: Address,
    initialization_block: u64,
    tokens: HashMap<Address, (TokenMetadata, u64)>,
    /// Balance history per (token, holder): block it takes effect at -> balance.
    balances: HashMap<(Address, Address), BTreeMap<u64, U256>>,
    /// Remaining failures per operation name.
    failures: HashMap<&'static str, u32>,
    /// Operations that fail forever.
    broken: HashSet<&'static str>,
    queried_ranges: Vec<(u64, u64)>,
}

/// In-memory chain whose answers are set up by the test.
///
/// Blocks without an explicit timestamp get `1_000 * block_number`.
#[derive(Default)]
pub struct MockChain {
    inner: Mutex<Inner>,
    metadata_reads: AtomicUsize,
    balance_reads: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_head(&self, block: u64) {
        self.inner.lock().unwrap().head = block;
    }

    pub fn set_block_timestamp(&self, block: u64, timestamp: u64) {
        self.inner.lock().unwrap().timestamps.insert(block, timestamp);
    }

    pub fn set_agent(&self, agent: Address) {
        self.inner.lock().unwrap().agent = agent;
    }

    pub fn set_initialization_block(&self, block: u64) {
        self.inner.lock().unwrap().initialization_block = block;
    }

    pub fn add_token(
        &self,
        token: Address,
        name: &str,
        symbol: &str,
        decimals: u8,
        liquidation_period: u64,
    ) {
        let metadata = TokenMetadata {
            name: name.to_owned(),
            symbol: symbol.to_owned(),
            decimals,
            underlying_token: UnderlyingToken::default(),
        };
        self.inner
            .lock()
            .unwrap()
            .tokens
            .insert(token, (metadata, liquidation_period));
    }

    /// Replace the whole balance history with `balance` from genesis on.
    pub fn set_balance(&self, token: Address, holder: Address, balance: U256) {
        self.inner
            .lock()
            .unwrap()
            .balances
            .insert((token, holder), BTreeMap::from([(0, balance)]));
    }

    /// `holder` owns `balance` from the end of `block` on.
    pub fn set_balance_at(&self, token: Address, holder: Address, block: u64, balance: U256) {
        self.inner
            .lock()
            .unwrap()
            .balances
            .entry((token, holder))
            .or_default()
            .insert(block, balance);
    }

    /// Append a log; `block_timestamp` is left for the consumer to look up.
    pub fn push_log(&self, address: Address, topics: Vec<B256>, data: Bytes, block: u64) {
        let mut inner = self.inner.lock().unwrap();
        let log_index = inner.logs.iter().filter(|l| l.block_number == block).count() as u64;
        inner.logs.push(RawLog {
            address,
            topics,
            data,
            block_number: block,
            log_index,
            block_timestamp: None,
            transaction_hash: None,
        });
    }

    /// Make the next `times` calls of `operation` fail.
    pub fn fail_next(&self, operation: &'static str, times: u32) {
        self.inner.lock().unwrap().failures.insert(operation, times);
    }

    /// Make every call of `operation` fail.
    pub fn break_operation(&self, operation: &'static str) {
        self.inner.lock().unwrap().broken.insert(operation);
    }

    pub fn repair_operation(&self, operation: &'static str) {
        self.inner.lock().unwrap().broken.remove(operation);
    }

    pub fn metadata_reads(&self) -> usize {
        self.metadata_reads.load(Ordering::SeqCst)
    }

    pub fn balance_reads(&self) -> usize {
        self.balance_reads.load(Ordering::SeqCst)
    }

    /// Every `[from, to]` range passed to `past_events`, in call order.
    pub fn queried_ranges(&self) -> Vec<(u64, u64)> {
        self.inner.lock().unwrap().queried_ranges.clone()
    }

    fn check(&self, operation: &'static str) -> Result<(), ChainError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.broken.contains(operation) {
            return Err(ChainError::Unavailable(format!("{operation} broken")));
        }
        if let Some(remaining) = inner.failures.get_mut(operation)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(ChainError::Unavailable(format!("{operation} failed")));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn block_number(&self) -> Result<u64, ChainError> {
        self.check("block_number")?;
        Ok(self.inner.lock().unwrap().head)
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<u64, ChainError> {
        self.check("block_timestamp")?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .timestamps
            .get(&block_number)
            .copied()
            .unwrap_or(block_number * 1_000))
    }

    async fn past_events(
        &self,
        filter: &LogFilter,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, ChainError> {
        self.check("past_events")?;
        let mut inner = self.inner.lock().unwrap();
        inner.queried_ranges.push((from_block, to_block));
        let mut logs: Vec<RawLog> = inner
            .logs
            .iter()
            .filter(|log| (from_block..=to_block).contains(&log.block_number))
            .filter(|log| matches(filter, log))
            .cloned()
            .collect();
        logs.sort_by_key(RawLog::position);
        Ok(logs)
    }

    async fn agent(&self, _app: Address) -> Result<Address, ChainError> {
        self.check("agent")?;
        Ok(self.inner.lock().unwrap().agent)
    }

    async fn initialization_block(&self, _contract: Address) -> Result<u64, ChainError> {
        self.check("initialization_block")?;
        Ok(self.inner.lock().unwrap().initialization_block)
    }

    async fn token_metadata(&self, token: Address) -> Result<TokenMetadata, ChainError> {
        self.metadata_reads.fetch_add(1, Ordering::SeqCst);
        self.check("token_metadata")?;
        self.inner
            .lock()
            .unwrap()
            .tokens
            .get(&token)
            .map(|(metadata, _)| metadata.clone())
            .ok_or_else(|| ChainError::Unavailable(format!("unknown token {token}")))
    }

    async fn balance_of(
        &self,
        token: Address,
        holder: Address,
        block: Option<u64>,
    ) -> Result<U256, ChainError> {
        self.balance_reads.fetch_add(1, Ordering::SeqCst);
        self.check("balance_of")?;
        let inner = self.inner.lock().unwrap();
        let Some(history) = inner.balances.get(&(token, holder)) else {
            return Ok(U256::ZERO);
        };
        let at = match block {
            Some(block) => history.range(..=block).next_back(),
            None => history.iter().next_back(),
        };
        Ok(at.map(|(_, balance)| *balance).unwrap_or_default())
    }

    async fn liquidation_period(&self, token: Address) -> Result<u64, ChainError> {
        self.check("liquidation_period")?;
        self.inner
            .lock()
            .unwrap()
            .tokens
            .get(&token)
            .map(|(_, period)| *period)
            .ok_or_else(|| ChainError::Unavailable(format!("unknown token {token}")))
    }
}

/// Whether `log` passes `filter`, as a node would decide it.
fn matches(filter: &LogFilter, log: &RawLog) -> bool {
    log.address == filter.address
        && filter
            .topics
            .iter()
            .enumerate()
            .all(|(i, wanted)| match wanted {
                Some(topic) => log.topics.get(i) == Some(topic),
                None => true,
            })
}

/// Topics and data of an encoded log, ready for [`MockChain::push_log`].
pub type EncodedLog = (Vec<B256>, Bytes);

fn encode<E: SolEvent>(event: &E) -> EncodedLog {
    let data = event.encode_log_data();
    (data.topics().to_vec(), data.data)
}

pub fn flow_updated_log(
    token: Address,
    sender: Address,
    receiver: Address,
    flow_rate: i64,
    total_sender_flow_rate: i64,
    total_receiver_flow_rate: i64,
    description: &str,
) -> EncodedLog {
    let user_data = if description.is_empty() {
        Bytes::new()
    } else {
        Bytes::from((description.to_owned(),).abi_encode_params())
    };
    encode(&FlowUpdated {
        token,
        sender,
        receiver,
        flowRate: I96::try_from(flow_rate).unwrap(),
        totalSenderFlowRate: I256::try_from(total_sender_flow_rate).unwrap(),
        totalReceiverFlowRate: I256::try_from(total_receiver_flow_rate).unwrap(),
        userData: user_data,
    })
}

pub fn vault_deposit_log(token: Address, sender: Address, amount: u64) -> EncodedLog {
    encode(&VaultDeposit {
        token,
        sender,
        amount: U256::from(amount),
    })
}

pub fn vault_transfer_log(token: Address, to: Address, amount: u64) -> EncodedLog {
    encode(&VaultTransfer {
        token,
        to,
        amount: U256::from(amount),
    })
}

pub fn set_agent_log(agent: Address) -> EncodedLog {
    encode(&SetAgent { agent })
}

impl MockChain {
    pub fn push_event(&self, address: Address, (topics, data): EncodedLog, block: u64) {
        self.push_log(address, topics, data, block);
    }
}
