//! Boundary to the on-chain contract layer.
//!
//! The projector never talks to a node directly; everything goes through
//! [`ChainClient`]. [`AlloyChainClient`] implements it over JSON-RPC, and
//! tests substitute a scripted client.

pub mod abi;
pub mod rpc;
pub mod token_cache;

#[cfg(test)]
pub(crate) mod mock;

pub use rpc::AlloyChainClient;
pub use token_cache::{TokenHandle, TokenHandleCache};

use crate::entities::UnderlyingToken;
use alloy::primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by the chain layer.
#[derive(Debug, Error)]
pub enum ChainError {
    /// JSON-RPC transport failure
    #[error("rpc transport error: {0}")]
    Transport(#[from] alloy::transports::TransportError),

    /// Contract call reverted or returned undecodable data
    #[error("contract call error: {0}")]
    Contract(#[from] alloy::contract::Error),

    /// The node does not know the requested block
    #[error("block {0} not found")]
    BlockNotFound(u64),

    /// A value returned by the node does not fit the expected type
    #[error("value out of range: {0}")]
    OutOfRange(String),

    /// The node answered, but without the data we need
    #[error("chain data unavailable: {0}")]
    Unavailable(String),
}

/// `(block_number, log_index)`: total order of logs on the chain.
pub type LogPosition = (u64, u64);

/// A log entry as delivered by the node, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub log_index: u64,
    /// Filled by nodes that support it; otherwise fetched from the header.
    pub block_timestamp: Option<u64>,
    pub transaction_hash: Option<B256>,
}

impl RawLog {
    /// Position of the log in the chain, used for ordering.
    pub fn position(&self) -> LogPosition {
        (self.block_number, self.log_index)
    }
}

/// A log filter: one contract, optional constraints on topics 0..=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    pub topics: [Option<B256>; 4],
}

impl LogFilter {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            topics: [None; 4],
        }
    }

    pub fn with_topic(mut self, index: usize, topic: B256) -> Self {
        if let Some(slot) = self.topics.get_mut(index) {
            *slot = Some(topic);
        }
        self
    }
}

/// Static metadata of a super token, read once per address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub underlying_token: UnderlyingToken,
}

/// Read and log-query capabilities of the contract layer.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current head block number.
    async fn block_number(&self) -> Result<u64, ChainError>;

    /// Timestamp (unix seconds) of a block.
    async fn block_timestamp(&self, block_number: u64) -> Result<u64, ChainError>;

    /// Logs matching `filter` in `[from_block, to_block]`, in chain order.
    async fn past_events(
        &self,
        filter: &LogFilter,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, ChainError>;

    /// The agent currently configured on the app contract.
    async fn agent(&self, app: Address) -> Result<Address, ChainError>;

    /// Block at which `contract` was initialized.
    async fn initialization_block(&self, contract: Address) -> Result<u64, ChainError>;

    async fn token_metadata(&self, token: Address) -> Result<TokenMetadata, ChainError>;

    /// Balance of `holder` at the end of `block`, or at the head if `None`.
    async fn balance_of(
        &self,
        token: Address,
        holder: Address,
        block: Option<u64>,
    ) -> Result<U256, ChainError>;

    /// Liquidation period the flow agreement applies to `token`.
    async fn liquidation_period(&self, token: Address) -> Result<u64, ChainError>;
}
