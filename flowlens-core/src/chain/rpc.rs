//! JSON-RPC implementation of [`ChainClient`] on top of an alloy provider.

use super::abi::{IERC20Metadata, IFlowApp, ISuperToken};
use super::{ChainClient, ChainError, LogFilter, RawLog, TokenMetadata};
use crate::entities::UnderlyingToken;
use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{BlockId, Filter, Log};
use async_trait::async_trait;
use tracing::debug;

/// [`ChainClient`] backed by an HTTP JSON-RPC endpoint.
#[derive(Clone)]
pub struct AlloyChainClient {
    provider: DynProvider,
    /// App contract that owns the agent; serves the liquidation-period helper.
    app: Address,
    /// Superfluid host passed to the liquidation-period helper.
    host: Address,
}

impl AlloyChainClient {
    /// Connect to the node at `rpc_url`.
    pub fn connect(rpc_url: url::Url, app: Address, host: Address) -> Self {
        let provider = ProviderBuilder::new().connect_http(rpc_url).erased();
        Self::new(provider, app, host)
    }

    pub fn new(provider: DynProvider, app: Address, host: Address) -> Self {
        Self {
            provider,
            app,
            host,
        }
    }

    fn to_u64(value: U256, what: &str) -> Result<u64, ChainError> {
        u64::try_from(value).map_err(|_| ChainError::OutOfRange(format!("{what}: {value}")))
    }

    fn convert_log(log: Log) -> Result<RawLog, ChainError> {
        let block_number = log
            .block_number
            .ok_or_else(|| ChainError::Unavailable("log without block number".into()))?;
        let log_index = log
            .log_index
            .ok_or_else(|| ChainError::Unavailable("log without log index".into()))?;
        Ok(RawLog {
            address: log.inner.address,
            topics: log.inner.data.topics().to_vec(),
            data: log.inner.data.data.clone(),
            block_number,
            log_index,
            block_timestamp: log.block_timestamp,
            transaction_hash: log.transaction_hash,
        })
    }
}

#[async_trait]
impl ChainClient for AlloyChainClient {
    async fn block_number(&self) -> Result<u64, ChainError> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<u64, ChainError> {
        let block = self
            .provider
            .get_block_by_number(block_number.into())
            .await?
            .ok_or(ChainError::BlockNotFound(block_number))?;
        Ok(block.header.timestamp)
    }

    async fn past_events(
        &self,
        filter: &LogFilter,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, ChainError> {
        let mut query = Filter::new()
            .address(filter.address)
            .from_block(from_block)
            .to_block(to_block);
        let [topic0, topic1, topic2, topic3] = filter.topics;
        if let Some(signature) = topic0 {
            query = query.event_signature(signature);
        }
        if let Some(topic) = topic1 {
            query = query.topic1(topic);
        }
        if let Some(topic) = topic2 {
            query = query.topic2(topic);
        }
        if let Some(topic) = topic3 {
            query = query.topic3(topic);
        }

        let logs = self.provider.get_logs(&query).await?;
        debug!(
            contract = %filter.address,
            from_block,
            to_block,
            count = logs.len(),
            "eth_getLogs"
        );

        let mut logs = logs
            .into_iter()
            .filter(|log| !log.removed)
            .map(Self::convert_log)
            .collect::<Result<Vec<_>, _>>()?;
        logs.sort_by_key(RawLog::position);
        Ok(logs)
    }

    async fn agent(&self, app: Address) -> Result<Address, ChainError> {
        Ok(IFlowApp::new(app, self.provider.clone()).agent().call().await?)
    }

    async fn initialization_block(&self, contract: Address) -> Result<u64, ChainError> {
        let block = IFlowApp::new(contract, self.provider.clone())
            .getInitializationBlock()
            .call()
            .await?;
        Self::to_u64(block, "initialization block")
    }

    async fn token_metadata(&self, token: Address) -> Result<TokenMetadata, ChainError> {
        let super_token = ISuperToken::new(token, self.provider.clone());
        let name = super_token.name().call().await?;
        let symbol = super_token.symbol().call().await?;
        let decimals = super_token.decimals().call().await?;
        let underlying = super_token.getUnderlyingToken().call().await?;

        // Native-asset super tokens have no ERC20 underneath.
        let underlying_token = if underlying == Address::ZERO {
            UnderlyingToken::default()
        } else {
            let erc20 = IERC20Metadata::new(underlying, self.provider.clone());
            UnderlyingToken {
                address: underlying,
                name: erc20.name().call().await?,
                symbol: erc20.symbol().call().await?,
                decimals: erc20.decimals().call().await?,
            }
        };

        Ok(TokenMetadata {
            name,
            symbol,
            decimals,
            underlying_token,
        })
    }

    async fn balance_of(
        &self,
        token: Address,
        holder: Address,
        block: Option<u64>,
    ) -> Result<U256, ChainError> {
        let super_token = ISuperToken::new(token, self.provider.clone());
        let call = super_token.balanceOf(holder);
        let call = match block {
            Some(block) => call.block(BlockId::number(block)),
            None => call,
        };
        Ok(call.call().await?)
    }

    async fn liquidation_period(&self, token: Address) -> Result<u64, ChainError> {
        let period = IFlowApp::new(self.app, self.provider.clone())
            .getCFAv1LiquidationPeriod(self.host, token)
            .call()
            .await?;
        Self::to_u64(period, "liquidation period")
    }
}
