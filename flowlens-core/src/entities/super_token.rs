use crate::chain::{LogPosition, TokenHandle};
use crate::utils::checkpoint::{current_amount, depletion_date, to_signed};
use alloy::primitives::{Address, I256, U256};
use flowlens_sdk::objects::{SuperTokenView, UnderlyingTokenView};
use serde::{Deserialize, Serialize};

/// The ERC20 wrapped by a super token.
///
/// Native-asset super tokens carry the default (zero address, empty names).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnderlyingToken {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// A super token held or streamed by the agent.
///
/// `balance` is only exact at `last_update_timestamp`; use
/// [`SuperToken::current_balance`] for any other instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperToken {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub underlying_token: UnderlyingToken,
    pub balance: U256,
    /// Agent's net rate of change, per second.
    pub net_flow: I256,
    pub last_update_timestamp: u64,
    /// Log that produced `balance` and `net_flow`. `None` when they come
    /// from a head read rather than from an event, so any event supersedes
    /// them.
    #[serde(default)]
    pub last_update_position: Option<LogPosition>,
    pub liquidation_period_seconds: u64,
    pub logo_uri: Option<String>,
    pub mainnet_token_equivalent_address: Option<Address>,
    /// False while static metadata could not be read yet.
    #[serde(default = "metadata_resolved_default")]
    pub metadata_resolved: bool,
}

fn metadata_resolved_default() -> bool {
    true
}

impl SuperToken {
    /// A token whose metadata has not been read yet.
    pub fn unresolved(address: Address) -> Self {
        Self {
            address,
            name: String::new(),
            symbol: String::new(),
            decimals: 18,
            underlying_token: UnderlyingToken::default(),
            balance: U256::ZERO,
            net_flow: I256::ZERO,
            last_update_timestamp: 0,
            last_update_position: None,
            liquidation_period_seconds: 0,
            logo_uri: None,
            mainnet_token_equivalent_address: None,
            metadata_resolved: false,
        }
    }

    /// Copy static metadata from a freshly read handle.
    pub fn resolve(&mut self, handle: &TokenHandle) {
        self.name = handle.metadata.name.clone();
        self.symbol = handle.metadata.symbol.clone();
        self.decimals = handle.metadata.decimals;
        self.underlying_token = handle.metadata.underlying_token.clone();
        self.liquidation_period_seconds = handle.liquidation_period_seconds;
        self.metadata_resolved = true;
    }

    /// Balance projected to `now` under the current net flow.
    pub fn current_balance(&self, now: u64) -> I256 {
        current_amount(
            to_signed(self.balance),
            self.net_flow,
            self.last_update_timestamp,
            now,
        )
    }

    /// When the balance runs dry at the current net flow, if ever.
    pub fn depletion_date(&self, now: u64) -> Option<u64> {
        depletion_date(
            to_signed(self.balance),
            self.net_flow,
            now,
            self.last_update_timestamp,
        )
    }

    pub fn to_view(&self, now: u64) -> SuperTokenView {
        SuperTokenView {
            address: self.address.to_string(),
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            decimals: self.decimals,
            underlying_token: UnderlyingTokenView {
                address: self.underlying_token.address.to_string(),
                name: self.underlying_token.name.clone(),
                symbol: self.underlying_token.symbol.clone(),
                decimals: self.underlying_token.decimals,
            },
            balance: self.balance.to_string(),
            current_balance: self.current_balance(now).to_string(),
            net_flow: self.net_flow.to_string(),
            last_update_timestamp: self.last_update_timestamp,
            liquidation_period_seconds: self.liquidation_period_seconds,
            depletion_date: self.depletion_date(now),
            logo_uri: self.logo_uri.clone(),
            mainnet_token_equivalent_address: self
                .mainnet_token_equivalent_address
                .map(|address| address.to_string()),
        }
    }
}
