//! Per-token display data that the chain does not provide.

use alloy::primitives::Address;
use std::collections::HashMap;

/// Display overrides for one super token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenOverride {
    pub logo_uri: Option<String>,
    pub mainnet_token_equivalent_address: Option<Address>,
}

/// Token overrides indexed by super token address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenOverrides {
    by_address: HashMap<Address, TokenOverride>,
}

impl TokenOverrides {
    pub fn insert(&mut self, address: Address, entry: TokenOverride) {
        self.by_address.insert(address, entry);
    }

    pub fn get(&self, address: &Address) -> Option<&TokenOverride> {
        self.by_address.get(address)
    }
}

impl FromIterator<(Address, TokenOverride)> for TokenOverrides {
    fn from_iter<I: IntoIterator<Item = (Address, TokenOverride)>>(iter: I) -> Self {
        Self {
            by_address: iter.into_iter().collect(),
        }
    }
}
