//! Configuration types for the flow projector.
//!
//! These types represent the validated runtime configuration used by the
//! projector. Loading and parsing the config file is handled by the server
//! crate.

mod sync;
mod tokens;

pub use sync::SyncConfig;
pub use tokens::{TokenOverride, TokenOverrides};

use alloy::primitives::Address;

/// Everything the projector needs besides its chain client and store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectorConfig {
    /// App contract: emits vault and agent events, exposes the agent.
    pub app_address: Address,
    /// Constant flow agreement contract emitting `FlowUpdated`.
    pub flow_agreement_address: Address,
    pub sync: SyncConfig,
    pub token_overrides: TokenOverrides,
}

impl ProjectorConfig {
    pub fn new(app_address: Address, flow_agreement_address: Address) -> Self {
        Self {
            app_address,
            flow_agreement_address,
            sync: SyncConfig::default(),
            token_overrides: TokenOverrides::default(),
        }
    }
}
