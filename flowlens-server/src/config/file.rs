//! TOML file configuration structures.
//!
//! These structs directly map to the `flowlens-config.toml` file format.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub chain: ChainConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    /// Static display data for known super tokens.
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Chain connection and the contracts to project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// HTTP JSON-RPC endpoint.
    pub rpc_url: Url,
    /// App contract emitting vault and agent events.
    pub app_address: Address,
    /// Constant flow agreement contract emitting `FlowUpdated`.
    pub flow_agreement_address: Address,
    /// Superfluid host, queried for the CFA liquidation period.
    pub host_address: Address,
}

/// Subscription tuning. Every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub reorg_safety_margin: u64,
    pub max_block_range: u64,
    pub poll_interval_secs: u64,
    pub startup_max_attempts: u32,
    pub startup_base_delay_ms: u64,
    pub startup_max_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reorg_safety_margin: 100,
            max_block_range: 5_000,
            poll_interval_secs: 5,
            startup_max_attempts: 5,
            startup_base_delay_ms: 1_000,
            startup_max_delay_ms: 30_000,
        }
    }
}

/// Display overrides for one super token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub address: Address,
    pub logo_uri: Option<String>,
    /// Address of the equivalent token on mainnet.
    pub mainnet_equivalent: Option<Address>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_parsing() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"

[chain]
rpc_url = "https://sepolia.example.org/rpc"
app_address = "0x1111111111111111111111111111111111111111"
flow_agreement_address = "0x2222222222222222222222222222222222222222"
host_address = "0x3333333333333333333333333333333333333333"

[sync]
reorg_safety_margin = 12
poll_interval_secs = 2

[[tokens]]
address = "0x4444444444444444444444444444444444444444"
logo_uri = "https://tokens.example.org/usdcx.svg"
mainnet_equivalent = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.chain.app_address, Address::repeat_byte(0x11));
        assert_eq!(config.sync.reorg_safety_margin, 12);
        assert_eq!(config.sync.poll_interval_secs, 2);
        // unspecified fields keep their defaults
        assert_eq!(config.sync.max_block_range, 5_000);
        assert_eq!(config.sync.startup_max_attempts, 5);
        assert_eq!(config.tokens.len(), 1);
        assert!(config.tokens[0].mainnet_equivalent.is_some());
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let toml_str = r#"
[chain]
rpc_url = "http://127.0.0.1:8545"
app_address = "0x1111111111111111111111111111111111111111"
flow_agreement_address = "0x2222222222222222222222222222222222222222"
host_address = "0x3333333333333333333333333333333333333333"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, default_listen_addr());
        assert_eq!(config.sync.reorg_safety_margin, 100);
        assert!(config.tokens.is_empty());
    }

    #[test]
    fn test_missing_chain_section_is_rejected() {
        assert!(toml::from_str::<FileConfig>("[server]\nlisten = \"127.0.0.1:1\"\n").is_err());
    }
}
