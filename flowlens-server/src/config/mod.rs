//! Configuration module for flowlens-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables.

pub mod file;

use crate::config::file::FileConfig;
use flowlens_core::config::{ProjectorConfig, SyncConfig, TokenOverride, TokenOverrides};
use flowlens_core::utils::backoff::RetryPolicy;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Loaded configuration, split into what the server and the projector need.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub listen: SocketAddr,
    pub rpc_url: Url,
    pub host_address: alloy_primitives::Address,
    pub projector: ProjectorConfig,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    /// 4. Build the loaded configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        self.load_str(&config_content)
    }

    fn load_str(&self, content: &str) -> Result<LoadedConfig, ConfigError> {
        let mut file_config: FileConfig = toml::from_str(content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        validate(&file_config)?;
        Ok(build_loaded_config(file_config))
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    let sync = &config.sync;
    if sync.reorg_safety_margin == 0 {
        return Err(ConfigError::ValidationError(
            "sync.reorg_safety_margin must be positive".into(),
        ));
    }
    if sync.max_block_range == 0 {
        return Err(ConfigError::ValidationError(
            "sync.max_block_range must be positive".into(),
        ));
    }
    if sync.startup_max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "sync.startup_max_attempts must be positive".into(),
        ));
    }

    let chain = &config.chain;
    if chain.app_address == chain.flow_agreement_address
        || chain.app_address == chain.host_address
        || chain.flow_agreement_address == chain.host_address
    {
        return Err(ConfigError::ValidationError(
            "chain contract addresses must be distinct".into(),
        ));
    }

    let mut seen = std::collections::HashSet::new();
    for token in &config.tokens {
        if !seen.insert(token.address) {
            return Err(ConfigError::ValidationError(format!(
                "token {} is configured twice",
                token.address
            )));
        }
    }
    Ok(())
}

fn build_loaded_config(file_config: FileConfig) -> LoadedConfig {
    let sync = file_config.sync;
    let startup_retry = RetryPolicy {
        max_attempts: sync.startup_max_attempts,
        base_delay: Duration::from_millis(sync.startup_base_delay_ms),
        max_delay: Duration::from_millis(sync.startup_max_delay_ms),
    };
    let token_overrides: TokenOverrides = file_config
        .tokens
        .into_iter()
        .map(|token| {
            (
                token.address,
                TokenOverride {
                    logo_uri: token.logo_uri,
                    mainnet_token_equivalent_address: token.mainnet_equivalent,
                },
            )
        })
        .collect();

    let mut projector = ProjectorConfig::new(
        file_config.chain.app_address,
        file_config.chain.flow_agreement_address,
    );
    projector.sync = SyncConfig {
        reorg_safety_margin: sync.reorg_safety_margin,
        max_block_range: sync.max_block_range,
        poll_interval: Duration::from_secs(sync.poll_interval_secs),
        startup_retry,
        live_retry: RetryPolicy {
            max_attempts: 0,
            ..startup_retry
        },
    };
    projector.token_overrides = token_overrides;

    LoadedConfig {
        listen: file_config.server.listen,
        rpc_url: file_config.chain.rpc_url,
        host_address: file_config.chain.host_address,
        projector,
    }
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}
