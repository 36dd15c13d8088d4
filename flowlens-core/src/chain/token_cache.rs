//! Lazily populated cache of per-token static data.
//!
//! Token contracts never change address, so entries are never invalidated.
//! Two tasks racing on the same miss both fetch and the last insert wins;
//! the values are equivalent.

use super::{ChainClient, ChainError, TokenMetadata};
use alloy::primitives::Address;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Everything about a token that is read once and reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHandle {
    pub address: Address,
    pub metadata: TokenMetadata,
    pub liquidation_period_seconds: u64,
}

/// Shared token-address → [`TokenHandle`] cache.
///
/// Cheap to clone; all clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct TokenHandleCache {
    inner: Arc<RwLock<HashMap<Address, Arc<TokenHandle>>>>,
}

impl TokenHandleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, token: Address) -> Option<Arc<TokenHandle>> {
        self.inner.read().await.get(&token).cloned()
    }

    /// Return the cached handle, reading it from the chain on first sight.
    ///
    /// Failed reads are not cached, so the next caller tries again.
    pub async fn get_or_fetch(
        &self,
        chain: &dyn ChainClient,
        token: Address,
    ) -> Result<Arc<TokenHandle>, ChainError> {
        if let Some(handle) = self.get(token).await {
            return Ok(handle);
        }

        debug!(%token, "Token handle cache miss");
        let metadata = chain.token_metadata(token).await?;
        let liquidation_period_seconds = chain.liquidation_period(token).await?;
        let handle = Arc::new(TokenHandle {
            address: token,
            metadata,
            liquidation_period_seconds,
        });

        self.inner.write().await.insert(token, handle.clone());
        Ok(handle)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
