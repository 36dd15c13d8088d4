//! Persistence of the projector's cached-state blob.
//!
//! The blob is the whole [`ProjectorState`] as JSON, which carries the
//! per-subscription block numbers a restart resumes from. Stores keep the
//! JSON value and decode it on load, so a blob written by an incompatible
//! build surfaces as [`StoreError::Serialization`].

use super::ProjectorState;
use crate::framework::DatabaseProcessor;
use alloy::primitives::Address;
use async_trait::async_trait;
use kanau::processor::Processor;
use serde_json::Value;
use sqlx::types::Json;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Load/save the cached state of one app contract.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load(&self, app: Address) -> Result<Option<ProjectorState>, StoreError>;

    async fn save(&self, app: Address, state: &ProjectorState) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
/// Get the stored snapshot of an app contract, if any.
pub struct GetProjectorSnapshot {
    pub app_address: Address,
}

impl Processor<GetProjectorSnapshot> for DatabaseProcessor {
    type Output = Option<Value>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetProjectorSnapshot")]
    async fn process(&self, query: GetProjectorSnapshot) -> Result<Option<Value>, sqlx::Error> {
        let row: Option<Json<Value>> = sqlx::query_scalar(
            r#"
            SELECT state
            FROM projector_snapshots
            WHERE app_address = $1
            "#,
        )
        .bind(query.app_address.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|Json(blob)| blob))
    }
}

#[derive(Debug, Clone)]
/// Insert or replace the snapshot of an app contract.
pub struct UpsertProjectorSnapshot {
    pub app_address: Address,
    pub state: Value,
}

impl Processor<UpsertProjectorSnapshot> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertProjectorSnapshot")]
    async fn process(&self, upsert: UpsertProjectorSnapshot) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO projector_snapshots (app_address, state, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (app_address) DO UPDATE SET
                state = EXCLUDED.state,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(upsert.app_address.to_string())
        .bind(Json(upsert.state))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for DatabaseProcessor {
    async fn load(&self, app: Address) -> Result<Option<ProjectorState>, StoreError> {
        let blob = self.process(GetProjectorSnapshot { app_address: app }).await?;
        Ok(blob.map(serde_json::from_value::<ProjectorState>).transpose()?)
    }

    async fn save(&self, app: Address, state: &ProjectorState) -> Result<(), StoreError> {
        self.process(UpsertProjectorSnapshot {
            app_address: app,
            state: serde_json::to_value(state)?,
        })
        .await?;
        Ok(())
    }
}

/// Process-local store, used for ephemeral runs and tests.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<HashMap<Address, Value>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load(&self, app: Address) -> Result<Option<ProjectorState>, StoreError> {
        let blob = self.snapshots.read().await.get(&app).cloned();
        Ok(blob.map(serde_json::from_value::<ProjectorState>).transpose()?)
    }

    async fn save(&self, app: Address, state: &ProjectorState) -> Result<(), StoreError> {
        let blob = serde_json::to_value(state)?;
        self.snapshots.write().await.insert(app, blob);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_store_round_trip() {
        let store = InMemorySnapshotStore::new();
        let app = Address::repeat_byte(0x0f);
        assert!(matches!(store.load(app).await, Ok(None)));

        let mut state = ProjectorState::new(Address::repeat_byte(0x0a));
        state.advance_cache("app", 42);
        assert!(store.save(app, &state).await.is_ok());

        let loaded = store.load(app).await.ok().flatten();
        assert_eq!(loaded.and_then(|s| s.cached_block("app")), Some(42));
    }

    #[tokio::test]
    async fn test_undecodable_blob_is_a_serialization_error() {
        let store = InMemorySnapshotStore::new();
        let app = Address::repeat_byte(0x0f);
        store
            .snapshots
            .write()
            .await
            .insert(app, serde_json::json!({ "agent_address": 12 }));

        let loaded = store.load(app).await;
        assert!(matches!(loaded, Err(StoreError::Serialization(_))));
    }
}
