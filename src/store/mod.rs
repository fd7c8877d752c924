pub mod memory;
pub mod redis_store;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::{
    config::{StoreBackendConfig, StoreConfig},
    store::{memory::MemoryStore, redis_store::RedisStore},
};

pub type StoreResult<T> = Result<T, StoreError>;

/// Every variant means "the shared store cannot be relied on for this call".
/// Callers degrade on it; none of them turn it into a request failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("shared store is not configured")]
    Disabled,
    #[error("shared store operation timed out")]
    Timeout,
    #[error("shared store unavailable: {0}")]
    Unavailable(String),
    #[error("stored value is not usable: {0}")]
    InvalidValue(String),
}

impl StoreError {
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Minimal key-value contract the limiter and the cache are built on.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Atomically increments `key`, creating it at 0 first when absent.
    async fn increment(&self, key: &str) -> StoreResult<i64>;

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>>;

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> StoreResult<()>;

    async fn ping(&self) -> StoreResult<Duration>;
}

pub struct DisabledStore;

#[async_trait]
impl KeyValueStore for DisabledStore {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn increment(&self, _key: &str) -> StoreResult<i64> {
        Err(StoreError::Disabled)
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> StoreResult<()> {
        Err(StoreError::Disabled)
    }

    async fn get(&self, _key: &str) -> StoreResult<Option<Bytes>> {
        Err(StoreError::Disabled)
    }

    async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> StoreResult<()> {
        Err(StoreError::Disabled)
    }

    async fn ping(&self) -> StoreResult<Duration> {
        Err(StoreError::Disabled)
    }
}

/// Builds the process-wide store handle. A Redis backend that cannot be
/// reached at startup degrades to [`DisabledStore`] instead of aborting.
pub async fn connect(config: &StoreConfig) -> Arc<dyn KeyValueStore> {
    match &config.backend {
        StoreBackendConfig::Disabled => {
            tracing::warn!("no shared store configured; caching and rate limiting are disabled");
            Arc::new(DisabledStore)
        }
        StoreBackendConfig::Memory => {
            tracing::info!("using in-process store; state is not shared across instances");
            Arc::new(MemoryStore::new())
        }
        StoreBackendConfig::Redis { url } => {
            match RedisStore::connect(url, config.connect_timeout, config.op_timeout).await {
                Ok(store) => {
                    tracing::info!("connected to redis store");
                    Arc::new(store)
                }
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        "failed to connect to redis; caching and rate limiting are disabled"
                    );
                    Arc::new(DisabledStore)
                }
            }
        }
    }
}
