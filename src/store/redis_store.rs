use std::{
    future::Future,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bytes::Bytes;
use redis::{AsyncCommands, aio::ConnectionManager};

use crate::store::{KeyValueStore, StoreError, StoreResult};

/// Redis-backed store. `ConnectionManager` is cheap to clone and reconnects
/// on its own, so one handle is shared by every request.
pub struct RedisStore {
    manager: ConnectionManager,
    op_timeout: Duration,
}

impl RedisStore {
    pub async fn connect(
        url: &str,
        connect_timeout: Duration,
        op_timeout: Duration,
    ) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let manager = tokio::time::timeout(connect_timeout, client.get_connection_manager())
            .await
            .map_err(|_| StoreError::Timeout)??;

        Ok(Self {
            manager,
            op_timeout,
        })
    }

    async fn bounded<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout),
        }
    }
}

fn millis(ttl: Duration) -> i64 {
    (ttl.as_millis() as i64).max(1)
}

#[async_trait]
impl KeyValueStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn increment(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.manager.clone();
        self.bounded(async move { conn.incr(key, 1).await }).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.manager.clone();
        let ms = millis(ttl);
        self.bounded(async move {
            let _: () = conn.pexpire(key, ms).await?;
            Ok(())
        })
        .await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        let mut conn = self.manager.clone();
        let raw: Option<Vec<u8>> = self.bounded(async move { conn.get(key).await }).await?;
        Ok(raw.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.manager.clone();
        let ms = millis(ttl) as u64;
        self.bounded(async move {
            let _: () = conn.pset_ex(key, value.as_ref(), ms).await?;
            Ok(())
        })
        .await
    }

    async fn ping(&self) -> StoreResult<Duration> {
        let mut conn = self.manager.clone();
        let started = Instant::now();
        let reply: String = self
            .bounded(async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;

        if reply.eq_ignore_ascii_case("PONG") {
            Ok(started.elapsed())
        } else {
            Err(StoreError::InvalidValue(format!("unexpected PING reply: {reply}")))
        }
    }
}
