//! Redis-backed key ledger (optional).
//!
//! Shares dedup/echo/debounce state across instances with `SET NX PX`, so two
//! instances never both admit the same delivery inside the TTL.

use std::time::Duration;

use async_trait::async_trait;

use super::KeyLedger;
use crate::error::LedgerError;

#[derive(Debug, Clone)]
pub struct RedisKeyLedger {
    client: redis::Client,
    prefix: String,
}

impl RedisKeyLedger {
    pub fn new(redis_url: impl AsRef<str>, prefix: impl Into<String>) -> Result<Self, LedgerError> {
        let client = redis::Client::open(redis_url.as_ref()).map_err(backend)?;
        Ok(Self {
            client,
            prefix: prefix.into(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, LedgerError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend)
    }
}

fn backend(e: redis::RedisError) -> LedgerError {
    LedgerError::Backend(e.to_string())
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl KeyLedger for RedisKeyLedger {
    async fn insert_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, LedgerError> {
        let mut conn = self.connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(key))
            .arg(1)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(reply.is_some())
    }

    async fn contains(&self, key: &str) -> Result<bool, LedgerError> {
        let mut conn = self.connection().await?;
        let exists: i64 = redis::cmd("EXISTS")
            .arg(self.key(key))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(exists > 0)
    }

    async fn insert(&self, key: &str, ttl: Duration) -> Result<(), LedgerError> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("SET")
            .arg(self.key(key))
            .arg(1)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }
}
