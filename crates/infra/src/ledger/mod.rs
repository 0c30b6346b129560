//! TTL key ledgers backing the dedup, echo and debounce sets.
//!
//! Ledgers are performance-only: losing an entry early costs an extra
//! reconciliation pass, never correctness, because passes are idempotent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::LedgerError;

pub mod in_memory;
pub mod postgres;
#[cfg(feature = "redis")]
pub mod redis;

pub use in_memory::InMemoryKeyLedger;
pub use postgres::PostgresKeyLedger;
#[cfg(feature = "redis")]
pub use self::redis::RedisKeyLedger;

/// Concurrency-safe set of keys that expire after a per-entry TTL.
#[async_trait]
pub trait KeyLedger: Send + Sync {
    /// Insert `key` unless a live entry exists. Returns `true` when this call inserted it.
    async fn insert_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, LedgerError>;

    /// Whether a live (unexpired) entry exists.
    async fn contains(&self, key: &str) -> Result<bool, LedgerError>;

    /// Insert or refresh `key`.
    async fn insert(&self, key: &str, ttl: Duration) -> Result<(), LedgerError>;
}

#[async_trait]
impl<L> KeyLedger for Arc<L>
where
    L: KeyLedger + ?Sized,
{
    async fn insert_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, LedgerError> {
        (**self).insert_if_absent(key, ttl).await
    }

    async fn contains(&self, key: &str) -> Result<bool, LedgerError> {
        (**self).contains(key).await
    }

    async fn insert(&self, key: &str, ttl: Duration) -> Result<(), LedgerError> {
        (**self).insert(key, ttl).await
    }
}
