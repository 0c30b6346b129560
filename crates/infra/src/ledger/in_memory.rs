use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::KeyLedger;
use crate::error::LedgerError;

/// Process-local ledger for single-instance deployments, dev and tests.
///
/// Expired entries are evicted lazily on access, plus a full sweep every
/// `sweep_every` operations so memory stays bounded under key churn.
#[derive(Debug)]
pub struct InMemoryKeyLedger {
    entries: Mutex<HashMap<String, Instant>>,
    ops: AtomicU64,
    sweep_every: u64,
}

impl InMemoryKeyLedger {
    pub fn new() -> Self {
        Self::with_sweep_interval(256)
    }

    pub fn with_sweep_interval(sweep_every: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ops: AtomicU64::new(0),
            sweep_every: sweep_every.max(1),
        }
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        let evicted = before - entries.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = entries.len(), "swept expired ledger keys");
        }
    }

    fn tick(&self) {
        let count = self.ops.fetch_add(1, Ordering::Relaxed);
        if count > 0 && count % self.sweep_every == 0 {
            self.sweep();
        }
    }
}

impl Default for InMemoryKeyLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyLedger for InMemoryKeyLedger {
    async fn insert_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, LedgerError> {
        self.tick();
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(expires_at) if *expires_at > now => Ok(false),
            _ => {
                entries.insert(key.to_string(), now + ttl);
                Ok(true)
            }
        }
    }

    async fn contains(&self, key: &str) -> Result<bool, LedgerError> {
        self.tick();
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(expires_at) if *expires_at > now => Ok(true),
            Some(_) => {
                entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn insert(&self, key: &str, ttl: Duration) -> Result<(), LedgerError> {
        self.tick();
        let expires_at = Instant::now() + ttl;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), expires_at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(10);

    #[tokio::test(start_paused = true)]
    async fn insert_if_absent_admits_once_per_ttl() {
        let ledger = InMemoryKeyLedger::new();
        assert!(ledger.insert_if_absent("k", TTL).await.unwrap());
        assert!(!ledger.insert_if_absent("k", TTL).await.unwrap());

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(!ledger.insert_if_absent("k", TTL).await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(ledger.insert_if_absent("k", TTL).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn contains_evicts_expired_entries() {
        let ledger = InMemoryKeyLedger::new();
        ledger.insert("echo", Duration::from_secs(1)).await.unwrap();
        assert!(ledger.contains("echo").await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!ledger.contains("echo").await.unwrap());
        assert!(ledger.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_sweep_bounds_memory() {
        let ledger = InMemoryKeyLedger::with_sweep_interval(4);
        for i in 0..3 {
            ledger.insert(&format!("k{i}"), Duration::from_millis(10)).await.unwrap();
        }
        tokio::time::advance(Duration::from_millis(20)).await;

        // The fifth operation (count 4) triggers a sweep before inserting.
        ledger.insert("k3", TTL).await.unwrap();
        ledger.insert("k4", TTL).await.unwrap();
        assert_eq!(ledger.len(), 2);
    }
}
