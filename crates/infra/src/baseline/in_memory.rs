use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use stocklink_core::{LocationId, NodeId, Quantity, TenantId};

use super::BaselineStore;
use crate::error::PersistenceError;

type Key = (TenantId, NodeId, LocationId);

/// In-memory baseline store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryBaselineStore {
    inner: RwLock<HashMap<Key, Quantity>>,
    unavailable: AtomicBool,
}

impl InMemoryBaselineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a storage error (or recover).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> Result<(), PersistenceError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(PersistenceError::Storage("baseline store unavailable".into()));
        }
        Ok(())
    }
}

fn poisoned<T>(_: T) -> PersistenceError {
    PersistenceError::Storage("baseline map lock poisoned".into())
}

fn key(tenant_id: TenantId, node_id: &NodeId, location_id: &LocationId) -> Key {
    (tenant_id, node_id.clone(), location_id.clone())
}

#[async_trait]
impl BaselineStore for InMemoryBaselineStore {
    async fn get(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        location_id: &LocationId,
    ) -> Result<Option<Quantity>, PersistenceError> {
        self.check()?;
        let map = self.inner.read().map_err(poisoned)?;
        Ok(map.get(&key(tenant_id, node_id, location_id)).copied())
    }

    async fn put(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        location_id: &LocationId,
        quantity: Quantity,
    ) -> Result<(), PersistenceError> {
        self.check()?;
        let mut map = self.inner.write().map_err(poisoned)?;
        map.insert(key(tenant_id, node_id, location_id), quantity);
        Ok(())
    }

    async fn compare_and_set(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        location_id: &LocationId,
        expected: Option<Quantity>,
        new: Quantity,
    ) -> Result<bool, PersistenceError> {
        self.check()?;
        let mut map = self.inner.write().map_err(poisoned)?;
        let k = key(tenant_id, node_id, location_id);
        if map.get(&k).copied() != expected {
            return Ok(false);
        }
        map.insert(k, new);
        Ok(true)
    }
}
