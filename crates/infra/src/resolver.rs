//! Relationship resolution with a short-lived cache.
//!
//! Answers "what role does this node play" from the platform's relationship
//! payload, falling back to a master scan when a child carries no
//! back-reference. Results (including "unassigned") are cached per
//! (tenant, node) for the configured TTL.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use stocklink_core::{Divisor, NodeId, TenantId};
use stocklink_inventory::{Role, RoleInfo};

use crate::error::{SyncError, SyncResult};
use crate::platform::CommercePlatform;

#[derive(Debug, Clone)]
struct CachedRole {
    role: Option<RoleInfo>,
    expires_at: Instant,
}

pub struct RelationshipResolver {
    platform: Arc<dyn CommercePlatform>,
    ttl: Duration,
    cache: Mutex<HashMap<(TenantId, NodeId), CachedRole>>,
}

impl RelationshipResolver {
    pub fn new(platform: Arc<dyn CommercePlatform>, ttl: Duration) -> Self {
        Self {
            platform,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Role of `node_id`, or `None` when it is unassigned.
    ///
    /// Only platform read failures are errors; unknown nodes and invalid
    /// payloads degrade to unassigned.
    pub async fn resolve(&self, tenant_id: TenantId, node_id: &NodeId) -> SyncResult<Option<RoleInfo>> {
        if let Some(hit) = self.cached(tenant_id, node_id) {
            return Ok(hit);
        }

        let role = self.fetch(tenant_id, node_id).await?;
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                (tenant_id, node_id.clone()),
                CachedRole {
                    role: role.clone(),
                    expires_at: Instant::now() + self.ttl,
                },
            );
        Ok(role)
    }

    /// Forget one node (e.g. after its relationship was edited).
    pub fn invalidate(&self, tenant_id: TenantId, node_id: &NodeId) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(tenant_id, node_id.clone()));
    }

    fn cached(&self, tenant_id: TenantId, node_id: &NodeId) -> Option<Option<RoleInfo>> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (tenant_id, node_id.clone());
        match cache.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.role.clone()),
            Some(_) => {
                cache.remove(&key);
                None
            }
            None => None,
        }
    }

    async fn fetch(&self, tenant_id: TenantId, node_id: &NodeId) -> SyncResult<Option<RoleInfo>> {
        let raw = self
            .platform
            .relationship(tenant_id, node_id)
            .await
            .map_err(|e| SyncError::platform_read(node_id, e))?;

        let Some(raw) = raw else {
            let err = SyncError::RelationshipNotFound(node_id.clone());
            warn!(tenant = %tenant_id, node = %node_id, error = %err, "treating node as unassigned");
            return Ok(None);
        };

        let role = match Role::from_raw(node_id, &raw) {
            Ok(role) => role,
            Err(e) => {
                warn!(tenant = %tenant_id, node = %node_id, error = %e, "invalid relationship payload; treating node as unassigned");
                Role::Unassigned
            }
        };

        if role != Role::Unassigned {
            return Ok(role.into_info(node_id.clone()));
        }

        // No back-reference: a master may still list this node as a child.
        let master = self
            .platform
            .find_master_of(tenant_id, node_id)
            .await
            .map_err(|e| SyncError::platform_read(node_id, e))?;
        match master {
            Some(master_id) if &master_id != node_id => {
                let divisor = self
                    .listed_divisor(tenant_id, &master_id, node_id)
                    .await?
                    .unwrap_or_else(|| Divisor::from_raw(raw.divisor));
                debug!(tenant = %tenant_id, node = %node_id, master = %master_id, divisor = divisor.get(), "resolved child by master scan");
                Ok(Some(RoleInfo::Child {
                    node_id: node_id.clone(),
                    master_id,
                    divisor,
                }))
            }
            _ => Ok(None),
        }
    }

    /// Divisor the master's child list records for `node_id`, if it records one.
    async fn listed_divisor(
        &self,
        tenant_id: TenantId,
        master_id: &NodeId,
        node_id: &NodeId,
    ) -> SyncResult<Option<Divisor>> {
        let master = self
            .platform
            .relationship(tenant_id, master_id)
            .await
            .map_err(|e| SyncError::platform_read(master_id, e))?;
        Ok(master
            .and_then(|raw| raw.children)
            .unwrap_or_default()
            .into_iter()
            .find(|child| child.node_id == node_id.as_str())
            .and_then(|child| child.divisor)
            .map(|d| Divisor::from_raw(Some(d))))
    }
}
