//! Delivery filter: reject redundant or self-caused work before it reaches the engine.
//!
//! Three independent TTL sets:
//! - **dedup**: byte-identical redeliveries (same node, location, quantity, observed time)
//! - **echo**: notifications caused by our own writes
//! - **debounce**: bursts for the same (node, location); never drops distinct payloads
//!
//! Backend failures fail open (admit / not an echo / acquired): extra work is
//! harmless because reconciliation is idempotent.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use stocklink_core::{LocationId, NodeId, Quantity, TenantId};
use stocklink_events::DeliveryKey;

use crate::config::SyncConfig;
use crate::ledger::{InMemoryKeyLedger, KeyLedger};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterTtls {
    pub dedup: Duration,
    pub echo: Duration,
    pub debounce: Duration,
}

impl From<&SyncConfig> for FilterTtls {
    fn from(cfg: &SyncConfig) -> Self {
        Self {
            dedup: cfg.dedup_ttl,
            echo: cfg.echo_ttl,
            debounce: cfg.debounce_ttl,
        }
    }
}

pub struct DeliveryFilter {
    dedup: Arc<dyn KeyLedger>,
    echoes: Arc<dyn KeyLedger>,
    debounce: Arc<dyn KeyLedger>,
    ttls: FilterTtls,
}

impl DeliveryFilter {
    pub fn new(
        dedup: Arc<dyn KeyLedger>,
        echoes: Arc<dyn KeyLedger>,
        debounce: Arc<dyn KeyLedger>,
        ttls: FilterTtls,
    ) -> Self {
        Self {
            dedup,
            echoes,
            debounce,
            ttls,
        }
    }

    /// Filter backed by three process-local ledgers.
    pub fn in_memory(ttls: FilterTtls) -> Self {
        Self::new(
            Arc::new(InMemoryKeyLedger::new()),
            Arc::new(InMemoryKeyLedger::new()),
            Arc::new(InMemoryKeyLedger::new()),
            ttls,
        )
    }

    /// `true` at most once per delivery key within the dedup TTL.
    pub async fn admit_exact_once(&self, tenant_id: TenantId, key: &DeliveryKey) -> bool {
        let ledger_key = format!("{tenant_id}:{key}");
        match self.dedup.insert_if_absent(&ledger_key, self.ttls.dedup).await {
            Ok(admitted) => {
                if !admitted {
                    debug!(tenant = %tenant_id, delivery_key = %key, "dropping exact duplicate");
                }
                admitted
            }
            Err(e) => {
                warn!(tenant = %tenant_id, error = %e, "dedup ledger unavailable; admitting");
                true
            }
        }
    }

    /// Record that we are about to write `quantity` to (node, location).
    ///
    /// Must be called before the platform call is issued: the notification can
    /// arrive before the call returns.
    pub async fn mark_predicted_echo(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        location_id: &LocationId,
        quantity: Quantity,
    ) {
        let key = echo_key(tenant_id, node_id, location_id, quantity);
        if let Err(e) = self.echoes.insert(&key, self.ttls.echo).await {
            warn!(tenant = %tenant_id, node = %node_id, error = %e, "failed to record predicted echo");
        }
    }

    /// Whether we issued a write for exactly this tuple within the echo TTL.
    pub async fn is_predicted_echo(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        location_id: &LocationId,
        quantity: Quantity,
    ) -> bool {
        let key = echo_key(tenant_id, node_id, location_id, quantity);
        match self.echoes.contains(&key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(tenant = %tenant_id, node = %node_id, error = %e, "echo ledger unavailable");
                false
            }
        }
    }

    /// `true` when no debounce flag exists for (node, location); sets the flag.
    pub async fn acquire_combo_debounce(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        location_id: &LocationId,
    ) -> bool {
        let key = format!("{tenant_id}:{node_id}:{location_id}");
        match self.debounce.insert_if_absent(&key, self.ttls.debounce).await {
            Ok(acquired) => acquired,
            Err(e) => {
                warn!(tenant = %tenant_id, node = %node_id, error = %e, "debounce ledger unavailable");
                true
            }
        }
    }
}

fn echo_key(
    tenant_id: TenantId,
    node_id: &NodeId,
    location_id: &LocationId,
    quantity: Quantity,
) -> String {
    format!("{tenant_id}:{node_id}:{location_id}:{quantity}")
}
