//! Port to the external commerce platform (source of truth for quantities and relationships).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use stocklink_core::{Divisor, LocationId, NodeId, Quantity, TenantId};
use stocklink_inventory::RawRelationship;

use crate::error::PlatformError;

pub mod in_memory;

pub use in_memory::InMemoryPlatform;

/// Absolute quantity set for one (node, location).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuantityWrite {
    pub node_id: NodeId,
    pub location_id: LocationId,
    pub quantity: Quantity,
}

impl QuantityWrite {
    pub fn new(node_id: NodeId, location_id: LocationId, quantity: Quantity) -> Self {
        Self {
            node_id,
            location_id,
            quantity,
        }
    }
}

/// Reason tag attached to every write, visible in the platform's audit trail.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteReason {
    /// System-internal corrective write (propagation between linked records).
    Correction,
    /// Write requested from outside the engine (e.g. an administrator).
    External,
}

impl WriteReason {
    pub fn as_str(self) -> &'static str {
        match self {
            WriteReason::Correction => "correction",
            WriteReason::External => "external",
        }
    }
}

/// Reads and writes against the commerce platform.
///
/// All calls are IO; implementations apply their own timeout and report it as
/// [`PlatformError::Timeout`]. Nothing here retries.
#[async_trait]
pub trait CommercePlatform: Send + Sync {
    async fn current_quantity(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        location_id: &LocationId,
    ) -> Result<Quantity, PlatformError>;

    /// Relationship payload stored on the node; `None` when the node is unknown.
    async fn relationship(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
    ) -> Result<Option<RawRelationship>, PlatformError>;

    /// Catalog scan for a master listing `node_id` as a child.
    ///
    /// Expensive; only used when a node carries no back-reference.
    async fn find_master_of(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
    ) -> Result<Option<NodeId>, PlatformError>;

    /// Absolute, idempotent quantity set.
    async fn set_quantity(
        &self,
        tenant_id: TenantId,
        write: &QuantityWrite,
        reason: WriteReason,
    ) -> Result<(), PlatformError>;

    /// Batched absolute set; one result per input, in input order.
    async fn set_quantities(
        &self,
        tenant_id: TenantId,
        writes: &[QuantityWrite],
        reason: WriteReason,
    ) -> Vec<Result<(), PlatformError>> {
        let mut results = Vec::with_capacity(writes.len());
        for write in writes {
            results.push(self.set_quantity(tenant_id, write, reason).await);
        }
        results
    }

    async fn divisor(&self, tenant_id: TenantId, node_id: &NodeId) -> Result<Divisor, PlatformError> {
        let raw = self.relationship(tenant_id, node_id).await?;
        Ok(Divisor::from_raw(raw.and_then(|r| r.divisor)))
    }
}
