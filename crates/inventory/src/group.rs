use serde::{Deserialize, Serialize};

use stocklink_core::{LocationId, NodeId, TenantId};

use crate::RoleInfo;

/// Reconciliation group: one master at one location, within one tenant.
///
/// Batching, locking and reporting are all keyed by this value. An unassigned
/// node forms a group on its own (it is its own "master").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey {
    pub tenant_id: TenantId,
    pub master_id: NodeId,
    pub location_id: LocationId,
}

impl GroupKey {
    pub fn new(tenant_id: TenantId, master_id: NodeId, location_id: LocationId) -> Self {
        Self {
            tenant_id,
            master_id,
            location_id,
        }
    }

    /// Group a node's event belongs to, given its resolved role.
    pub fn for_node(
        tenant_id: TenantId,
        node_id: &NodeId,
        role: Option<&RoleInfo>,
        location_id: &LocationId,
    ) -> Self {
        let master_id = role.map(|r| r.master_id()).unwrap_or(node_id).clone();
        Self::new(tenant_id, master_id, location_id.clone())
    }
}

impl core::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}@{}", self.tenant_id, self.master_id, self.location_id)
    }
}
