use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stocklink_core::{LocationId, NodeId, Quantity, TenantId};

/// What started a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PassTrigger {
    /// A child's own quantity changed.
    Child { node_id: NodeId },
    /// The master's quantity changed and is taken as authoritative.
    Master,
    /// Administrative trigger (re-derive every child from the master).
    Manual,
    /// A node with no relationship, written through 1:1.
    Unassigned,
}

/// Before/after for one node touched by a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeChange {
    pub node_id: NodeId,
    pub before: Quantity,
    pub after: Quantity,
    /// `true` when an external write was issued and succeeded.
    pub written: bool,
}

/// Summary of one reconciliation pass, forwarded to the merchant (best effort).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub tenant_id: TenantId,
    pub master_id: NodeId,
    pub location_id: LocationId,
    pub trigger: PassTrigger,
    pub master: Option<NodeChange>,
    pub children: Vec<NodeChange>,
    /// Nodes whose write failed in this pass (baseline left untouched).
    pub failed: Vec<NodeId>,
    pub generated_at: DateTime<Utc>,
}

impl ReconciliationReport {
    pub fn writes(&self) -> usize {
        self.master.iter().chain(self.children.iter()).filter(|c| c.written).count()
    }

    pub fn is_partial_failure(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn event_type(&self) -> &'static str {
        "inventory.reconciliation.completed"
    }
}
