//! Delta/propagation planning.
//!
//! Given observed quantities and persisted baselines, decide the quantity every
//! node of a group must hold. Planning is pure: the caller performs the reads
//! before and applies writes and baseline updates after.
//!
//! Two driving cases:
//! - **child-driven**: the master moves by `(observed - baseline) * divisor`,
//!   siblings are re-derived from the new master value.
//! - **master-driven**: the master's observed value is authoritative, every child
//!   is re-derived from it.

use serde::{Deserialize, Serialize};

use stocklink_core::{NodeId, Quantity};
use stocklink_events::PassTrigger;

use crate::ChildLink;

/// A linked child together with its current platform quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedState {
    pub link: ChildLink,
    pub current: Quantity,
}

impl LinkedState {
    pub fn new(link: ChildLink, current: Quantity) -> Self {
        Self { link, current }
    }
}

/// Inputs for a pass driven by a child's own quantity change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildDrivenInput {
    pub child: ChildLink,
    pub observed: Quantity,
    /// `None` on the first event ever seen for this child.
    pub child_baseline: Option<Quantity>,
    pub master_id: NodeId,
    /// `None` until the master has been propagated once.
    pub master_baseline: Option<Quantity>,
    pub master_current: Quantity,
    /// The master's other children (the triggering child is skipped if present).
    pub siblings: Vec<LinkedState>,
}

/// Inputs for a pass driven by the master (event or manual trigger).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterDrivenInput {
    pub master_id: NodeId,
    pub observed: Quantity,
    pub master_current: Quantity,
    pub children: Vec<LinkedState>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Master,
    /// The child whose event drove the pass; never written, baseline only.
    Trigger,
    Child,
    Unassigned,
}

/// Quantity a node must end up holding after the pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTarget {
    pub node_id: NodeId,
    pub kind: TargetKind,
    pub before: Quantity,
    pub expected: Quantity,
}

impl PlannedTarget {
    pub fn needs_write(&self) -> bool {
        self.kind != TargetKind::Trigger && self.before != self.expected
    }
}

/// Outcome of planning one pass.
///
/// `targets` lists every node whose baseline must become `expected` once its
/// write (if any) succeeds. Order: master first, then children by node id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationPlan {
    pub trigger: PassTrigger,
    /// Change applied to the master relative to its baseline (0 for master-driven).
    pub master_delta: Quantity,
    pub targets: Vec<PlannedTarget>,
}

impl ReconciliationPlan {
    pub fn writes(&self) -> impl Iterator<Item = &PlannedTarget> {
        self.targets.iter().filter(|t| t.needs_write())
    }

    pub fn write_count(&self) -> usize {
        self.writes().count()
    }

    pub fn target(&self, node_id: &NodeId) -> Option<&PlannedTarget> {
        self.targets.iter().find(|t| &t.node_id == node_id)
    }

    pub fn master_target(&self) -> Option<&PlannedTarget> {
        self.targets.iter().find(|t| t.kind == TargetKind::Master)
    }
}

/// Plan a child-driven pass.
pub fn plan_child_driven(input: ChildDrivenInput) -> ReconciliationPlan {
    let ChildDrivenInput {
        child,
        observed,
        child_baseline,
        master_id,
        master_baseline,
        master_current,
        siblings,
    } = input;

    // First sighting of a child establishes its baseline; nothing moved yet.
    let child_delta = observed - child_baseline.unwrap_or(observed);
    let master_delta = child.divisor.scale_delta(child_delta);
    let new_master = master_baseline
        .unwrap_or(master_current)
        .saturating_add(master_delta);

    let mut targets = Vec::with_capacity(siblings.len() + 2);
    targets.push(PlannedTarget {
        node_id: master_id,
        kind: TargetKind::Master,
        before: master_current,
        expected: new_master,
    });
    targets.push(PlannedTarget {
        node_id: child.node_id.clone(),
        kind: TargetKind::Trigger,
        before: observed,
        expected: observed,
    });
    targets.extend(
        siblings
            .into_iter()
            .filter(|s| s.link.node_id != child.node_id)
            .map(|s| PlannedTarget {
                expected: s.link.divisor.child_quantity(new_master),
                node_id: s.link.node_id,
                kind: TargetKind::Child,
                before: s.current,
            }),
    );
    sort_children(&mut targets);

    ReconciliationPlan {
        trigger: PassTrigger::Child {
            node_id: child.node_id,
        },
        master_delta,
        targets,
    }
}

/// Plan a master-driven pass. The observed master value is taken as-is.
pub fn plan_master_driven(input: MasterDrivenInput, trigger: PassTrigger) -> ReconciliationPlan {
    let MasterDrivenInput {
        master_id,
        observed,
        master_current,
        children,
    } = input;

    let mut targets = Vec::with_capacity(children.len() + 1);
    targets.push(PlannedTarget {
        node_id: master_id,
        kind: TargetKind::Master,
        before: master_current,
        expected: observed,
    });
    targets.extend(children.into_iter().map(|c| PlannedTarget {
        expected: c.link.divisor.child_quantity(observed),
        node_id: c.link.node_id,
        kind: TargetKind::Child,
        before: c.current,
    }));
    sort_children(&mut targets);

    ReconciliationPlan {
        trigger,
        master_delta: 0,
        targets,
    }
}

/// Plan a pass for a node with no relationship: baseline follows the observation 1:1.
pub fn plan_unassigned(node_id: NodeId, observed: Quantity) -> ReconciliationPlan {
    ReconciliationPlan {
        trigger: PassTrigger::Unassigned,
        master_delta: 0,
        targets: vec![PlannedTarget {
            node_id,
            kind: TargetKind::Unassigned,
            before: observed,
            expected: observed,
        }],
    }
}

fn sort_children(targets: &mut [PlannedTarget]) {
    // Master stays at index 0.
    if let Some((_, rest)) = targets.split_first_mut() {
        rest.sort_by(|a, b| a.node_id.cmp(&b.node_id));
    }
}
