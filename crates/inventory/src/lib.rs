//! Inventory linkage domain module.
//!
//! This crate contains the business rules for keeping a master record and its
//! divisor-linked children consistent, implemented purely as deterministic
//! domain logic (no IO, no async, no storage). The infra layer feeds it
//! observed quantities and baselines and applies the resulting plan.

pub mod group;
pub mod reconcile;
pub mod role;

pub use group::GroupKey;
pub use reconcile::{
    ChildDrivenInput, LinkedState, MasterDrivenInput, PlannedTarget, ReconciliationPlan,
    TargetKind, plan_child_driven, plan_master_driven, plan_unassigned,
};
pub use role::{ChildLink, RawChildRef, RawRelationship, Role, RoleInfo};
