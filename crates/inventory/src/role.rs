use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use stocklink_core::{DomainError, DomainResult, Divisor, NodeId};

/// Relationship payload as the platform stores it (loosely typed metafields).
///
/// Only ever consumed by [`Role::from_raw`]; nothing downstream re-parses it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRelationship {
    /// "My master is X" back-reference written on children.
    #[serde(default)]
    pub master_ref: Option<String>,
    /// Child list written on masters.
    #[serde(default)]
    pub children: Option<Vec<RawChildRef>>,
    /// Divisor written on children (absent, zero or negative means 1).
    #[serde(default)]
    pub divisor: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawChildRef {
    pub node_id: String,
    #[serde(default)]
    pub divisor: Option<i64>,
}

/// A child as seen from its master.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChildLink {
    pub node_id: NodeId,
    pub divisor: Divisor,
}

impl ChildLink {
    pub fn new(node_id: NodeId, divisor: Divisor) -> Self {
        Self { node_id, divisor }
    }
}

/// Validated role of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Role {
    Unassigned,
    Master { children: Vec<ChildLink> },
    Child { master: NodeId, divisor: Divisor },
}

impl Role {
    /// Validate a raw relationship payload for `node_id`.
    ///
    /// Children are sorted by id and de-duplicated (first occurrence wins).
    pub fn from_raw(node_id: &NodeId, raw: &RawRelationship) -> DomainResult<Role> {
        let master_ref = raw
            .master_ref
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let children = raw.children.as_deref().unwrap_or_default();

        match (master_ref, children.is_empty()) {
            (Some(_), false) => Err(DomainError::invariant(format!(
                "node {node_id} is both master and child"
            ))),
            (Some(master), true) => {
                let master = NodeId::parse(master)?;
                if &master == node_id {
                    return Err(DomainError::invariant(format!(
                        "node {node_id} references itself as master"
                    )));
                }
                Ok(Role::Child {
                    master,
                    divisor: Divisor::from_raw(raw.divisor),
                })
            }
            (None, false) => {
                let mut seen = HashSet::new();
                let mut links = Vec::with_capacity(children.len());
                for child in children {
                    let child_id = NodeId::parse(child.node_id.as_str())?;
                    if &child_id == node_id {
                        return Err(DomainError::invariant(format!(
                            "node {node_id} lists itself as a child"
                        )));
                    }
                    if seen.insert(child_id.clone()) {
                        links.push(ChildLink::new(child_id, Divisor::from_raw(child.divisor)));
                    }
                }
                links.sort_by(|a, b| a.node_id.cmp(&b.node_id));
                Ok(Role::Master { children: links })
            }
            (None, true) => Ok(Role::Unassigned),
        }
    }

    /// Pair the role with its node; `None` for unassigned nodes.
    pub fn into_info(self, node_id: NodeId) -> Option<RoleInfo> {
        match self {
            Role::Unassigned => None,
            Role::Master { children } => Some(RoleInfo::Master { node_id, children }),
            Role::Child { master, divisor } => Some(RoleInfo::Child {
                node_id,
                master_id: master,
                divisor,
            }),
        }
    }
}

/// Answer to "what role does this node play, and who is it linked to".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum RoleInfo {
    Master {
        node_id: NodeId,
        children: Vec<ChildLink>,
    },
    Child {
        node_id: NodeId,
        master_id: NodeId,
        divisor: Divisor,
    },
}

impl RoleInfo {
    pub fn node_id(&self) -> &NodeId {
        match self {
            RoleInfo::Master { node_id, .. } | RoleInfo::Child { node_id, .. } => node_id,
        }
    }

    /// Master of the reconciliation group this node belongs to.
    pub fn master_id(&self) -> &NodeId {
        match self {
            RoleInfo::Master { node_id, .. } => node_id,
            RoleInfo::Child { master_id, .. } => master_id,
        }
    }

    pub fn is_master(&self) -> bool {
        matches!(self, RoleInfo::Master { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_child(id: &str, divisor: Option<i64>) -> RawChildRef {
        RawChildRef {
            node_id: id.to_string(),
            divisor,
        }
    }

    #[test]
    fn back_reference_makes_a_child_with_default_divisor() {
        let raw = RawRelationship {
            master_ref: Some("m1".into()),
            ..Default::default()
        };
        let role = Role::from_raw(&"c1".into(), &raw).unwrap();
        assert_eq!(
            role,
            Role::Child {
                master: "m1".into(),
                divisor: Divisor::ONE
            }
        );
    }

    #[test]
    fn zero_divisor_on_child_is_treated_as_one() {
        let raw = RawRelationship {
            master_ref: Some("m1".into()),
            divisor: Some(0),
            ..Default::default()
        };
        let Role::Child { divisor, .. } = Role::from_raw(&"c1".into(), &raw).unwrap() else {
            panic!("expected child");
        };
        assert_eq!(divisor, Divisor::ONE);
    }

    #[test]
    fn master_children_are_sorted_and_deduplicated() {
        let raw = RawRelationship {
            children: Some(vec![
                raw_child("c2", Some(2)),
                raw_child("c1", None),
                raw_child("c2", Some(5)),
            ]),
            ..Default::default()
        };
        let role = Role::from_raw(&"m1".into(), &raw).unwrap();
        assert_eq!(
            role,
            Role::Master {
                children: vec![
                    ChildLink::new("c1".into(), Divisor::ONE),
                    ChildLink::new("c2".into(), Divisor::new(2)),
                ]
            }
        );
    }

    #[test]
    fn both_roles_violate_invariant() {
        let raw = RawRelationship {
            master_ref: Some("m1".into()),
            children: Some(vec![raw_child("c1", None)]),
            divisor: None,
        };
        let err = Role::from_raw(&"x".into(), &raw).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn self_reference_is_rejected() {
        let raw = RawRelationship {
            master_ref: Some("x".into()),
            ..Default::default()
        };
        assert!(Role::from_raw(&"x".into(), &raw).is_err());
    }

    #[test]
    fn empty_payload_is_unassigned() {
        let raw = RawRelationship {
            master_ref: Some("  ".into()),
            children: Some(vec![]),
            divisor: Some(3),
        };
        let role = Role::from_raw(&"x".into(), &raw).unwrap();
        assert_eq!(role, Role::Unassigned);
        assert_eq!(role.into_info("x".into()), None);
    }

    #[test]
    fn child_info_points_at_its_master_group() {
        let info = Role::Child {
            master: "m1".into(),
            divisor: Divisor::new(3),
        }
        .into_info("c1".into())
        .unwrap();
        assert_eq!(info.master_id().as_str(), "m1");
        assert_eq!(info.node_id().as_str(), "c1");
        assert!(!info.is_master());
    }
}
