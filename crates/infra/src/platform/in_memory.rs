use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::broadcast;

use stocklink_core::{LocationId, NodeId, Quantity, TenantId};
use stocklink_inventory::{RawChildRef, RawRelationship};

use super::{CommercePlatform, QuantityWrite, WriteReason};
use crate::error::PlatformError;

/// A write observed by the in-memory platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub tenant_id: TenantId,
    pub write: QuantityWrite,
    pub reason: WriteReason,
}

/// In-memory commerce platform for tests/dev.
///
/// Holds quantities and relationship payloads, records every write, can be told
/// to fail reads/writes for specific nodes, and broadcasts successful writes so
/// callers can replay them as echo notifications.
#[derive(Debug)]
pub struct InMemoryPlatform {
    levels: RwLock<HashMap<(TenantId, NodeId, LocationId), Quantity>>,
    relationships: RwLock<HashMap<(TenantId, NodeId), RawRelationship>>,
    writes: Mutex<Vec<RecordedWrite>>,
    failing_writes: RwLock<HashSet<NodeId>>,
    failing_reads: RwLock<HashSet<NodeId>>,
    scans: AtomicUsize,
    written_tx: broadcast::Sender<RecordedWrite>,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        let (written_tx, _rx) = broadcast::channel(256);
        Self {
            levels: RwLock::new(HashMap::new()),
            relationships: RwLock::new(HashMap::new()),
            writes: Mutex::new(Vec::new()),
            failing_writes: RwLock::new(HashSet::new()),
            failing_reads: RwLock::new(HashSet::new()),
            scans: AtomicUsize::new(0),
            written_tx,
        }
    }

    pub fn set_level(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        location_id: &LocationId,
        quantity: Quantity,
    ) {
        self.levels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((tenant_id, node_id.clone(), location_id.clone()), quantity);
    }

    pub fn level(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        location_id: &LocationId,
    ) -> Option<Quantity> {
        self.levels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(tenant_id, node_id.clone(), location_id.clone()))
            .copied()
    }

    pub fn set_relationship(&self, tenant_id: TenantId, node_id: &NodeId, raw: RawRelationship) {
        self.relationships
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((tenant_id, node_id.clone()), raw);
    }

    /// Link `children` (id, raw divisor) to `master`, writing both the master's
    /// child list and each child's back-reference.
    pub fn link(&self, tenant_id: TenantId, master: &NodeId, children: &[(&str, Option<i64>)]) {
        self.link_inner(tenant_id, master, children, true);
    }

    /// Like [`link`](Self::link) but without back-references, so children can
    /// only be resolved by scanning masters. Divisors are written on the master only.
    pub fn link_without_back_refs(
        &self,
        tenant_id: TenantId,
        master: &NodeId,
        children: &[(&str, Option<i64>)],
    ) {
        self.link_inner(tenant_id, master, children, false);
    }

    fn link_inner(
        &self,
        tenant_id: TenantId,
        master: &NodeId,
        children: &[(&str, Option<i64>)],
        back_refs: bool,
    ) {
        let refs = children
            .iter()
            .map(|(id, divisor)| RawChildRef {
                node_id: id.to_string(),
                divisor: *divisor,
            })
            .collect();
        self.set_relationship(
            tenant_id,
            master,
            RawRelationship {
                children: Some(refs),
                ..Default::default()
            },
        );
        for (id, divisor) in children {
            // Without a back-reference the child payload carries nothing; the
            // divisor lives only in the master's list.
            let raw = if back_refs {
                RawRelationship {
                    master_ref: Some(master.to_string()),
                    divisor: *divisor,
                    ..Default::default()
                }
            } else {
                RawRelationship::default()
            };
            self.set_relationship(tenant_id, &NodeId::from(*id), raw);
        }
    }

    pub fn fail_writes_for(&self, node_id: &NodeId) {
        self.failing_writes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node_id.clone());
    }

    pub fn fail_reads_for(&self, node_id: &NodeId) {
        self.failing_reads
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node_id.clone());
    }

    pub fn heal(&self) {
        self.failing_writes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.failing_reads
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn writes_for(&self, node_id: &NodeId) -> Vec<RecordedWrite> {
        self.writes()
            .into_iter()
            .filter(|w| &w.write.node_id == node_id)
            .collect()
    }

    pub fn clear_writes(&self) {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of catalog scans performed by `find_master_of`.
    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::Relaxed)
    }

    /// Stream of successful writes (lossy broadcast).
    pub fn subscribe_writes(&self) -> broadcast::Receiver<RecordedWrite> {
        self.written_tx.subscribe()
    }

    fn read_fails(&self, node_id: &NodeId) -> bool {
        self.failing_reads
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(node_id)
    }

    fn is_known(&self, tenant_id: TenantId, node_id: &NodeId) -> bool {
        let has_relationship = self
            .relationships
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&(tenant_id, node_id.clone()));
        has_relationship
            || self
                .levels
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .keys()
                .any(|(t, n, _)| *t == tenant_id && n == node_id)
    }
}

impl Default for InMemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommercePlatform for InMemoryPlatform {
    async fn current_quantity(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        location_id: &LocationId,
    ) -> Result<Quantity, PlatformError> {
        if self.read_fails(node_id) {
            return Err(PlatformError::Request(format!("read of {node_id} failed")));
        }
        self.level(tenant_id, node_id, location_id)
            .ok_or_else(|| PlatformError::UnknownNode(node_id.clone()))
    }

    async fn relationship(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
    ) -> Result<Option<RawRelationship>, PlatformError> {
        if self.read_fails(node_id) {
            return Err(PlatformError::Request(format!("read of {node_id} failed")));
        }
        let stored = self
            .relationships
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(tenant_id, node_id.clone()))
            .cloned();
        match stored {
            Some(raw) => Ok(Some(raw)),
            None if self.is_known(tenant_id, node_id) => Ok(Some(RawRelationship::default())),
            None => Ok(None),
        }
    }

    async fn find_master_of(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
    ) -> Result<Option<NodeId>, PlatformError> {
        self.scans.fetch_add(1, Ordering::Relaxed);
        let relationships = self
            .relationships
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut masters: Vec<&NodeId> = relationships
            .iter()
            .filter(|((t, _), raw)| {
                *t == tenant_id
                    && raw
                        .children
                        .as_deref()
                        .unwrap_or_default()
                        .iter()
                        .any(|c| c.node_id == node_id.as_str())
            })
            .map(|((_, master), _)| master)
            .collect();
        masters.sort();
        Ok(masters.first().map(|m| (*m).clone()))
    }

    async fn set_quantity(
        &self,
        tenant_id: TenantId,
        write: &QuantityWrite,
        reason: WriteReason,
    ) -> Result<(), PlatformError> {
        let fails = self
            .failing_writes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&write.node_id);
        if fails {
            return Err(PlatformError::Rejected(format!(
                "write to {} rejected",
                write.node_id
            )));
        }

        self.set_level(tenant_id, &write.node_id, &write.location_id, write.quantity);
        let recorded = RecordedWrite {
            tenant_id,
            write: write.clone(),
            reason,
        };
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(recorded.clone());
        let _ = self.written_tx.send(recorded);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn link_writes_both_directions() {
        let platform = InMemoryPlatform::new();
        let tenant = TenantId::new();
        platform.link(tenant, &"m".into(), &[("c1", None), ("c2", Some(2))]);

        let child = platform.relationship(tenant, &"c2".into()).await.unwrap().unwrap();
        assert_eq!(child.master_ref.as_deref(), Some("m"));
        assert_eq!(child.divisor, Some(2));
        assert_eq!(platform.divisor(tenant, &"c2".into()).await.unwrap().get(), 2);

        let master = platform.relationship(tenant, &"m".into()).await.unwrap().unwrap();
        assert_eq!(master.children.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn scan_finds_master_without_back_reference() {
        let platform = InMemoryPlatform::new();
        let tenant = TenantId::new();
        platform.link_without_back_refs(tenant, &"m".into(), &[("c1", None)]);

        let found = platform.find_master_of(tenant, &"c1".into()).await.unwrap();
        assert_eq!(found, Some(NodeId::from("m")));
        assert_eq!(platform.scans(), 1);
    }

    #[tokio::test]
    async fn unknown_nodes_have_no_relationship() {
        let platform = InMemoryPlatform::new();
        let tenant = TenantId::new();
        assert_eq!(platform.relationship(tenant, &"ghost".into()).await.unwrap(), None);

        platform.set_level(tenant, &"plain".into(), &"l".into(), 4);
        assert_eq!(
            platform.relationship(tenant, &"plain".into()).await.unwrap(),
            Some(RawRelationship::default())
        );
    }

    #[tokio::test]
    async fn batched_writes_report_per_item_results() {
        let platform = InMemoryPlatform::new();
        let tenant = TenantId::new();
        platform.fail_writes_for(&"bad".into());

        let writes = vec![
            QuantityWrite::new("ok".into(), "l".into(), 3),
            QuantityWrite::new("bad".into(), "l".into(), 4),
        ];
        let results = platform
            .set_quantities(tenant, &writes, WriteReason::Correction)
            .await;

        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(PlatformError::Rejected(_))));
        assert_eq!(platform.level(tenant, &"ok".into(), &"l".into()), Some(3));
        assert_eq!(platform.writes().len(), 1);
    }
}
