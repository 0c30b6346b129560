//! Aggregation window: collapse rapid notifications into one batch per group.
//!
//! The first event for a group arms a fixed timer (later events do not reset
//! it). Within a group the most recent event per child is kept, plus at most
//! one head entry (master event, unassigned event or manual trigger). On flush
//! the batch is handed to a [`FlushSink`].

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::debug;

use stocklink_core::{Divisor, LocationId, NodeId, TenantId};
use stocklink_events::ChangeEvent;
use stocklink_inventory::GroupKey;

use crate::lock::Coalesce;

/// One unit of work inside a group batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEntry {
    Child { event: ChangeEvent, divisor: Divisor },
    Master { event: ChangeEvent },
    Unassigned { event: ChangeEvent },
    /// Administrative "re-derive every child from the master" request.
    Manual { requested_at: DateTime<Utc> },
}

impl BatchEntry {
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            BatchEntry::Child { event, .. }
            | BatchEntry::Master { event }
            | BatchEntry::Unassigned { event } => Some(&event.node_id),
            BatchEntry::Manual { .. } => None,
        }
    }
}

/// Collapsed contents of one aggregation group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    children: BTreeMap<NodeId, (ChangeEvent, Divisor)>,
    head: Option<BatchEntry>,
}

/// Whether `newer` should replace `current`: later observation wins, ties go to
/// the later arrival.
fn supersedes(current: &ChangeEvent, newer: &ChangeEvent) -> bool {
    newer.observed_at >= current.observed_at
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(entry: BatchEntry) -> Self {
        let mut batch = Self::new();
        batch.push(entry);
        batch
    }

    pub fn push(&mut self, entry: BatchEntry) {
        match entry {
            BatchEntry::Child { event, divisor } => match self.children.get_mut(&event.node_id) {
                Some(slot) if !supersedes(&slot.0, &event) => {}
                Some(slot) => *slot = (event, divisor),
                None => {
                    self.children.insert(event.node_id.clone(), (event, divisor));
                }
            },
            head => self.push_head(head),
        }
    }

    fn push_head(&mut self, entry: BatchEntry) {
        let replace = match (&self.head, &entry) {
            (None, _) => true,
            // A manual pass reads the master's current value, so it subsumes any event.
            (Some(BatchEntry::Manual { .. }), _) => false,
            (_, BatchEntry::Manual { .. }) => true,
            (Some(BatchEntry::Master { event: cur }), BatchEntry::Master { event: new })
            | (Some(BatchEntry::Unassigned { event: cur }), BatchEntry::Unassigned { event: new }) => {
                supersedes(cur, new)
            }
            _ => true,
        };
        if replace {
            self.head = Some(entry);
        }
    }

    /// Replace the stored event for `event.node_id` if this batch holds it.
    pub fn fold(&mut self, event: ChangeEvent) -> bool {
        if let Some((current, _)) = self.children.get_mut(&event.node_id) {
            if supersedes(current, &event) {
                *current = event;
            }
            return true;
        }
        match &mut self.head {
            Some(BatchEntry::Master { event: current }) | Some(BatchEntry::Unassigned { event: current })
                if current.node_id == event.node_id =>
            {
                if supersedes(current, &event) {
                    *current = event;
                }
                true
            }
            _ => false,
        }
    }

    pub fn contains_node(&self, node_id: &NodeId) -> bool {
        self.children.contains_key(node_id)
            || self.head.as_ref().and_then(BatchEntry::node_id) == Some(node_id)
    }

    pub fn is_manual(&self) -> bool {
        matches!(self.head, Some(BatchEntry::Manual { .. }))
    }

    pub fn len(&self) -> usize {
        self.children.len() + usize::from(self.head.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Processing order: children by node id, then the head entry.
    pub fn into_entries(self) -> Vec<BatchEntry> {
        let mut entries: Vec<BatchEntry> = self
            .children
            .into_values()
            .map(|(event, divisor)| BatchEntry::Child { event, divisor })
            .collect();
        entries.extend(self.head);
        entries
    }
}

impl Coalesce for Batch {
    fn coalesce(&mut self, newer: Self) {
        for entry in newer.into_entries() {
            self.push(entry);
        }
    }
}

/// Receiver of flushed batches.
#[async_trait]
pub trait FlushSink: Send + Sync {
    async fn flush(&self, key: GroupKey, batch: Batch);
}

struct OpenGroup {
    generation: u64,
    batch: Batch,
    timer: Option<JoinHandle<()>>,
}

/// Registry of open groups; owned by the service, torn down with [`flush_all`](Self::flush_all).
pub struct AggregationWindow {
    period: Duration,
    sink: Arc<dyn FlushSink>,
    groups: Mutex<HashMap<GroupKey, OpenGroup>>,
    generations: AtomicU64,
}

impl AggregationWindow {
    pub fn new(period: Duration, sink: Arc<dyn FlushSink>) -> Arc<Self> {
        Arc::new(Self {
            period,
            sink,
            groups: Mutex::new(HashMap::new()),
            generations: AtomicU64::new(0),
        })
    }

    /// Add `entry` to the group for `key`, opening the group (and arming its
    /// timer) if this is the first entry.
    pub fn enqueue(self: &Arc<Self>, key: GroupKey, entry: BatchEntry) {
        let mut groups = self.groups.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(group) = groups.get_mut(&key) {
            group.batch.push(entry);
            return;
        }

        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        debug!(group = %key, window_ms = self.period.as_millis() as u64, "opening aggregation group");

        let window = Arc::clone(self);
        let timer_key = key.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(window.period).await;
            if let Some(batch) = window.take(&timer_key, Some(generation)) {
                window.sink.flush(timer_key, batch).await;
            }
        });

        groups.insert(
            key,
            OpenGroup {
                generation,
                batch: Batch::single(entry),
                timer: Some(timer),
            },
        );
    }

    /// Fold `event` into an open group of this tenant/location that already
    /// holds the node. Returns `false` when no open group holds it.
    pub fn try_fold(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        location_id: &LocationId,
        event: ChangeEvent,
    ) -> bool {
        let mut groups = self.groups.lock().unwrap_or_else(PoisonError::into_inner);
        groups
            .iter_mut()
            .find(|(key, group)| {
                key.tenant_id == tenant_id
                    && &key.location_id == location_id
                    && group.batch.contains_node(node_id)
            })
            .map(|(_, group)| group.batch.fold(event))
            .unwrap_or(false)
    }

    /// Flush one group now (its timer is cancelled).
    pub async fn flush(&self, key: &GroupKey) -> bool {
        match self.take(key, None) {
            Some(batch) => {
                self.sink.flush(key.clone(), batch).await;
                true
            }
            None => false,
        }
    }

    /// Flush every open group immediately, in key order.
    pub async fn flush_all(&self) -> usize {
        let mut drained: Vec<(GroupKey, Batch)> = {
            let mut groups = self.groups.lock().unwrap_or_else(PoisonError::into_inner);
            groups
                .drain()
                .map(|(key, group)| {
                    if let Some(timer) = group.timer {
                        timer.abort();
                    }
                    (key, group.batch)
                })
                .collect()
        };
        drained.sort_by(|a, b| a.0.cmp(&b.0));

        let count = drained.len();
        for (key, batch) in drained {
            self.sink.flush(key, batch).await;
        }
        count
    }

    pub fn open_groups(&self) -> Vec<GroupKey> {
        let groups = self.groups.lock().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<GroupKey> = groups.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Remove a group. From a timer (`generation` set), only the group that
    /// armed it is removed and the timer is left to finish.
    fn take(&self, key: &GroupKey, generation: Option<u64>) -> Option<Batch> {
        let mut groups = self.groups.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(expected) = generation {
            if groups.get(key).map(|g| g.generation) != Some(expected) {
                return None;
            }
        }
        let group = groups.remove(key)?;
        if generation.is_none() {
            if let Some(timer) = group.timer {
                timer.abort();
            }
        }
        Some(group.batch)
    }
}
