//! Reconciliation engine.
//!
//! Runs one pass per flushed batch entry, under the per-group lock:
//! read (baselines, current quantities, relationships) → plan (pure, in
//! `stocklink-inventory`) → write (propagation writer) → move baselines for
//! every target that now holds its expected value → report.
//!
//! Errors are caught per entry and logged; they never stop the rest of the batch.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use stocklink_core::{Divisor, DomainError, LocationId, NodeId, Quantity, TenantId};
use stocklink_events::{ChangeEvent, NodeChange, PassTrigger, ReconciliationReport};
use stocklink_inventory::{
    ChildDrivenInput, ChildLink, GroupKey, LinkedState, MasterDrivenInput, PlannedTarget,
    ReconciliationPlan, RoleInfo, TargetKind, plan_child_driven, plan_master_driven,
    plan_unassigned,
};

use crate::baseline::BaselineStore;
use crate::error::{SyncError, SyncResult};
use crate::lock::{GroupLock, LockOutcome};
use crate::notifier::ReportNotifier;
use crate::platform::{CommercePlatform, QuantityWrite, WriteReason};
use crate::resolver::RelationshipResolver;
use crate::window::{Batch, BatchEntry, FlushSink};
use crate::writer::{PropagationWriter, WriteReport};

/// What one pass planned and what actually happened.
#[derive(Debug, Clone)]
pub struct PassOutcome {
    pub plan: ReconciliationPlan,
    pub report: ReconciliationReport,
}

pub struct Reconciler {
    platform: Arc<dyn CommercePlatform>,
    baselines: Arc<dyn BaselineStore>,
    resolver: Arc<RelationshipResolver>,
    writer: PropagationWriter,
    notifier: Arc<dyn ReportNotifier>,
    lock: GroupLock<Batch>,
}

impl Reconciler {
    pub fn new(
        platform: Arc<dyn CommercePlatform>,
        baselines: Arc<dyn BaselineStore>,
        resolver: Arc<RelationshipResolver>,
        writer: PropagationWriter,
        notifier: Arc<dyn ReportNotifier>,
    ) -> Self {
        Self {
            platform,
            baselines,
            resolver,
            writer,
            notifier,
            lock: GroupLock::new(),
        }
    }

    /// Reconcile `batch` for `key`, or merge it into the pass already running
    /// for that group.
    pub async fn submit(&self, key: GroupKey, batch: Batch) -> LockOutcome {
        if batch.is_empty() {
            return LockOutcome::Ran { passes: 0 };
        }
        self.lock
            .run(&key, batch, |batch| self.run_batch(&key, batch))
            .await
    }

    /// Administrative trigger: re-derive every child from the master's current quantity.
    pub async fn reconcile_manual(
        &self,
        tenant_id: TenantId,
        master_id: NodeId,
        location_id: LocationId,
    ) -> LockOutcome {
        info!(tenant = %tenant_id, master = %master_id, location = %location_id, "manual reconciliation requested");
        let key = GroupKey::new(tenant_id, master_id, location_id);
        let batch = Batch::single(BatchEntry::Manual {
            requested_at: Utc::now(),
        });
        self.submit(key, batch).await
    }

    pub fn is_reconciling(&self, key: &GroupKey) -> bool {
        self.lock.in_flight(key)
    }

    async fn run_batch(&self, key: &GroupKey, batch: Batch) {
        // A child-driven change moves the master away from any master value
        // observed in the same window.
        let mut master_claimed = false;

        for entry in batch.into_entries() {
            let result = match entry {
                BatchEntry::Child { event, divisor } => {
                    let result = self.child_pass(key, &event, divisor).await;
                    if matches!(&result, Ok(outcome) if outcome.plan.master_delta != 0) {
                        master_claimed = true;
                    }
                    result
                }
                BatchEntry::Master { event } if master_claimed => {
                    debug!(group = %key, quantity = event.quantity, "master event superseded by child-driven change");
                    continue;
                }
                BatchEntry::Master { event } => {
                    self.master_pass(key, Some(event.quantity), PassTrigger::Master)
                        .await
                }
                BatchEntry::Manual { .. } => self.master_pass(key, None, PassTrigger::Manual).await,
                BatchEntry::Unassigned { event } => self.unassigned_pass(key, &event).await,
            };

            match result {
                Ok(outcome) => {
                    let report = outcome.report;
                    if report.writes() > 0 || report.is_partial_failure() {
                        self.notifier.notify(report);
                    }
                }
                Err(e) if e.is_high_severity() => {
                    error!(group = %key, error = %e, "reconciliation pass failed");
                }
                Err(e) => warn!(group = %key, error = %e, "reconciliation pass failed"),
            }
        }
    }

    async fn child_pass(
        &self,
        key: &GroupKey,
        event: &ChangeEvent,
        divisor: Divisor,
    ) -> SyncResult<PassOutcome> {
        let tenant = key.tenant_id;
        let (master_id, location_id) = (&key.master_id, &key.location_id);

        let child_baseline = self.baselines.get(tenant, &event.node_id, location_id).await?;
        let master_baseline = self.baselines.get(tenant, master_id, location_id).await?;
        let master_current = self.read_current(tenant, master_id, location_id).await?;
        let (siblings, unread) = self
            .linked_states(tenant, master_id, location_id, Some(&event.node_id))
            .await?;

        let plan = plan_child_driven(ChildDrivenInput {
            child: ChildLink::new(event.node_id.clone(), divisor),
            observed: event.quantity,
            child_baseline,
            master_id: master_id.clone(),
            master_baseline,
            master_current,
            siblings,
        });
        debug!(
            group = %key,
            node = %event.node_id,
            quantity = event.quantity,
            master_delta = plan.master_delta,
            writes = plan.write_count(),
            "child-driven plan"
        );

        let guarded = [
            (master_id.clone(), master_baseline),
            (event.node_id.clone(), child_baseline),
        ];
        self.apply(key, plan, &guarded, unread).await
    }

    async fn master_pass(
        &self,
        key: &GroupKey,
        observed: Option<Quantity>,
        trigger: PassTrigger,
    ) -> SyncResult<PassOutcome> {
        let tenant = key.tenant_id;
        let (master_id, location_id) = (&key.master_id, &key.location_id);

        if let Some(RoleInfo::Child { master_id: parent, .. }) =
            self.resolver.resolve(tenant, master_id).await?
        {
            return Err(DomainError::invariant(format!(
                "node {master_id} is a child of {parent}, not a master"
            ))
            .into());
        }

        let master_current = self.read_current(tenant, master_id, location_id).await?;
        let (children, unread) = self
            .linked_states(tenant, master_id, location_id, None)
            .await?;

        let plan = plan_master_driven(
            MasterDrivenInput {
                master_id: master_id.clone(),
                observed: observed.unwrap_or(master_current),
                master_current,
                children,
            },
            trigger,
        );
        debug!(group = %key, writes = plan.write_count(), "master-driven plan");

        self.apply(key, plan, &[], unread).await
    }

    async fn unassigned_pass(&self, key: &GroupKey, event: &ChangeEvent) -> SyncResult<PassOutcome> {
        let plan = plan_unassigned(event.node_id.clone(), event.quantity);
        self.apply(key, plan, &[], Vec::new()).await
    }

    async fn read_current(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        location_id: &LocationId,
    ) -> SyncResult<Quantity> {
        self.platform
            .current_quantity(tenant_id, node_id, location_id)
            .await
            .map_err(|e| SyncError::platform_read(node_id, e))
    }

    /// Current quantities of the master's children (minus `skip`). Children
    /// whose read fails are left out of the pass and returned separately.
    async fn linked_states(
        &self,
        tenant_id: TenantId,
        master_id: &NodeId,
        location_id: &LocationId,
        skip: Option<&NodeId>,
    ) -> SyncResult<(Vec<LinkedState>, Vec<NodeId>)> {
        let children = match self.resolver.resolve(tenant_id, master_id).await? {
            Some(RoleInfo::Master { children, .. }) => children,
            _ => {
                debug!(tenant = %tenant_id, master = %master_id, "master lists no children");
                Vec::new()
            }
        };

        let mut states = Vec::with_capacity(children.len());
        let mut unread = Vec::new();
        for link in children {
            if Some(&link.node_id) == skip {
                continue;
            }
            match self.read_current(tenant_id, &link.node_id, location_id).await {
                Ok(current) => states.push(LinkedState::new(link, current)),
                Err(e) => {
                    warn!(tenant = %tenant_id, node = %link.node_id, error = %e, "skipping child this pass");
                    unread.push(link.node_id);
                }
            }
        }
        Ok((states, unread))
    }

    /// Issue the plan's writes, then move baselines for the master, the
    /// triggering child and every child actually written. `guarded` baselines are moved with
    /// compare-and-set against the value the plan was computed from.
    async fn apply(
        &self,
        key: &GroupKey,
        plan: ReconciliationPlan,
        guarded: &[(NodeId, Option<Quantity>)],
        unread: Vec<NodeId>,
    ) -> SyncResult<PassOutcome> {
        let tenant = key.tenant_id;
        let location_id = &key.location_id;

        let writes: Vec<QuantityWrite> = plan
            .writes()
            .map(|t| QuantityWrite::new(t.node_id.clone(), location_id.clone(), t.expected))
            .collect();
        let written = if writes.is_empty() {
            WriteReport::default()
        } else {
            self.writer
                .write_batch(tenant, writes, write_reason(&plan.trigger))
                .await
        };

        for target in &plan.targets {
            if written.has_failed(&target.node_id) {
                continue;
            }
            // An unwritten child may hold a change of its own that is still
            // waiting in this batch; its baseline stays where it was.
            if target.kind == TargetKind::Child && !target.needs_write() {
                continue;
            }
            let stored = match guarded.iter().find(|(node, _)| node == &target.node_id) {
                Some((_, expected)) => self
                    .baselines
                    .compare_and_set(tenant, &target.node_id, location_id, *expected, target.expected)
                    .await
                    .map(|swapped| {
                        if !swapped {
                            warn!(tenant = %tenant, node = %target.node_id, "baseline moved concurrently; left unchanged");
                        }
                    }),
                None => {
                    self.baselines
                        .put(tenant, &target.node_id, location_id, target.expected)
                        .await
                }
            };
            if let Err(e) = stored {
                let e = SyncError::from(e);
                error!(tenant = %tenant, node = %target.node_id, location = %location_id, error = %e, "failed to persist baseline");
            }
        }

        let report = build_report(key, &plan, &written, unread);
        info!(
            group = %key,
            trigger = ?plan.trigger,
            writes = report.writes(),
            failed = report.failed.len(),
            "reconciliation pass complete"
        );
        Ok(PassOutcome { plan, report })
    }
}

#[async_trait]
impl FlushSink for Reconciler {
    async fn flush(&self, key: GroupKey, batch: Batch) {
        self.submit(key, batch).await;
    }
}

fn write_reason(trigger: &PassTrigger) -> WriteReason {
    match trigger {
        PassTrigger::Manual => WriteReason::External,
        PassTrigger::Child { .. } | PassTrigger::Master | PassTrigger::Unassigned => {
            WriteReason::Correction
        }
    }
}

fn node_change(target: &PlannedTarget, written: &WriteReport) -> NodeChange {
    let failed = written.has_failed(&target.node_id);
    NodeChange {
        node_id: target.node_id.clone(),
        before: target.before,
        after: if failed { target.before } else { target.expected },
        written: target.needs_write() && !failed,
    }
}

fn build_report(
    key: &GroupKey,
    plan: &ReconciliationPlan,
    written: &WriteReport,
    unread: Vec<NodeId>,
) -> ReconciliationReport {
    let master = plan.master_target().map(|t| node_change(t, written));
    let children = plan
        .targets
        .iter()
        .filter(|t| t.kind != TargetKind::Master)
        .map(|t| node_change(t, written))
        .collect();
    let mut failed = written.failed_nodes();
    failed.extend(unread);

    ReconciliationReport {
        tenant_id: key.tenant_id,
        master_id: key.master_id.clone(),
        location_id: key.location_id.clone(),
        trigger: plan.trigger.clone(),
        master,
        children,
        failed,
        generated_at: Utc::now(),
    }
}
