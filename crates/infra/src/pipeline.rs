//! Intake pipeline: validated notification → filter → resolve → window.
//!
//! `ingest` never fails: every notification ends in an [`IntakeOutcome`], and
//! reconciliation itself happens later, when the group's window flushes.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use stocklink_events::{Notification, TenantScoped};
use stocklink_inventory::{GroupKey, RoleInfo};

use crate::filter::DeliveryFilter;
use crate::resolver::RelationshipResolver;
use crate::window::{AggregationWindow, BatchEntry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IntakeOutcome {
    /// Byte-identical redelivery inside the dedup TTL.
    Duplicate,
    /// Notification of our own write.
    Echo,
    /// Debounced; merged into the open group already holding the node.
    Folded,
    /// Buffered in the aggregation group `group`.
    Buffered { group: GroupKey },
    /// Relationship could not be read; left to upstream redelivery.
    Dropped,
}

impl IntakeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntakeOutcome::Duplicate => "duplicate",
            IntakeOutcome::Echo => "echo",
            IntakeOutcome::Folded => "folded",
            IntakeOutcome::Buffered { .. } => "buffered",
            IntakeOutcome::Dropped => "dropped",
        }
    }
}

pub struct SyncPipeline {
    filter: Arc<DeliveryFilter>,
    resolver: Arc<RelationshipResolver>,
    window: Arc<AggregationWindow>,
}

impl SyncPipeline {
    pub fn new(
        filter: Arc<DeliveryFilter>,
        resolver: Arc<RelationshipResolver>,
        window: Arc<AggregationWindow>,
    ) -> Self {
        Self {
            filter,
            resolver,
            window,
        }
    }

    pub fn window(&self) -> &Arc<AggregationWindow> {
        &self.window
    }

    pub async fn ingest(&self, notification: Notification) -> IntakeOutcome {
        let tenant = notification.tenant_id();
        let (_, event) = notification.into_parts();
        let (node, location) = (event.node_id.clone(), event.location_id.clone());

        if !self
            .filter
            .admit_exact_once(tenant, &event.delivery_key())
            .await
        {
            return IntakeOutcome::Duplicate;
        }

        if self
            .filter
            .is_predicted_echo(tenant, &node, &location, event.quantity)
            .await
        {
            debug!(tenant = %tenant, node = %node, location = %location, quantity = event.quantity, "dropping predicted echo");
            return IntakeOutcome::Echo;
        }

        if !self
            .filter
            .acquire_combo_debounce(tenant, &node, &location)
            .await
        {
            if self.window.try_fold(tenant, &node, &location, event.clone()) {
                debug!(tenant = %tenant, node = %node, location = %location, quantity = event.quantity, "debounced; folded into open group");
                return IntakeOutcome::Folded;
            }
            debug!(tenant = %tenant, node = %node, "debounced but no open group holds the node");
        }

        let role = match self.resolver.resolve(tenant, &node).await {
            Ok(role) => role,
            Err(e) => {
                warn!(tenant = %tenant, node = %node, error = %e, "relationship lookup failed; dropping notification");
                return IntakeOutcome::Dropped;
            }
        };

        let group = GroupKey::for_node(tenant, &node, role.as_ref(), &location);
        let entry = match role {
            Some(RoleInfo::Master { .. }) => BatchEntry::Master { event },
            Some(RoleInfo::Child { divisor, .. }) => BatchEntry::Child { event, divisor },
            None => BatchEntry::Unassigned { event },
        };
        self.window.enqueue(group.clone(), entry);
        IntakeOutcome::Buffered { group }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::{DateTime, TimeZone, Utc};
    use stocklink_core::{NodeId, TenantId};
    use stocklink_events::ChangeEvent;

    use crate::config::SyncConfig;
    use crate::platform::InMemoryPlatform;
    use crate::services::SyncServices;

    const WINDOW: Duration = Duration::from_secs(5);

    struct Harness {
        tenant: TenantId,
        platform: Arc<InMemoryPlatform>,
        services: SyncServices,
    }

    impl Harness {
        fn new() -> Self {
            let platform = Arc::new(InMemoryPlatform::new());
            let services = SyncServices::in_memory(SyncConfig::default(), platform.clone());
            let tenant = TenantId::new();
            platform.link(tenant, &"m".into(), &[("c1", None), ("c2", Some(2))]);
            for (node, qty) in [("m", 4), ("c1", 4), ("c2", 2)] {
                platform.set_level(tenant, &node.into(), &"l".into(), qty);
            }
            Self {
                tenant,
                platform,
                services,
            }
        }

        async fn notify(&self, node: &str, qty: i64, secs: i64) -> IntakeOutcome {
            self.platform.set_level(self.tenant, &node.into(), &"l".into(), qty);
            let event = ChangeEvent::new(node.into(), "l".into(), qty, at(secs));
            self.services
                .pipeline
                .ingest(Notification::new(self.tenant, event))
                .await
        }

        fn qty(&self, node: &str) -> Option<i64> {
            self.platform.level(self.tenant, &node.into(), &"l".into())
        }

        fn writes_to(&self, node: &str) -> usize {
            self.platform.writes_for(&NodeId::from(node)).len()
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn master_notification_converges_after_window() {
        let h = Harness::new();

        let outcome = h.notify("m", 10, 0).await;
        assert!(matches!(outcome, IntakeOutcome::Buffered { ref group } if group.master_id == NodeId::from("m")));
        assert_eq!(h.qty("c1"), Some(4));

        tokio::time::sleep(WINDOW + Duration::from_millis(10)).await;
        assert_eq!(h.qty("c1"), Some(10));
        assert_eq!(h.qty("c2"), Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn identical_redelivery_produces_one_effective_write() {
        let h = Harness::new();

        h.notify("m", 10, 0).await;
        assert_eq!(h.notify("m", 10, 0).await, IntakeOutcome::Duplicate);
        tokio::time::sleep(WINDOW + Duration::from_millis(10)).await;

        assert_eq!(h.writes_to("c1"), 1);
        assert_eq!(h.writes_to("c2"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn echo_of_own_write_does_not_start_a_pass() {
        let h = Harness::new();
        h.notify("m", 10, 0).await;
        tokio::time::sleep(WINDOW + Duration::from_millis(10)).await;
        h.platform.clear_writes();

        // The platform notifies us about the write we just made.
        assert_eq!(h.notify("c2", 5, 6).await, IntakeOutcome::Echo);
        assert_eq!(h.notify("c1", 10, 6).await, IntakeOutcome::Echo);
        tokio::time::sleep(WINDOW * 2).await;

        assert!(h.platform.writes().is_empty());
        assert!(h.services.window.open_groups().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn debounced_payloads_fold_while_identical_ones_drop() {
        let h = Harness::new();

        assert!(matches!(h.notify("c1", 6, 0).await, IntakeOutcome::Buffered { .. }));
        assert_eq!(h.notify("c1", 8, 1).await, IntakeOutcome::Folded);
        assert_eq!(h.notify("c1", 8, 1).await, IntakeOutcome::Duplicate);

        tokio::time::sleep(WINDOW + Duration::from_millis(10)).await;
        // First sighting of c1: its baseline starts at the folded value, nothing moves.
        assert!(h.platform.writes().is_empty());

        // A later change is a real delta against that baseline.
        h.notify("c1", 9, 10).await;
        tokio::time::sleep(WINDOW + Duration::from_millis(10)).await;
        assert_eq!(h.qty("m"), Some(5));
        assert_eq!(h.qty("c2"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn unassigned_node_is_grouped_by_itself() {
        let h = Harness::new();

        let outcome = h.notify("solo", 3, 0).await;
        assert!(matches!(outcome, IntakeOutcome::Buffered { ref group } if group.master_id == NodeId::from("solo")));

        tokio::time::sleep(WINDOW + Duration::from_millis(10)).await;
        assert!(h.platform.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_relationship_is_dropped() {
        let h = Harness::new();
        h.platform.fail_reads_for(&"c1".into());

        assert_eq!(h.notify("c1", 6, 0).await, IntakeOutcome::Dropped);
        assert!(h.services.window.open_groups().is_empty());
    }
}
