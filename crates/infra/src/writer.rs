//! Propagation writer: absolute quantity sets against the platform.
//!
//! Every write is registered as a predicted echo *before* the platform call is
//! issued. Failed writes are reported back, never retried here.

use std::sync::Arc;

use tracing::{debug, warn};

use stocklink_core::{NodeId, TenantId};

use crate::error::{PlatformError, SyncError, SyncResult};
use crate::filter::DeliveryFilter;
use crate::platform::{CommercePlatform, QuantityWrite, WriteReason};

/// Per-item outcome of a batched write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub succeeded: Vec<QuantityWrite>,
    pub failed: Vec<(QuantityWrite, PlatformError)>,
}

impl WriteReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn has_failed(&self, node_id: &NodeId) -> bool {
        self.failed.iter().any(|(w, _)| &w.node_id == node_id)
    }

    pub fn failed_nodes(&self) -> Vec<NodeId> {
        self.failed.iter().map(|(w, _)| w.node_id.clone()).collect()
    }
}

pub struct PropagationWriter {
    platform: Arc<dyn CommercePlatform>,
    filter: Arc<DeliveryFilter>,
    batch_size: usize,
}

impl PropagationWriter {
    pub fn new(
        platform: Arc<dyn CommercePlatform>,
        filter: Arc<DeliveryFilter>,
        batch_size: usize,
    ) -> Self {
        Self {
            platform,
            filter,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn write(
        &self,
        tenant_id: TenantId,
        write: QuantityWrite,
        reason: WriteReason,
    ) -> SyncResult<()> {
        let node = write.node_id.clone();
        let mut report = self.write_batch(tenant_id, vec![write], reason).await;
        match report.failed.pop() {
            Some((_, source)) => Err(SyncError::platform_write(&node, source)),
            None => Ok(()),
        }
    }

    /// Issue `writes` in chunks of at most `batch_size`. One failing item never
    /// blocks the others.
    pub async fn write_batch(
        &self,
        tenant_id: TenantId,
        writes: Vec<QuantityWrite>,
        reason: WriteReason,
    ) -> WriteReport {
        let mut report = WriteReport::default();

        for chunk in writes.chunks(self.batch_size) {
            for w in chunk {
                self.filter
                    .mark_predicted_echo(tenant_id, &w.node_id, &w.location_id, w.quantity)
                    .await;
            }

            let mut results = self
                .platform
                .set_quantities(tenant_id, chunk, reason)
                .await
                .into_iter();
            for w in chunk {
                match results.next() {
                    Some(Ok(())) => {
                        debug!(tenant = %tenant_id, node = %w.node_id, location = %w.location_id, quantity = w.quantity, reason = reason.as_str(), "quantity written");
                        report.succeeded.push(w.clone());
                    }
                    Some(Err(e)) => {
                        warn!(tenant = %tenant_id, node = %w.node_id, location = %w.location_id, quantity = w.quantity, error = %e, "quantity write failed");
                        report.failed.push((w.clone(), e));
                    }
                    None => {
                        let e = PlatformError::Request("no result returned for write".into());
                        warn!(tenant = %tenant_id, node = %w.node_id, error = %e, "quantity write failed");
                        report.failed.push((w.clone(), e));
                    }
                }
            }
        }

        if !report.is_complete() {
            warn!(
                tenant = %tenant_id,
                succeeded = report.succeeded.len(),
                failed = report.failed.len(),
                "partial write failure"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::filter::FilterTtls;
    use crate::platform::InMemoryPlatform;

    fn setup(batch_size: usize) -> (Arc<InMemoryPlatform>, Arc<DeliveryFilter>, PropagationWriter) {
        let platform = Arc::new(InMemoryPlatform::new());
        let filter = Arc::new(DeliveryFilter::in_memory(FilterTtls::from(&SyncConfig::default())));
        let writer = PropagationWriter::new(platform.clone(), filter.clone(), batch_size);
        (platform, filter, writer)
    }

    fn w(node: &str, qty: i64) -> QuantityWrite {
        QuantityWrite::new(node.into(), "l".into(), qty)
    }

    #[tokio::test]
    async fn writes_are_marked_as_predicted_echoes() {
        let (platform, filter, writer) = setup(10);
        let tenant = TenantId::new();

        writer.write(tenant, w("n", 7), WriteReason::Correction).await.unwrap();

        assert_eq!(platform.level(tenant, &"n".into(), &"l".into()), Some(7));
        assert!(filter.is_predicted_echo(tenant, &"n".into(), &"l".into(), 7).await);
        assert_eq!(platform.writes()[0].reason, WriteReason::Correction);
    }

    #[tokio::test]
    async fn partial_failure_keeps_other_writes() {
        let (platform, _filter, writer) = setup(2);
        let tenant = TenantId::new();
        platform.fail_writes_for(&"b".into());

        let report = writer
            .write_batch(tenant, vec![w("a", 1), w("b", 2), w("c", 3)], WriteReason::Correction)
            .await;

        assert_eq!(report.succeeded, vec![w("a", 1), w("c", 3)]);
        assert_eq!(report.failed_nodes(), vec![NodeId::from("b")]);
        assert!(report.has_failed(&"b".into()));
        assert_eq!(platform.writes().len(), 2);
    }

    #[tokio::test]
    async fn single_write_failure_is_a_platform_write_error() {
        let (platform, _filter, writer) = setup(10);
        platform.fail_writes_for(&"n".into());

        let err = writer
            .write(TenantId::new(), w("n", 1), WriteReason::External)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::PlatformWrite { .. }));
    }
}
