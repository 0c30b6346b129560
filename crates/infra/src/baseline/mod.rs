//! Durable baselines: the quantity each node held after the last pass that
//! touched it, per (tenant, node, location).
//!
//! A baseline only ever moves to a value that was confirmed on the platform
//! (successful write, or no write needed). Losing baselines degrades the next
//! delta computation, so backend failures are surfaced, never swallowed.

use std::sync::Arc;

use async_trait::async_trait;

use stocklink_core::{LocationId, NodeId, Quantity, TenantId};

use crate::error::PersistenceError;

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryBaselineStore;
pub use postgres::PostgresBaselineStore;

#[async_trait]
pub trait BaselineStore: Send + Sync {
    async fn get(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        location_id: &LocationId,
    ) -> Result<Option<Quantity>, PersistenceError>;

    async fn put(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        location_id: &LocationId,
        quantity: Quantity,
    ) -> Result<(), PersistenceError>;

    /// Set `new` only if the stored value still equals `expected`
    /// (`None` = no row yet). Returns whether the swap happened.
    async fn compare_and_set(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        location_id: &LocationId,
        expected: Option<Quantity>,
        new: Quantity,
    ) -> Result<bool, PersistenceError>;
}

#[async_trait]
impl<S> BaselineStore for Arc<S>
where
    S: BaselineStore + ?Sized,
{
    async fn get(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        location_id: &LocationId,
    ) -> Result<Option<Quantity>, PersistenceError> {
        (**self).get(tenant_id, node_id, location_id).await
    }

    async fn put(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        location_id: &LocationId,
        quantity: Quantity,
    ) -> Result<(), PersistenceError> {
        (**self).put(tenant_id, node_id, location_id, quantity).await
    }

    async fn compare_and_set(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        location_id: &LocationId,
        expected: Option<Quantity>,
        new: Quantity,
    ) -> Result<bool, PersistenceError> {
        (**self)
            .compare_and_set(tenant_id, node_id, location_id, expected, new)
            .await
    }
}
