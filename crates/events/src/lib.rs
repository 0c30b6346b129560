//! Inbound observations and outbound reports.
//!
//! - [`ChangeEvent`]: one quantity observation delivered by the commerce platform.
//! - [`Notification`]: a validated `(tenant, event)` pair handed to the pipeline.
//! - [`ReconciliationReport`]: before/after summary of one reconciliation pass.

pub mod change;
pub mod notification;
pub mod report;

pub use change::{ChangeEvent, DeliveryKey};
pub use notification::{Notification, TenantScoped};
pub use report::{NodeChange, PassTrigger, ReconciliationReport};
