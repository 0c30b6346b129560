use serde::{Deserialize, Serialize};

use stocklink_core::TenantId;

use crate::ChangeEvent;

/// Marks messages that belong to exactly one tenant.
///
/// Every key the pipeline derives (dedup, echo, debounce, group, baseline) is
/// tenant-qualified through this trait, so two shops can never share state.
pub trait TenantScoped {
    fn tenant_id(&self) -> TenantId;
}

/// A validated `(tenant, event)` pair.
///
/// Authentication, shop resolution and transport framing happen before one of
/// these is built; the pipeline trusts both fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    tenant_id: TenantId,
    event: ChangeEvent,
}

impl Notification {
    pub fn new(tenant_id: TenantId, event: ChangeEvent) -> Self {
        Self { tenant_id, event }
    }

    pub fn event(&self) -> &ChangeEvent {
        &self.event
    }

    pub fn into_parts(self) -> (TenantId, ChangeEvent) {
        (self.tenant_id, self.event)
    }
}

impl TenantScoped for Notification {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}
