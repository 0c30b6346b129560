use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use stocklink_core::{LocationId, NodeId, Quantity};

/// Observation: the platform reports that `node_id` now holds `quantity` at `location_id`.
///
/// Events are facts about the platform, not commands. They may arrive
/// duplicated, reordered, in bursts, or as the echo of our own write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub node_id: NodeId,
    pub location_id: LocationId,
    pub quantity: Quantity,
    pub observed_at: DateTime<Utc>,
    /// Platform delivery identifier, when the transport provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<String>,
    /// `observed_at` is our receipt time, not a platform timestamp.
    #[serde(default, skip_serializing_if = "core::ops::Not::not")]
    pub received_only: bool,
}

impl ChangeEvent {
    pub fn new(
        node_id: NodeId,
        location_id: LocationId,
        quantity: Quantity,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            node_id,
            location_id,
            quantity,
            observed_at,
            delivery_id: None,
            received_only: false,
        }
    }

    /// Observation without a platform timestamp, stamped with `received_at`.
    pub fn received(
        node_id: NodeId,
        location_id: LocationId,
        quantity: Quantity,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            received_only: true,
            ..Self::new(node_id, location_id, quantity, received_at)
        }
    }

    pub fn with_delivery_id(mut self, delivery_id: impl Into<String>) -> Self {
        self.delivery_id = Some(delivery_id.into());
        self
    }

    /// Stable event name, used in logs and reports.
    pub fn event_type(&self) -> &'static str {
        "inventory.level.changed"
    }

    /// Key identifying byte-identical redeliveries of this observation.
    ///
    /// Without a platform timestamp the receipt time differs per redelivery,
    /// so the delivery id stands in for it.
    pub fn delivery_key(&self) -> DeliveryKey {
        if let (true, Some(delivery_id)) = (self.received_only, self.delivery_id.as_deref()) {
            return DeliveryKey::for_delivery(
                &self.node_id,
                &self.location_id,
                self.quantity,
                delivery_id,
            );
        }
        DeliveryKey::compute(
            &self.node_id,
            &self.location_id,
            self.quantity,
            self.observed_at,
        )
    }
}

/// Hash of `(node, location, quantity, observed_at)`, or of
/// `(node, location, quantity, delivery_id)` when the payload carried no timestamp.
///
/// Timestamped deliveries ignore the delivery id: platforms re-send with fresh ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryKey(String);

impl DeliveryKey {
    pub fn compute(
        node_id: &NodeId,
        location_id: &LocationId,
        quantity: Quantity,
        observed_at: DateTime<Utc>,
    ) -> Self {
        let stamp = observed_at.to_rfc3339_opts(SecondsFormat::Nanos, true);
        Self::hash(node_id, location_id, quantity, b't', stamp.as_bytes())
    }

    pub fn for_delivery(
        node_id: &NodeId,
        location_id: &LocationId,
        quantity: Quantity,
        delivery_id: &str,
    ) -> Self {
        Self::hash(node_id, location_id, quantity, b'd', delivery_id.as_bytes())
    }

    fn hash(
        node_id: &NodeId,
        location_id: &LocationId,
        quantity: Quantity,
        tag: u8,
        discriminator: &[u8],
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(node_id.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(location_id.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(quantity.to_be_bytes());
        hasher.update([tag]);
        hasher.update(discriminator);
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for DeliveryKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
