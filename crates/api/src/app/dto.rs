use chrono::{DateTime, Utc};
use serde::Deserialize;

use stocklink_core::{DomainResult, LocationId, NodeId, Quantity};
use stocklink_events::ChangeEvent;

/// Body of `POST /webhooks/inventory`: the platform's "level changed" delivery.
#[derive(Debug, Deserialize)]
pub struct InventoryWebhook {
    pub node_id: String,
    pub location_id: String,
    pub quantity: Quantity,
    #[serde(default)]
    pub observed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delivery_id: Option<String>,
}

impl InventoryWebhook {
    /// Validate ids; a missing `observed_at` falls back to receipt time.
    pub fn into_event(self, received_at: DateTime<Utc>) -> DomainResult<ChangeEvent> {
        let (node_id, location_id) = (NodeId::parse(self.node_id)?, LocationId::parse(self.location_id)?);
        let event = match self.observed_at {
            Some(observed_at) => ChangeEvent::new(node_id, location_id, self.quantity, observed_at),
            None => ChangeEvent::received(node_id, location_id, self.quantity, received_at),
        };
        Ok(match self.delivery_id {
            Some(id) => event.with_delivery_id(id),
            None => event,
        })
    }
}

/// Body of `POST /admin/reconcile`.
#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub master_id: String,
    pub location_id: String,
}

impl ReconcileRequest {
    pub fn into_ids(self) -> DomainResult<(NodeId, LocationId)> {
        Ok((
            NodeId::parse(self.master_id)?,
            LocationId::parse(self.location_id)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn missing_observed_at_uses_receipt_time() {
        let received = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let body: InventoryWebhook =
            serde_json::from_str(r#"{"node_id":"m","location_id":"l","quantity":7}"#).unwrap();
        let event = body.into_event(received).unwrap();
        assert_eq!(event.observed_at, received);
        assert_eq!(event.quantity, 7);
        assert_eq!(event.delivery_id, None);
        assert!(event.received_only);
    }

    #[test]
    fn redelivery_without_timestamp_keeps_its_key() {
        let raw = r#"{"node_id":"m","location_id":"l","quantity":7,"delivery_id":"evt-1"}"#;
        let first: InventoryWebhook = serde_json::from_str(raw).unwrap();
        let again: InventoryWebhook = serde_json::from_str(raw).unwrap();

        let first = first.into_event(Utc.timestamp_opt(1_700_000_000, 0).unwrap()).unwrap();
        let again = again.into_event(Utc.timestamp_opt(1_700_000_002, 0).unwrap()).unwrap();
        assert_eq!(first.delivery_key(), again.delivery_key());
    }

    #[test]
    fn blank_ids_are_rejected() {
        let body: InventoryWebhook =
            serde_json::from_str(r#"{"node_id":"  ","location_id":"l","quantity":1}"#).unwrap();
        assert!(body.into_event(Utc::now()).is_err());
    }
}
