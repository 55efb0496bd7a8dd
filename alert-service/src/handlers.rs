use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use shared::{inventory_item_ref, InventoryEvent};
use tracing::{debug, info, warn};

use crate::error::{GuardError, IngestError, MalformedEvent};
use crate::evaluator::evaluate;
use crate::guard::{DispatchGuard, GuardOutcome};
use crate::queue::JobHandle;
use crate::store::{with_store_timeout, AlertRecordStore};

/// How an inbound event was settled. Every variant is acknowledged upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Nobody tracks this inventory item.
    Unmatched,
    /// Matched, but no notification was due or another event already sent it.
    Skipped,
    Dispatched(JobHandle),
    /// Dropped permanently; redelivery cannot fix the payload.
    Malformed,
}

/// Inventory level webhook body before validation.
#[derive(Debug, Default, Deserialize)]
pub struct RawInventoryEvent {
    #[serde(default)]
    pub shop: Option<String>,
    #[serde(default, alias = "inventoryItemExternalId", alias = "inventory_item_id")]
    pub inventory_item_external_id: Option<serde_json::Value>,
    #[serde(default, alias = "availableQuantity", alias = "available")]
    pub available_quantity: Option<i64>,
}

impl RawInventoryEvent {
    /// `gateway_shop` is the shop the gateway authenticated. It always wins; a
    /// body naming a different shop is rejected.
    pub fn validate(self, gateway_shop: Option<&str>) -> Result<InventoryEvent, MalformedEvent> {
        let gateway_shop = gateway_shop.map(str::trim).filter(|s| !s.is_empty());
        let body_shop = self.shop.as_deref().map(str::trim).filter(|s| !s.is_empty());

        let shop = match (gateway_shop, body_shop) {
            (Some(gateway), Some(body)) if gateway != body => {
                return Err(MalformedEvent(format!(
                    "body shop {} does not match authenticated shop {}",
                    body, gateway
                )));
            }
            (Some(shop), _) | (None, Some(shop)) => shop.to_string(),
            (None, None) => return Err(MalformedEvent("missing shop".to_string())),
        };

        let external_id = match self.inventory_item_external_id {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s,
            Some(serde_json::Value::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(MalformedEvent(format!("invalid inventory item id: {}", other)));
            }
            None => return Err(MalformedEvent("missing inventory item id".to_string())),
        };

        let available_quantity = self
            .available_quantity
            .ok_or_else(|| MalformedEvent("missing available quantity".to_string()))?;

        Ok(InventoryEvent {
            shop,
            inventory_item_ref: inventory_item_ref(&external_id),
            available_quantity,
        })
    }
}

pub fn parse_event(gateway_shop: Option<&str>, body: &[u8]) -> Result<InventoryEvent, MalformedEvent> {
    let raw: RawInventoryEvent =
        serde_json::from_slice(body).map_err(|e| MalformedEvent(e.to_string()))?;
    raw.validate(gateway_shop)
}

/// Settles one inventory change at a time; safe to run concurrently.
pub struct WebhookHandler {
    store: Arc<dyn AlertRecordStore>,
    guard: DispatchGuard,
    lookup_timeout: Duration,
}

impl WebhookHandler {
    pub fn new(store: Arc<dyn AlertRecordStore>, guard: DispatchGuard, lookup_timeout: Duration) -> Self {
        Self {
            store,
            guard,
            lookup_timeout,
        }
    }

    pub async fn handle_payload(
        &self,
        gateway_shop: Option<&str>,
        body: &[u8],
    ) -> Result<IngestOutcome, IngestError> {
        match parse_event(gateway_shop, body) {
            Ok(event) => self.handle_event(event).await,
            Err(e) => {
                warn!(shop = gateway_shop.unwrap_or_default(), error = %e, "Dropping inventory event");
                Ok(IngestOutcome::Malformed)
            }
        }
    }

    pub async fn handle_event(&self, event: InventoryEvent) -> Result<IngestOutcome, IngestError> {
        let record = with_store_timeout(
            self.lookup_timeout,
            self.store
                .find_alert_record(&event.shop, &event.inventory_item_ref),
        )
        .await
        .map_err(IngestError::StoreUnavailable)?;

        let record = match record {
            Some(record) => record,
            None => {
                debug!(
                    shop = %event.shop,
                    inventory_item = %event.inventory_item_ref,
                    "No alert tracks this inventory item"
                );
                return Ok(IngestOutcome::Unmatched);
            }
        };

        let decision = evaluate(&record, event.available_quantity);
        debug!(
            record_id = record.id,
            available = event.available_quantity,
            threshold = record.threshold,
            decision = decision.as_str(),
            "Evaluated inventory level"
        );

        match self.guard.apply(&record, decision, event.available_quantity).await {
            Ok(GuardOutcome::NoOp) => Ok(IngestOutcome::Skipped),
            Ok(GuardOutcome::Enqueued { handle, mutation }) => {
                info!(
                    shop = %record.shop,
                    record_id = record.id,
                    job = %handle,
                    latched = ?mutation,
                    "Low stock alert queued"
                );
                Ok(IngestOutcome::Dispatched(handle))
            }
            Err(GuardError::StaleRecord(id)) => {
                warn!(record_id = id, "Alert already latched by a concurrent event");
                Ok(IngestOutcome::Skipped)
            }
            Err(GuardError::Store(e)) => Err(IngestError::StoreUnavailable(e)),
            Err(GuardError::Dispatch(e)) => Err(IngestError::DispatchUnavailable(e)),
        }
    }
}
