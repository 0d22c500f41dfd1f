use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use depot_core::{TenantId, UserId};
use depot_events::EventEnvelope;
use depot_orders::{OrderEvent, OrderId, OrderStatus, TransitionMetadata};

use super::cursor::CursorCheck;
use super::{ProjectionCursors, ProjectionError};
use crate::read_model::TenantStore;

/// One line of an order's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderHistoryEntry {
    /// Position in the order's event stream; entries are strictly ordered.
    pub sequence_number: u64,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub changed_by: UserId,
    pub note: String,
    pub metadata: TransitionMetadata,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderHistoryReadModel {
    pub order_id: OrderId,
    pub entries: Vec<OrderHistoryEntry>,
}

/// Append-only status history per order.
///
/// The entries mirror `orders.order.status_changed` events one-to-one; the
/// projection never edits or removes an existing entry, and deletion of a
/// draft order leaves its history in place for audit.
#[derive(Debug)]
pub struct OrderHistoryProjection<S>
where
    S: TenantStore<OrderId, OrderHistoryReadModel>,
{
    store: S,
    cursors: ProjectionCursors,
}

impl<S> OrderHistoryProjection<S>
where
    S: TenantStore<OrderId, OrderHistoryReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: ProjectionCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, order_id: &OrderId) -> Option<OrderHistoryReadModel> {
        self.store.get(tenant_id, order_id)
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != "orders.order" {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        match self.cursors.check(tenant_id, aggregate_id, seq)? {
            CursorCheck::Duplicate => return Ok(()),
            CursorCheck::Apply => {}
        }

        let ev: OrderEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        if let OrderEvent::OrderStatusChanged(e) = ev {
            if e.tenant_id != tenant_id {
                return Err(ProjectionError::TenantIsolation(
                    "event tenant_id does not match envelope tenant_id".to_string(),
                ));
            }
            if e.order_id.0 != aggregate_id {
                return Err(ProjectionError::TenantIsolation(
                    "event order_id does not match envelope aggregate_id".to_string(),
                ));
            }

            let mut rm = self
                .store
                .get(tenant_id, &e.order_id)
                .unwrap_or(OrderHistoryReadModel {
                    order_id: e.order_id,
                    entries: vec![],
                });
            rm.entries.push(OrderHistoryEntry {
                sequence_number: seq,
                from: e.from,
                to: e.to,
                changed_by: e.actor,
                note: e.note,
                metadata: e.metadata,
                occurred_at: e.occurred_at,
            });
            // Entries are kept sorted by stream position.
            rm.entries.sort_by_key(|entry| entry.sequence_number);
            self.store.upsert(tenant_id, e.order_id, rm);
        }

        self.cursors.advance(tenant_id, aggregate_id, seq);
        Ok(())
    }
}
