use serde::Serialize;
use serde_json::Value as JsonValue;

use depot_core::TenantId;
use depot_events::EventEnvelope;
use depot_orders::{OrderEvent, OrderId, OrderStatus};

use super::cursor::CursorCheck;
use super::{ProjectionCursors, ProjectionError};
use crate::read_model::TenantStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItemReadModel {
    pub product_id: depot_catalog::ProductId,
    pub quantity: i64,
    pub unit_price: u64,
}

/// Current-state view of an order, maintained from its event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderReadModel {
    pub order_id: OrderId,
    pub buyer: depot_core::UserId,
    pub status: OrderStatus,
    pub items: Vec<OrderItemReadModel>,
    pub total_amount: u64,
    pub pool_id: Option<depot_core::AggregateId>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub delivery_signature: Option<String>,
    pub delivery_confirmation: Option<String>,
}

#[derive(Debug)]
pub struct OrdersProjection<S>
where
    S: TenantStore<OrderId, OrderReadModel>,
{
    store: S,
    cursors: ProjectionCursors,
}

impl<S> OrdersProjection<S>
where
    S: TenantStore<OrderId, OrderReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: ProjectionCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, order_id: &OrderId) -> Option<OrderReadModel> {
        self.store.get(tenant_id, order_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<OrderReadModel> {
        self.store.list(tenant_id)
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

        let (event_tenant, order_id) = match &ev {
            OrderEvent::OrderCreated(e) => (e.tenant_id, e.order_id),
            OrderEvent::ItemAdded(e) => (e.tenant_id, e.order_id),
            OrderEvent::OrderStatusChanged(e) => (e.tenant_id, e.order_id),
            OrderEvent::OrderDeleted(e) => (e.tenant_id, e.order_id),
        };

        if event_tenant != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if order_id.0 != aggregate_id {
            return Err(ProjectionError::TenantIsolation(
                "event order_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            OrderEvent::OrderCreated(e) => {
                self.store.upsert(
                    tenant_id,
                    e.order_id,
                    OrderReadModel {
                        order_id: e.order_id,
                        buyer: e.buyer,
                        status: e.status,
                        items: vec![],
                        total_amount: 0,
                        pool_id: None,
                        tracking_number: None,
                        carrier: None,
                        delivery_signature: None,
                        delivery_confirmation: None,
                    },
                );
            }
            OrderEvent::ItemAdded(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.order_id) {
                    rm.total_amount += e.item.line_total();
                    rm.items.push(OrderItemReadModel {
                        product_id: e.item.product_id,
                        quantity: e.item.quantity,
                        unit_price: e.item.unit_price,
                    });
                    self.store.upsert(tenant_id, e.order_id, rm);
                }
            }
            OrderEvent::OrderStatusChanged(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.order_id) {
                    rm.status = e.to;
                    if e.to == OrderStatus::Pooling {
                        rm.pool_id = e.metadata.pool_id;
                    }
                    if matches!(e.to, OrderStatus::Shipping | OrderStatus::Delivered) {
                        if let Some(v) = e.metadata.tracking_number {
                            rm.tracking_number = Some(v);
                        }
                        if let Some(v) = e.metadata.carrier {
                            rm.carrier = Some(v);
                        }
                        if let Some(v) = e.metadata.delivery_signature {
                            rm.delivery_signature = Some(v);
                        }
                        if let Some(v) = e.metadata.delivery_confirmation {
                            rm.delivery_confirmation = Some(v);
                        }
                    }
                    self.store.upsert(tenant_id, e.order_id, rm);
                }
            }
            OrderEvent::OrderDeleted(e) => {
                self.store.remove(tenant_id, &e.order_id);
            }
        }

        self.cursors.advance(tenant_id, aggregate_id, seq);
        Ok(())
    }

    /// Drop and replay: clears every tenant seen in the batch, then applies
    /// all envelopes in stream order.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        let mut envs: Vec<_> = envelopes.into_iter().collect();

        {
            let mut tenants = envs.iter().map(|e| e.tenant_id()).collect::<Vec<_>>();
            tenants.sort_by_key(|t| *t.as_uuid().as_bytes());
            tenants.dedup();
            for t in tenants {
                self.store.clear_tenant(t);
                self.cursors.clear_tenant(t);
            }
        }

        envs.sort_by_key(|e| {
            (
                *e.tenant_id().as_uuid().as_bytes(),
                *e.aggregate_id().as_uuid().as_bytes(),
                e.sequence_number(),
            )
        });

        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}
