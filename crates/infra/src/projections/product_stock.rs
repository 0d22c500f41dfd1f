use serde::Serialize;
use serde_json::Value as JsonValue;

use depot_catalog::{ProductEvent, ProductId};
use depot_core::TenantId;
use depot_events::EventEnvelope;

use super::cursor::CursorCheck;
use super::{ProjectionCursors, ProjectionError};
use crate::read_model::TenantStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductStockReadModel {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub min_order_quantity: i64,
    pub current_stock: i64,
    pub reserved_stock: i64,
}

#[derive(Debug)]
pub struct ProductStockProjection<S>
where
    S: TenantStore<ProductId, ProductStockReadModel>,
{
    store: S,
    cursors: ProjectionCursors,
}

impl<S> ProductStockProjection<S>
where
    S: TenantStore<ProductId, ProductStockReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: ProjectionCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, product_id: &ProductId) -> Option<ProductStockReadModel> {
        self.store.get(tenant_id, product_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<ProductStockReadModel> {
        self.store.list(tenant_id)
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != "catalog.product" {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        match self.cursors.check(tenant_id, aggregate_id, seq)? {
            CursorCheck::Duplicate => return Ok(()),
            CursorCheck::Apply => {}
        }

        let ev: ProductEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let (event_tenant, product_id) = match &ev {
            ProductEvent::ProductCreated(e) => (e.tenant_id, e.product_id),
            ProductEvent::StockReceived(e) => (e.tenant_id, e.product_id),
            ProductEvent::StockReserved(e) => (e.tenant_id, e.product_id),
            ProductEvent::StockReleased(e) => (e.tenant_id, e.product_id),
        };

        if event_tenant != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if product_id.0 != aggregate_id {
            return Err(ProjectionError::TenantIsolation(
                "event product_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            ProductEvent::ProductCreated(e) => {
                self.store.upsert(
                    tenant_id,
                    e.product_id,
                    ProductStockReadModel {
                        product_id: e.product_id,
                        sku: e.sku,
                        name: e.name,
                        min_order_quantity: e.min_order_quantity,
                        current_stock: 0,
                        reserved_stock: 0,
                    },
                );
            }
            ProductEvent::StockReceived(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.product_id) {
                    rm.current_stock += e.quantity;
                    self.store.upsert(tenant_id, e.product_id, rm);
                }
            }
            ProductEvent::StockReserved(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.product_id) {
                    rm.current_stock -= e.quantity;
                    rm.reserved_stock += e.quantity;
                    self.store.upsert(tenant_id, e.product_id, rm);
                }
            }
            ProductEvent::StockReleased(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.product_id) {
                    rm.current_stock += e.quantity;
                    rm.reserved_stock -= e.quantity;
                    self.store.upsert(tenant_id, e.product_id, rm);
                }
            }
        }

        self.cursors.advance(tenant_id, aggregate_id, seq);
        Ok(())
    }
}
