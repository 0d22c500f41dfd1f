use serde::Deserialize;

use depot_infra::projections::{
    OrderHistoryReadModel, OrderReadModel, PoolReadModel, ProductStockReadModel,
};
use depot_orders::{Order, TransitionMetadata};
use depot_pools::PoolStatus;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub items: Vec<AddItemRequest>,
}

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price: u64,
}

/// Body of `PATCH /orders/:id/status`. Which metadata fields matter depends
/// on the edge being taken.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub target_status: String,
    #[serde(default)]
    pub metadata: TransitionMetadata,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub sku: String,
    pub name: String,
    pub min_order_quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct ReceiveStockRequest {
    pub quantity: i64,
}

// -------------------------
// JSON mapping helpers
// -------------------------

/// Renders an order straight from the aggregate, for responses that must
/// reflect the write we just committed rather than the eventually-consistent
/// read model.
pub fn domain_order_to_json(order: &Order) -> serde_json::Value {
    serde_json::json!({
        "id": order.id_typed().0.to_string(),
        "buyer": order.buyer().map(|b| b.to_string()),
        "status": order.status().as_str(),
        "items": order.items().iter().map(|i| serde_json::json!({
            "product_id": i.product_id.0.to_string(),
            "quantity": i.quantity,
            "unit_price": i.unit_price,
        })).collect::<Vec<_>>(),
        "total_amount": order.total_amount(),
        "pool_id": order.pool_id().map(|p| p.to_string()),
        "tracking_number": order.tracking_number(),
        "carrier": order.carrier(),
        "delivery_signature": order.delivery_signature(),
        "delivery_confirmation": order.delivery_confirmation(),
    })
}

pub fn order_to_json(rm: OrderReadModel) -> serde_json::Value {
    serde_json::json!({
        "id": rm.order_id.0.to_string(),
        "buyer": rm.buyer.to_string(),
        "status": rm.status.as_str(),
        "items": rm.items.into_iter().map(|i| serde_json::json!({
            "product_id": i.product_id.0.to_string(),
            "quantity": i.quantity,
            "unit_price": i.unit_price,
        })).collect::<Vec<_>>(),
        "total_amount": rm.total_amount,
        "pool_id": rm.pool_id.map(|p| p.to_string()),
        "tracking_number": rm.tracking_number,
        "carrier": rm.carrier,
        "delivery_signature": rm.delivery_signature,
        "delivery_confirmation": rm.delivery_confirmation,
    })
}

pub fn history_to_json(rm: OrderHistoryReadModel) -> serde_json::Value {
    serde_json::json!({
        "order_id": rm.order_id.0.to_string(),
        "entries": rm.entries.into_iter().map(|e| serde_json::json!({
            "sequence_number": e.sequence_number,
            "from": e.from.as_str(),
            "to": e.to.as_str(),
            "changed_by": e.changed_by.to_string(),
            "note": e.note,
            "occurred_at": e.occurred_at.to_rfc3339(),
        })).collect::<Vec<_>>(),
    })
}

pub fn pool_to_json(rm: PoolReadModel) -> serde_json::Value {
    serde_json::json!({
        "id": rm.pool_id.0.to_string(),
        "product_id": rm.product_id.0.to_string(),
        "status": match rm.status {
            PoolStatus::Open => "OPEN",
            PoolStatus::Locked => "LOCKED",
            PoolStatus::Completed => "COMPLETED",
        },
        "target_quantity": rm.target_quantity,
        "committed_quantity": rm.committed_quantity,
        "members": rm.members.into_iter().map(|m| serde_json::json!({
            "order_id": m.order_id.0.to_string(),
            "buyer": m.buyer.to_string(),
            "quantity": m.quantity,
        })).collect::<Vec<_>>(),
        "expires_at": rm.expires_at.map(|d| d.to_rfc3339()),
    })
}

pub fn product_to_json(rm: ProductStockReadModel) -> serde_json::Value {
    serde_json::json!({
        "id": rm.product_id.0.to_string(),
        "sku": rm.sku,
        "name": rm.name,
        "min_order_quantity": rm.min_order_quantity,
        "current_stock": rm.current_stock,
        "reserved_stock": rm.reserved_stock,
    })
}
