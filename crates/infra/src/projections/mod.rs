//! Read-model projections fed by the event bus.
//!
//! Each projection is cursor-checked per stream: envelopes arriving out of
//! order are rejected, duplicates (at-least-once delivery) are ignored.

mod cursor;
mod order_history;
mod orders;
mod pools;
mod product_stock;

pub use cursor::ProjectionCursors;
pub use order_history::{OrderHistoryEntry, OrderHistoryProjection, OrderHistoryReadModel};
pub use orders::{OrderItemReadModel, OrderReadModel, OrdersProjection};
pub use pools::{PoolMemberReadModel, PoolReadModel, PoolsProjection};
pub use product_stock::{ProductStockProjection, ProductStockReadModel};

use thiserror::Error;

/// Shared projection failure taxonomy.
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event payload: {0}")]
    Deserialize(String),
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}
