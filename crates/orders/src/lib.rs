//! `depot-orders` — the order aggregate and its status state machine.
//!
//! The status graph is a strict DAG (every edge moves forward, plus two
//! absorbing failure states reachable from many places). It is encoded once,
//! as a static adjacency table in [`status`], and every caller (aggregate,
//! workflow, HTTP layer) goes through that single table.

pub mod order;
pub mod status;

pub use order::{
    AddItem, ChangeStatus, CreateOrder, DeleteOrder, ItemAdded, Order, OrderCommand,
    OrderCreated, OrderDeleted, OrderEvent, OrderId, OrderItem, OrderStatusChanged,
};
pub use status::{
    allowed_targets, role_permits, validate_transition, OrderStatus, TransitionError,
    TransitionMetadata,
};
