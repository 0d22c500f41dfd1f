//! Order status graph and transition validation.
//!
//! Validity is two checks, both of which must pass:
//! 1. **Graph validity**: the target must be in the current status's
//!    successor set.
//! 2. **Role validity**: the actor's role must be permitted to initiate that
//!    specific edge.
//!
//! The graph check runs first; the first failure wins. Self-loops are invalid
//! for every status (re-submitting the current status is an error, not a
//! no-op).

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use depot_auth::Role;
use depot_core::AggregateId;

/// Order lifecycle status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Draft,
    Pending,
    Pooling,
    Processing,
    Confirmed,
    Paid,
    Shipping,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 10] = [
        OrderStatus::Draft,
        OrderStatus::Pending,
        OrderStatus::Pooling,
        OrderStatus::Processing,
        OrderStatus::Confirmed,
        OrderStatus::Paid,
        OrderStatus::Shipping,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    /// Static adjacency table. Exhaustive: every status has an entry, terminal
    /// statuses have an empty successor set.
    pub fn successors(self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Draft => &[Pending],
            Pending => &[Pooling, Processing, Cancelled],
            Pooling => &[Processing, Cancelled],
            Processing => &[Confirmed, Cancelled],
            Confirmed => &[Paid, Cancelled],
            Paid => &[Shipping, Refunded],
            Shipping => &[Delivered],
            Delivered => &[],
            Cancelled => &[],
            Refunded => &[],
        }
    }

    pub fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Draft => "DRAFT",
            OrderStatus::Pending => "PENDING",
            OrderStatus::Pooling => "POOLING",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Paid => "PAID",
            OrderStatus::Shipping => "SHIPPING",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(OrderStatus::Draft),
            "PENDING" => Ok(OrderStatus::Pending),
            "POOLING" => Ok(OrderStatus::Pooling),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "CONFIRMED" => Ok(OrderStatus::Confirmed),
            "PAID" => Ok(OrderStatus::Paid),
            "SHIPPING" => Ok(OrderStatus::Shipping),
            "DELIVERED" => Ok(OrderStatus::Delivered),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            "REFUNDED" => Ok(OrderStatus::Refunded),
            other => Err(TransitionError::InvalidStatus(other.to_string())),
        }
    }
}

/// Transition failure taxonomy.
///
/// The messages are part of the caller-facing contract: clients match on the
/// "Invalid status transition" and "User does not have permission" substrings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// Unknown status token (raw input, before it becomes an `OrderStatus`).
    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    /// Target not reachable from the current status per the graph.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    /// Graph allows the edge, but not for this actor's role.
    #[error("User does not have permission to move order from {from} to {to} as {role}")]
    InvalidRoleTransition {
        role: Role,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// Referenced order does not exist.
    #[error("order not found")]
    NotFound,
}

impl TransitionError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            TransitionError::InvalidStatus(_) => "INVALID_STATUS",
            TransitionError::InvalidStatusTransition { .. } => "INVALID_STATUS_TRANSITION",
            TransitionError::InvalidRoleTransition { .. } => "INVALID_ROLE_TRANSITION",
            TransitionError::NotFound => "NOT_FOUND",
        }
    }
}

/// May `role` initiate the `from -> to` edge?
///
/// Graph validity is checked separately; this only answers the role question.
pub fn role_permits(role: Role, from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    match role {
        // Elevated roles may perform any graph-valid transition.
        Role::Admin | Role::SuperAdmin => true,

        // Buyer-side roles: submit, enter pooling, cancel before processing.
        Role::Customer | Role::GeneralContractor | Role::Subcontractor => matches!(
            (from, to),
            (Draft, Pending) | (Pending, Pooling) | (Pending, Cancelled) | (Pooling, Cancelled)
        ),

        // Suppliers own the fulfillment edges.
        Role::Supplier => matches!(
            (from, to),
            (Processing, Confirmed)
                | (Processing, Cancelled)
                | (Paid, Shipping)
                | (Shipping, Delivered)
        ),
    }
}

/// Validate a requested transition: graph check first, then role check,
/// returning on the first failure. Pure.
pub fn validate_transition(
    current: OrderStatus,
    target: OrderStatus,
    role: Role,
) -> Result<(), TransitionError> {
    if !current.successors().contains(&target) {
        return Err(TransitionError::InvalidStatusTransition {
            from: current,
            to: target,
        });
    }
    if !role_permits(role, current, target) {
        return Err(TransitionError::InvalidRoleTransition {
            role,
            from: current,
            to: target,
        });
    }
    Ok(())
}

/// Targets reachable from `status` for `role` (graph ∩ role gate).
pub fn allowed_targets(status: OrderStatus, role: Role) -> Vec<OrderStatus> {
    status
        .successors()
        .iter()
        .copied()
        .filter(|&to| role_permits(role, status, to))
        .collect()
}

/// Caller-supplied transition metadata.
///
/// Shipping fields are merged into the order only on transitions into
/// shipping/delivery states, and only when present; `pool_id` and the pool
/// sizing fields matter only when entering `Pooling`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_confirmation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier_id: Option<String>,
    /// Pool back-reference (an existing pool to join, or the pool the
    /// workflow opened for this order).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_id: Option<AggregateId>,
    /// Target quantity when opening a new pool; defaults to the product's
    /// minimum order quantity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_quantity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}
