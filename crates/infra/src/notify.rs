//! Notification delivery seam.
//!
//! Notifications are best-effort: a delivery failure is logged and never
//! fails the transition that triggered it.

use std::sync::{Arc, Mutex};

use depot_core::{TenantId, UserId};
use depot_orders::{OrderId, OrderStatus};
use depot_pools::PoolId;

/// A notification about an order status change, addressed to the buyer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderStatusNotification {
    pub tenant_id: TenantId,
    pub recipient: UserId,
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub note: String,
}

/// A notification that a pool filled. Sent once per completion; it names
/// every participating order and buyer so the sink can fan out delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolCompletedNotification {
    pub tenant_id: TenantId,
    pub pool_id: PoolId,
    pub total_quantity: i64,
    pub participants: Vec<(OrderId, UserId)>,
}

/// Outbound notification channel (email, push, webhook, ...).
pub trait NotificationSink: Send + Sync {
    fn notify_order_status_change(
        &self,
        notification: OrderStatusNotification,
    ) -> Result<(), String>;

    fn notify_pool_completed(&self, notification: PoolCompletedNotification)
        -> Result<(), String>;
}

impl<N> NotificationSink for Arc<N>
where
    N: NotificationSink + ?Sized,
{
    fn notify_order_status_change(
        &self,
        notification: OrderStatusNotification,
    ) -> Result<(), String> {
        (**self).notify_order_status_change(notification)
    }

    fn notify_pool_completed(
        &self,
        notification: PoolCompletedNotification,
    ) -> Result<(), String> {
        (**self).notify_pool_completed(notification)
    }
}

/// Recording sink for tests/dev. Can be flipped into a failing mode to
/// exercise best-effort delivery.
#[derive(Debug, Default)]
pub struct InMemoryNotificationSink {
    order_status: Mutex<Vec<OrderStatusNotification>>,
    pool_completed: Mutex<Vec<PoolCompletedNotification>>,
    fail: Mutex<bool>,
}

impl InMemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent delivery fail.
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut fail) = self.fail.lock() {
            *fail = failing;
        }
    }

    pub fn order_status_notifications(&self) -> Vec<OrderStatusNotification> {
        self.order_status.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn pool_completed_notifications(&self) -> Vec<PoolCompletedNotification> {
        self.pool_completed.lock().map(|v| v.clone()).unwrap_or_default()
    }

    fn failing(&self) -> bool {
        self.fail.lock().map(|f| *f).unwrap_or(false)
    }
}

impl NotificationSink for InMemoryNotificationSink {
    fn notify_order_status_change(
        &self,
        notification: OrderStatusNotification,
    ) -> Result<(), String> {
        if self.failing() {
            return Err("delivery failed".to_string());
        }
        if let Ok(mut sent) = self.order_status.lock() {
            sent.push(notification);
        }
        Ok(())
    }

    fn notify_pool_completed(
        &self,
        notification: PoolCompletedNotification,
    ) -> Result<(), String> {
        if self.failing() {
            return Err("delivery failed".to_string());
        }
        if let Ok(mut sent) = self.pool_completed.lock() {
            sent.push(notification);
        }
        Ok(())
    }
}
