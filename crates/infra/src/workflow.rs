//! Order workflow: role-gated status transitions plus their side effects.
//!
//! `update_order_status` is the single write path for order status. For each
//! transition it:
//!
//! 1. validates the transition (status graph, then role gate)
//! 2. runs every side effect's domain validation against rehydrated state
//!    (stock sufficiency, pool membership, pool state)
//! 3. appends the status change and the side-effect events
//! 4. sends notifications (best-effort, failures are logged)
//!
//! Steps 1-3 run behind a transition gate (a mutex), and nothing is appended
//! until every involved aggregate has accepted its command in step 2. A
//! rejected transition therefore leaves every stream untouched, and an
//! accepted one cannot fail halfway through its appends.
//!
//! Side effects by edge:
//! - `* -> Processing`: reserve stock for each line; leaving an open pool
//!   releases the pooled commitment first
//! - `Pending -> Pooling`: join (or open) the product's pool; a join that
//!   fills the pool advances every participating order to `Processing`
//! - `Pooling -> Cancelled`: leave the pool
//! - `Processing/Confirmed -> Cancelled`, `Paid -> Refunded`: release the
//!   stock reserved when the order entered processing

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info, warn};

use depot_auth::Role;
use depot_catalog::{
    CreateProduct, Product, ProductCommand, ProductId, ReceiveStock, ReleaseStock, ReserveStock,
};
use depot_core::{Aggregate, AggregateId, DomainError, TenantId, UserId};
use depot_events::{EventBus, EventEnvelope};
use depot_orders::{
    validate_transition, AddItem, ChangeStatus, CreateOrder, DeleteOrder, Order, OrderCommand,
    OrderId, OrderItem, OrderStatus, TransitionError, TransitionMetadata,
};
use depot_pools::{
    JoinPool, LeavePool, LockPool, OpenPool, Pool, PoolCommand, PoolEvent, PoolId, PoolStatus,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::notify::{NotificationSink, OrderStatusNotification, PoolCompletedNotification};

pub const ORDER_AGGREGATE: &str = "orders.order";
pub const PRODUCT_AGGREGATE: &str = "catalog.product";
pub const POOL_AGGREGATE: &str = "pools.pool";

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Transition rejected by the status graph or the role gate.
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invariant violated: {0}")]
    Invariant(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found")]
    NotFound,
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for WorkflowError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                WorkflowError::Validation(msg)
            }
            DomainError::InvariantViolation(msg) => WorkflowError::Invariant(msg),
            DomainError::Conflict(msg) => WorkflowError::Conflict(msg),
            DomainError::NotFound => WorkflowError::NotFound,
            DomainError::Unauthorized => WorkflowError::Invariant("unauthorized".to_string()),
        }
    }
}

impl From<DispatchError> for WorkflowError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Validation(msg) => WorkflowError::Validation(msg),
            DispatchError::InvariantViolation(msg) => WorkflowError::Invariant(msg),
            DispatchError::Concurrency(msg) => WorkflowError::Conflict(msg),
            DispatchError::NotFound => WorkflowError::NotFound,
            DispatchError::Unauthorized => WorkflowError::Invariant("unauthorized".to_string()),
            DispatchError::TenantIsolation(msg) => WorkflowError::Invariant(msg),
            DispatchError::Deserialize(msg) => WorkflowError::Internal(msg),
            DispatchError::Store(e) => WorkflowError::Internal(e.to_string()),
            DispatchError::Publish(msg) => WorkflowError::Internal(msg),
        }
    }
}

/// The outcome of a successful status update.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    /// The order after the transition (and any cascade) applied.
    pub order: Order,
    /// Pool joined or opened by this transition, if any.
    pub pool_id: Option<PoolId>,
    /// Orders advanced `Pooling -> Processing` because the pool filled.
    pub advanced_orders: Vec<OrderId>,
}

/// Application service that owns order lifecycle writes.
pub struct OrderWorkflow<S, B, N> {
    dispatcher: CommandDispatcher<S, B>,
    notifier: N,
    // Serializes status transitions so preflight checks stay valid until the
    // corresponding appends complete.
    transition_gate: Mutex<()>,
}

impl<S, B, N> OrderWorkflow<S, B, N>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    N: NotificationSink,
{
    pub fn new(store: S, bus: B, notifier: N) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            notifier,
            transition_gate: Mutex::new(()),
        }
    }

    // ---- order lifecycle ----------------------------------------------

    pub fn create_order(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
        buyer: UserId,
        draft: bool,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        self.dispatch_order(
            tenant_id,
            order_id,
            OrderCommand::CreateOrder(CreateOrder {
                tenant_id,
                order_id,
                buyer,
                draft,
                occurred_at: now,
            }),
        )?;
        info!(%tenant_id, %order_id, draft, "order created");
        Ok(())
    }

    pub fn add_item(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
        item: OrderItem,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        self.dispatch_order(
            tenant_id,
            order_id,
            OrderCommand::AddItem(AddItem {
                tenant_id,
                order_id,
                item,
                occurred_at: now,
            }),
        )?;
        Ok(())
    }

    pub fn delete_order(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        let _gate = self.lock_gate()?;
        self.dispatch_order(
            tenant_id,
            order_id,
            OrderCommand::DeleteOrder(DeleteOrder {
                tenant_id,
                order_id,
                actor,
                occurred_at: now,
            }),
        )?;
        info!(%tenant_id, %order_id, "order deleted");
        Ok(())
    }

    pub fn get_order(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Order, WorkflowError> {
        let order = self.rehydrate_order(tenant_id, order_id)?;
        if !order.exists() {
            return Err(WorkflowError::NotFound);
        }
        Ok(order)
    }

    /// Targets the given role could move this order to right now.
    pub fn allowed_transitions(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
        role: Role,
    ) -> Result<Vec<OrderStatus>, WorkflowError> {
        let order = self.get_order(tenant_id, order_id)?;
        Ok(depot_orders::allowed_targets(order.status(), role))
    }

    // ---- catalog passthroughs -----------------------------------------

    pub fn create_product(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        sku: String,
        name: String,
        min_order_quantity: i64,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        self.dispatch_product(
            tenant_id,
            product_id,
            ProductCommand::CreateProduct(CreateProduct {
                tenant_id,
                product_id,
                sku,
                name,
                min_order_quantity,
                occurred_at: now,
            }),
        )?;
        Ok(())
    }

    pub fn receive_stock(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        self.dispatch_product(
            tenant_id,
            product_id,
            ProductCommand::ReceiveStock(ReceiveStock {
                tenant_id,
                product_id,
                quantity,
                occurred_at: now,
            }),
        )?;
        Ok(())
    }

    pub fn get_product(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Product, WorkflowError> {
        let product = self.rehydrate_product(tenant_id, product_id)?;
        if !product.exists() {
            return Err(WorkflowError::NotFound);
        }
        Ok(product)
    }

    pub fn get_pool(&self, tenant_id: TenantId, pool_id: PoolId) -> Result<Pool, WorkflowError> {
        let pool = self.rehydrate_pool(tenant_id, pool_id)?;
        if !pool.exists() {
            return Err(WorkflowError::NotFound);
        }
        Ok(pool)
    }

    /// Freeze joins on an open pool. Members may still leave, so pooling
    /// orders in a locked pool remain cancellable.
    pub fn lock_pool(
        &self,
        tenant_id: TenantId,
        pool_id: PoolId,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        let _gate = self.lock_gate()?;
        let pool = self.rehydrate_pool(tenant_id, pool_id)?;
        if !pool.exists() {
            return Err(WorkflowError::NotFound);
        }
        self.dispatch_pool(
            tenant_id,
            pool_id,
            PoolCommand::LockPool(LockPool {
                tenant_id,
                pool_id,
                actor,
                occurred_at: now,
            }),
        )?;
        info!(%tenant_id, %pool_id, actor = %actor, "pool locked");
        Ok(())
    }

    // ---- the transition write path ------------------------------------

    /// Move an order to `target`, executing every side effect of the edge.
    pub fn update_order_status(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
        target: OrderStatus,
        actor: UserId,
        role: Role,
        metadata: TransitionMetadata,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let _gate = self.lock_gate()?;

        let order = self.rehydrate_order(tenant_id, order_id)?;
        if !order.exists() {
            return Err(WorkflowError::Transition(TransitionError::NotFound));
        }
        let from = order.status();
        validate_transition(from, target, role)?;

        let outcome = match target {
            OrderStatus::Pooling => {
                self.transition_into_pooling(tenant_id, &order, actor, role, metadata, now)?
            }
            OrderStatus::Processing => {
                self.transition_into_processing(tenant_id, &order, actor, role, metadata, now)?
            }
            OrderStatus::Cancelled => {
                self.transition_into_cancelled(tenant_id, &order, actor, role, metadata, now)?
            }
            OrderStatus::Refunded => {
                self.transition_with_release(tenant_id, &order, target, actor, role, metadata, now)?
            }
            _ => self.plain_transition(tenant_id, &order, target, actor, role, metadata, now)?,
        };

        info!(
            %tenant_id,
            %order_id,
            from = %from,
            to = %target,
            actor = %actor,
            role = %role,
            "order status changed"
        );

        self.send_status_notification(tenant_id, &outcome.order, from, target);
        Ok(outcome)
    }

    /// No side effects beyond the status change itself.
    fn plain_transition(
        &self,
        tenant_id: TenantId,
        order: &Order,
        target: OrderStatus,
        actor: UserId,
        role: Role,
        metadata: TransitionMetadata,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let cmd = ChangeStatus {
            tenant_id,
            order_id: order.id_typed(),
            target,
            actor,
            role,
            metadata,
            occurred_at: now,
        };
        // Preflight on the rehydrated copy, then append.
        order.handle(&OrderCommand::ChangeStatus(cmd.clone()))?;
        self.dispatch_order(tenant_id, order.id_typed(), OrderCommand::ChangeStatus(cmd))?;

        Ok(TransitionOutcome {
            order: self.rehydrate_order(tenant_id, order.id_typed())?,
            pool_id: None,
            advanced_orders: vec![],
        })
    }

    fn transition_into_processing(
        &self,
        tenant_id: TenantId,
        order: &Order,
        actor: UserId,
        role: Role,
        metadata: TransitionMetadata,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let reservations: Vec<(ProductId, i64)> = order
            .items()
            .iter()
            .map(|item| (item.product_id, item.quantity))
            .collect();
        if reservations.is_empty() {
            return Err(WorkflowError::Invariant(
                "order has no items to process".to_string(),
            ));
        }

        // A pooling order moved to processing by hand leaves its open pool.
        let leave = self.plan_pool_leave(tenant_id, order)?;

        self.preflight_reservations(tenant_id, &reservations)?;

        let cmd = ChangeStatus {
            tenant_id,
            order_id: order.id_typed(),
            target: OrderStatus::Processing,
            actor,
            role,
            metadata,
            occurred_at: now,
        };
        order.handle(&OrderCommand::ChangeStatus(cmd.clone()))?;

        if let Some(pool_id) = leave {
            self.dispatch_pool(
                tenant_id,
                pool_id,
                PoolCommand::LeavePool(LeavePool {
                    tenant_id,
                    pool_id,
                    order_id: order.id_typed(),
                    occurred_at: now,
                }),
            )?;
        }
        self.dispatch_reservations(tenant_id, &reservations, now)?;
        self.dispatch_order(tenant_id, order.id_typed(), OrderCommand::ChangeStatus(cmd))?;

        Ok(TransitionOutcome {
            order: self.rehydrate_order(tenant_id, order.id_typed())?,
            pool_id: None,
            advanced_orders: vec![],
        })
    }

    fn transition_into_cancelled(
        &self,
        tenant_id: TenantId,
        order: &Order,
        actor: UserId,
        role: Role,
        metadata: TransitionMetadata,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        match order.status() {
            OrderStatus::Pooling => {
                let pool_id = self
                    .plan_pool_leave(tenant_id, order)?
                    .ok_or_else(|| {
                        WorkflowError::Invariant(
                            "pooling order cannot be cancelled once its pool completed".to_string(),
                        )
                    })?;

                let cmd = ChangeStatus {
                    tenant_id,
                    order_id: order.id_typed(),
                    target: OrderStatus::Cancelled,
                    actor,
                    role,
                    metadata,
                    occurred_at: now,
                };
                order.handle(&OrderCommand::ChangeStatus(cmd.clone()))?;

                self.dispatch_pool(
                    tenant_id,
                    pool_id,
                    PoolCommand::LeavePool(LeavePool {
                        tenant_id,
                        pool_id,
                        order_id: order.id_typed(),
                        occurred_at: now,
                    }),
                )?;
                self.dispatch_order(tenant_id, order.id_typed(), OrderCommand::ChangeStatus(cmd))?;

                Ok(TransitionOutcome {
                    order: self.rehydrate_order(tenant_id, order.id_typed())?,
                    pool_id: None,
                    advanced_orders: vec![],
                })
            }
            // Stock was reserved when the order entered processing.
            OrderStatus::Processing | OrderStatus::Confirmed => self.transition_with_release(
                tenant_id,
                order,
                OrderStatus::Cancelled,
                actor,
                role,
                metadata,
                now,
            ),
            _ => self.plain_transition(
                tenant_id,
                order,
                OrderStatus::Cancelled,
                actor,
                role,
                metadata,
                now,
            ),
        }
    }

    /// Status change plus a stock release for every line.
    fn transition_with_release(
        &self,
        tenant_id: TenantId,
        order: &Order,
        target: OrderStatus,
        actor: UserId,
        role: Role,
        metadata: TransitionMetadata,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let releases: Vec<(ProductId, i64)> = order
            .items()
            .iter()
            .map(|item| (item.product_id, item.quantity))
            .collect();

        self.preflight_releases(tenant_id, &releases)?;

        let cmd = ChangeStatus {
            tenant_id,
            order_id: order.id_typed(),
            target,
            actor,
            role,
            metadata,
            occurred_at: now,
        };
        order.handle(&OrderCommand::ChangeStatus(cmd.clone()))?;

        for (product_id, quantity) in &releases {
            self.dispatch_product(
                tenant_id,
                *product_id,
                ProductCommand::ReleaseStock(ReleaseStock {
                    tenant_id,
                    product_id: *product_id,
                    quantity: *quantity,
                    occurred_at: now,
                }),
            )?;
        }
        self.dispatch_order(tenant_id, order.id_typed(), OrderCommand::ChangeStatus(cmd))?;

        Ok(TransitionOutcome {
            order: self.rehydrate_order(tenant_id, order.id_typed())?,
            pool_id: None,
            advanced_orders: vec![],
        })
    }

    fn transition_into_pooling(
        &self,
        tenant_id: TenantId,
        order: &Order,
        actor: UserId,
        role: Role,
        metadata: TransitionMetadata,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        if order.items().len() != 1 {
            return Err(WorkflowError::Invariant(
                "pooling requires an order with exactly one item".to_string(),
            ));
        }
        let item = &order.items()[0];
        let product = self.get_product(tenant_id, item.product_id)?;

        // Resolve the pool: join an existing one, or open one for the product.
        let (pool_id, open_cmd) = match metadata.pool_id {
            Some(raw) => {
                let pool_id = PoolId::new(raw);
                let pool = self.get_pool(tenant_id, pool_id)?;
                if pool.product_id() != Some(item.product_id) {
                    return Err(WorkflowError::Invariant(
                        "pool is for a different product".to_string(),
                    ));
                }
                (pool_id, None)
            }
            None => {
                let pool_id = PoolId::new(AggregateId::new());
                let target_quantity = metadata
                    .target_quantity
                    .unwrap_or_else(|| product.min_order_quantity());
                (
                    pool_id,
                    Some(OpenPool {
                        tenant_id,
                        pool_id,
                        product_id: item.product_id,
                        target_quantity,
                        expires_at: metadata.expires_at,
                        occurred_at: now,
                    }),
                )
            }
        };

        // Preflight the join on a scratch copy; this also tells us whether
        // the pool completes.
        let mut scratch = self.rehydrate_pool(tenant_id, pool_id)?;
        if let Some(open) = &open_cmd {
            let events = scratch.handle(&PoolCommand::OpenPool(open.clone()))?;
            for event in &events {
                scratch.apply(event);
            }
        }
        let join = JoinPool {
            tenant_id,
            pool_id,
            order_id: order.id_typed(),
            buyer: order.buyer().ok_or_else(|| {
                WorkflowError::Internal("created order has no buyer".to_string())
            })?,
            quantity: item.quantity,
            occurred_at: now,
        };
        let join_events = scratch.handle(&PoolCommand::JoinPool(join.clone()))?;
        let completion = join_events.iter().find_map(|e| match e {
            PoolEvent::PoolCompleted(c) => Some(c.clone()),
            _ => None,
        });

        // Preflight the order's own transition with the pool reference filled.
        let mut pooled_metadata = metadata;
        pooled_metadata.pool_id = Some(pool_id.0);
        let cmd = ChangeStatus {
            tenant_id,
            order_id: order.id_typed(),
            target: OrderStatus::Pooling,
            actor,
            role,
            metadata: pooled_metadata,
            occurred_at: now,
        };
        order.handle(&OrderCommand::ChangeStatus(cmd.clone()))?;

        // A filling join advances every participant to processing, which
        // reserves stock for each of them. Validate all of it up front.
        let mut cascade: Vec<(Order, OrderItem)> = vec![];
        if let Some(completed) = &completion {
            for participant in &completed.participants {
                let member_order = if *participant == order.id_typed() {
                    let mut this = order.clone();
                    for event in order.handle(&OrderCommand::ChangeStatus(cmd.clone()))? {
                        this.apply(&event);
                    }
                    this
                } else {
                    self.get_order(tenant_id, *participant)?
                };
                if member_order.status() != OrderStatus::Pooling {
                    return Err(WorkflowError::Invariant(format!(
                        "pool participant {participant} is not pooling"
                    )));
                }
                let member_item = member_order
                    .items()
                    .first()
                    .cloned()
                    .ok_or_else(|| {
                        WorkflowError::Invariant(format!(
                            "pool participant {participant} has no items"
                        ))
                    })?;
                cascade.push((member_order, member_item));
            }

            let reservations: Vec<(ProductId, i64)> = cascade
                .iter()
                .map(|(_, item)| (item.product_id, item.quantity))
                .collect();
            self.preflight_reservations(tenant_id, &reservations)?;
        }

        // Everything validated; append.
        if let Some(open) = open_cmd {
            self.dispatch_pool(tenant_id, pool_id, PoolCommand::OpenPool(open))?;
        }
        self.dispatch_order(tenant_id, order.id_typed(), OrderCommand::ChangeStatus(cmd))?;
        self.dispatch_pool(tenant_id, pool_id, PoolCommand::JoinPool(join))?;

        let mut advanced = vec![];
        if let Some(completed) = &completion {
            for (member_order, member_item) in &cascade {
                self.dispatch_reservations(
                    tenant_id,
                    &[(member_item.product_id, member_item.quantity)],
                    now,
                )?;
                let advance = ChangeStatus {
                    tenant_id,
                    order_id: member_order.id_typed(),
                    target: OrderStatus::Processing,
                    actor,
                    // System-driven edge; the buyer's own role cannot take it.
                    role: Role::SuperAdmin,
                    metadata: TransitionMetadata {
                        note: Some("Pool completed".to_string()),
                        ..Default::default()
                    },
                    occurred_at: now,
                };
                self.dispatch_order(
                    tenant_id,
                    member_order.id_typed(),
                    OrderCommand::ChangeStatus(advance),
                )?;
                advanced.push(member_order.id_typed());

                self.send_status_notification(
                    tenant_id,
                    member_order,
                    OrderStatus::Pooling,
                    OrderStatus::Processing,
                );
            }

            let participants = cascade
                .iter()
                .filter_map(|(o, _)| o.buyer().map(|b| (o.id_typed(), b)))
                .collect();
            if let Err(e) = self.notifier.notify_pool_completed(PoolCompletedNotification {
                tenant_id,
                pool_id,
                total_quantity: completed.total_quantity,
                participants,
            }) {
                warn!(%tenant_id, %pool_id, error = %e, "pool completion notification failed");
            }
            info!(%tenant_id, %pool_id, participants = advanced.len(), "pool completed");
        }

        Ok(TransitionOutcome {
            order: self.rehydrate_order(tenant_id, order.id_typed())?,
            pool_id: Some(pool_id),
            advanced_orders: advanced,
        })
    }

    // ---- helpers ------------------------------------------------------

    fn lock_gate(&self) -> Result<std::sync::MutexGuard<'_, ()>, WorkflowError> {
        self.transition_gate
            .lock()
            .map_err(|_| WorkflowError::Internal("transition gate poisoned".to_string()))
    }

    /// If the order sits in an open pool it is a member of, return that pool.
    fn plan_pool_leave(
        &self,
        tenant_id: TenantId,
        order: &Order,
    ) -> Result<Option<PoolId>, WorkflowError> {
        if order.status() != OrderStatus::Pooling {
            return Ok(None);
        }
        let Some(raw) = order.pool_id() else {
            return Ok(None);
        };
        let pool_id = PoolId::new(raw);
        let pool = self.rehydrate_pool(tenant_id, pool_id)?;
        if !pool.exists() || pool.status() == PoolStatus::Completed {
            return Ok(None);
        }
        if !pool
            .members()
            .iter()
            .any(|m| m.order_id == order.id_typed())
        {
            return Ok(None);
        }
        Ok(Some(pool_id))
    }

    /// Simulate the reservations against current product state; grouping by
    /// product catches multi-line totals exceeding a single product's stock.
    fn preflight_reservations(
        &self,
        tenant_id: TenantId,
        reservations: &[(ProductId, i64)],
    ) -> Result<(), WorkflowError> {
        let mut totals: HashMap<ProductId, i64> = HashMap::new();
        for (product_id, quantity) in reservations {
            *totals.entry(*product_id).or_insert(0) += quantity;
        }
        for (product_id, total) in totals {
            let product = self.get_product(tenant_id, product_id)?;
            product.handle(&ProductCommand::ReserveStock(ReserveStock {
                tenant_id,
                product_id,
                quantity: total,
                occurred_at: Utc::now(),
            }))?;
        }
        Ok(())
    }

    fn preflight_releases(
        &self,
        tenant_id: TenantId,
        releases: &[(ProductId, i64)],
    ) -> Result<(), WorkflowError> {
        let mut totals: HashMap<ProductId, i64> = HashMap::new();
        for (product_id, quantity) in releases {
            *totals.entry(*product_id).or_insert(0) += quantity;
        }
        for (product_id, total) in totals {
            let product = self.get_product(tenant_id, product_id)?;
            product.handle(&ProductCommand::ReleaseStock(ReleaseStock {
                tenant_id,
                product_id,
                quantity: total,
                occurred_at: Utc::now(),
            }))?;
        }
        Ok(())
    }

    fn dispatch_reservations(
        &self,
        tenant_id: TenantId,
        reservations: &[(ProductId, i64)],
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        for (product_id, quantity) in reservations {
            self.dispatch_product(
                tenant_id,
                *product_id,
                ProductCommand::ReserveStock(ReserveStock {
                    tenant_id,
                    product_id: *product_id,
                    quantity: *quantity,
                    occurred_at: now,
                }),
            )?;
        }
        Ok(())
    }

    fn send_status_notification(
        &self,
        tenant_id: TenantId,
        order: &Order,
        from: OrderStatus,
        to: OrderStatus,
    ) {
        let Some(buyer) = order.buyer() else {
            return;
        };
        let notification = OrderStatusNotification {
            tenant_id,
            recipient: buyer,
            order_id: order.id_typed(),
            from,
            to,
            note: format!("Status changed from {from} to {to}"),
        };
        if let Err(e) = self.notifier.notify_order_status_change(notification) {
            warn!(%tenant_id, order_id = %order.id_typed(), error = %e,
                "status change notification failed");
        }
    }

    fn rehydrate_order(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
    ) -> Result<Order, WorkflowError> {
        Ok(self
            .dispatcher
            .rehydrate(tenant_id, order_id.0, |_, _| Order::empty(order_id))?)
    }

    fn rehydrate_product(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Product, WorkflowError> {
        Ok(self
            .dispatcher
            .rehydrate(tenant_id, product_id.0, |_, _| Product::empty(product_id))?)
    }

    fn rehydrate_pool(&self, tenant_id: TenantId, pool_id: PoolId) -> Result<Pool, WorkflowError> {
        Ok(self
            .dispatcher
            .rehydrate(tenant_id, pool_id.0, |_, _| Pool::empty(pool_id))?)
    }

    fn dispatch_order(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
        command: OrderCommand,
    ) -> Result<(), WorkflowError> {
        self.dispatcher
            .dispatch::<Order>(tenant_id, order_id.0, ORDER_AGGREGATE, command, |_, _| {
                Order::empty(order_id)
            })?;
        Ok(())
    }

    fn dispatch_product(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        command: ProductCommand,
    ) -> Result<(), WorkflowError> {
        self.dispatcher.dispatch::<Product>(
            tenant_id,
            product_id.0,
            PRODUCT_AGGREGATE,
            command,
            |_, _| Product::empty(product_id),
        )?;
        Ok(())
    }

    fn dispatch_pool(
        &self,
        tenant_id: TenantId,
        pool_id: PoolId,
        command: PoolCommand,
    ) -> Result<(), WorkflowError> {
        self.dispatcher
            .dispatch::<Pool>(tenant_id, pool_id.0, POOL_AGGREGATE, command, |_, _| {
                Pool::empty(pool_id)
            })?;
        Ok(())
    }
}
