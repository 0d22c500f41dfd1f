//! Integration tests for the full order workflow pipeline.
//!
//! Tests: Workflow → EventStore → EventBus → Projections → ReadModels
//!
//! Covers the transition side effects end to end: inventory reservation and
//! release, pool join/complete cascades, status history, and best-effort
//! notifications.

mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Utc};

    use depot_auth::Role;
    use depot_catalog::ProductId;
    use depot_core::{AggregateId, TenantId, UserId};
    use depot_events::{EventBus, EventEnvelope, InMemoryEventBus};
    use depot_orders::{OrderId, OrderItem, OrderStatus, TransitionMetadata};
    use depot_pools::PoolStatus;

    use crate::event_store::InMemoryEventStore;
    use crate::notify::InMemoryNotificationSink;
    use crate::projections::{
        OrderHistoryProjection, OrderHistoryReadModel, OrderReadModel, OrdersProjection,
        PoolReadModel, PoolsProjection, ProductStockProjection, ProductStockReadModel,
    };
    use crate::read_model::InMemoryTenantStore;
    use crate::workflow::{OrderWorkflow, WorkflowError};

    type Envelope = EventEnvelope<serde_json::Value>;
    type Bus = Arc<InMemoryEventBus<Envelope>>;

    struct Harness {
        workflow: OrderWorkflow<Arc<InMemoryEventStore>, Bus, Arc<InMemoryNotificationSink>>,
        notifier: Arc<InMemoryNotificationSink>,
        orders: Arc<OrdersProjection<Arc<InMemoryTenantStore<OrderId, OrderReadModel>>>>,
        history:
            Arc<OrderHistoryProjection<Arc<InMemoryTenantStore<OrderId, OrderHistoryReadModel>>>>,
        pools: Arc<PoolsProjection<Arc<InMemoryTenantStore<depot_pools::PoolId, PoolReadModel>>>>,
        stock:
            Arc<ProductStockProjection<Arc<InMemoryTenantStore<ProductId, ProductStockReadModel>>>>,
    }

    fn setup() -> Harness {
        let store = Arc::new(InMemoryEventStore::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let notifier = Arc::new(InMemoryNotificationSink::new());
        let workflow = OrderWorkflow::new(store, bus.clone(), notifier.clone());

        let orders = Arc::new(OrdersProjection::new(Arc::new(InMemoryTenantStore::new())));
        let history = Arc::new(OrderHistoryProjection::new(Arc::new(
            InMemoryTenantStore::new(),
        )));
        let pools = Arc::new(PoolsProjection::new(Arc::new(InMemoryTenantStore::new())));
        let stock = Arc::new(ProductStockProjection::new(Arc::new(
            InMemoryTenantStore::new(),
        )));

        // Subscribe to the bus BEFORE any events are published.
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<()>();
        {
            let bus = bus.clone();
            let orders = orders.clone();
            let history = history.clone();
            let pools = pools.clone();
            let stock = stock.clone();
            std::thread::spawn(move || {
                let sub = bus.subscribe();
                let _ = ready_tx.send(());
                while let Ok(env) = sub.recv() {
                    orders.apply_envelope(&env).expect("orders projection");
                    history.apply_envelope(&env).expect("history projection");
                    pools.apply_envelope(&env).expect("pools projection");
                    stock.apply_envelope(&env).expect("stock projection");
                }
            });
        }
        let _ = ready_rx.recv_timeout(std::time::Duration::from_secs(1));

        Harness {
            workflow,
            notifier,
            orders,
            history,
            pools,
            stock,
        }
    }

    fn wait_for_processing() {
        std::thread::sleep(std::time::Duration::from_millis(50));
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn tenant() -> TenantId {
        TenantId::new()
    }

    fn buyer() -> UserId {
        UserId::new()
    }

    /// Product with `stock` on hand and the given minimum order quantity.
    fn seed_product(h: &Harness, tenant_id: TenantId, moq: i64, stock: i64) -> ProductId {
        let product_id = ProductId::new(AggregateId::new());
        h.workflow
            .create_product(
                tenant_id,
                product_id,
                format!("SKU-{product_id}"),
                "Rebar #4".to_string(),
                moq,
                now(),
            )
            .unwrap();
        if stock > 0 {
            h.workflow
                .receive_stock(tenant_id, product_id, stock, now())
                .unwrap();
        }
        product_id
    }

    /// Pending order with a single line.
    fn seed_order(
        h: &Harness,
        tenant_id: TenantId,
        buyer: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> OrderId {
        let order_id = OrderId::new(AggregateId::new());
        h.workflow
            .create_order(tenant_id, order_id, buyer, false, now())
            .unwrap();
        h.workflow
            .add_item(
                tenant_id,
                order_id,
                OrderItem {
                    product_id,
                    quantity,
                    unit_price: 1000,
                },
                now(),
            )
            .unwrap();
        order_id
    }

    #[test]
    fn customer_cancels_pending_order_without_inventory_effect() {
        let h = setup();
        let tenant_id = tenant();
        let product_id = seed_product(&h, tenant_id, 10, 100);
        let order_id = seed_order(&h, tenant_id, buyer(), product_id, 5);

        let outcome = h
            .workflow
            .update_order_status(
                tenant_id,
                order_id,
                OrderStatus::Cancelled,
                buyer(),
                Role::Customer,
                TransitionMetadata::default(),
                now(),
            )
            .unwrap();
        assert_eq!(outcome.order.status(), OrderStatus::Cancelled);

        wait_for_processing();
        let stock = h.stock.get(tenant_id, &product_id).unwrap();
        assert_eq!(stock.current_stock, 100);
        assert_eq!(stock.reserved_stock, 0);
    }

    #[test]
    fn admin_moves_pending_to_processing_and_reserves_stock() {
        let h = setup();
        let tenant_id = tenant();
        let product_id = seed_product(&h, tenant_id, 10, 100);
        let order_id = seed_order(&h, tenant_id, buyer(), product_id, 30);

        h.workflow
            .update_order_status(
                tenant_id,
                order_id,
                OrderStatus::Processing,
                buyer(),
                Role::Admin,
                TransitionMetadata::default(),
                now(),
            )
            .unwrap();

        wait_for_processing();
        let stock = h.stock.get(tenant_id, &product_id).unwrap();
        assert_eq!(stock.current_stock, 70);
        assert_eq!(stock.reserved_stock, 30);

        let order = h.orders.get(tenant_id, &order_id).unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
    }

    #[test]
    fn customer_cannot_move_order_out_of_processing() {
        let h = setup();
        let tenant_id = tenant();
        let product_id = seed_product(&h, tenant_id, 10, 100);
        let order_id = seed_order(&h, tenant_id, buyer(), product_id, 5);
        h.workflow
            .update_order_status(
                tenant_id,
                order_id,
                OrderStatus::Processing,
                buyer(),
                Role::Admin,
                TransitionMetadata::default(),
                now(),
            )
            .unwrap();

        let err = h
            .workflow
            .update_order_status(
                tenant_id,
                order_id,
                OrderStatus::Cancelled,
                buyer(),
                Role::Customer,
                TransitionMetadata::default(),
                now(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("User does not have permission"));
    }

    #[test]
    fn delivered_order_cannot_be_reopened_even_by_admin() {
        let h = setup();
        let tenant_id = tenant();
        let product_id = seed_product(&h, tenant_id, 10, 100);
        let order_id = seed_order(&h, tenant_id, buyer(), product_id, 5);

        for (target, role) in [
            (OrderStatus::Processing, Role::Admin),
            (OrderStatus::Confirmed, Role::Supplier),
            (OrderStatus::Paid, Role::Admin),
            (OrderStatus::Shipping, Role::Supplier),
            (OrderStatus::Delivered, Role::Supplier),
        ] {
            h.workflow
                .update_order_status(
                    tenant_id,
                    order_id,
                    target,
                    buyer(),
                    role,
                    TransitionMetadata::default(),
                    now(),
                )
                .unwrap();
        }

        let err = h
            .workflow
            .update_order_status(
                tenant_id,
                order_id,
                OrderStatus::Processing,
                buyer(),
                Role::Admin,
                TransitionMetadata::default(),
                now(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("Invalid status transition"));
    }

    #[test]
    fn pool_completion_advances_all_participants() {
        let h = setup();
        let tenant_id = tenant();
        let product_id = seed_product(&h, tenant_id, 50, 200);

        let first_buyer = buyer();
        let first = seed_order(&h, tenant_id, first_buyer, product_id, 45);
        let outcome = h
            .workflow
            .update_order_status(
                tenant_id,
                first,
                OrderStatus::Pooling,
                first_buyer,
                Role::Customer,
                TransitionMetadata::default(),
                now(),
            )
            .unwrap();
        let pool_id = outcome.pool_id.unwrap();
        assert!(outcome.advanced_orders.is_empty());

        wait_for_processing();
        let pool = h.pools.get(tenant_id, &pool_id).unwrap();
        assert_eq!(pool.committed_quantity, 45);
        assert_eq!(pool.status, PoolStatus::Open);

        // Second order carries the remaining 5 units; the pool fills at 50.
        let second_buyer = buyer();
        let second = seed_order(&h, tenant_id, second_buyer, product_id, 5);
        let outcome = h
            .workflow
            .update_order_status(
                tenant_id,
                second,
                OrderStatus::Pooling,
                second_buyer,
                Role::Customer,
                TransitionMetadata {
                    pool_id: Some(pool_id.0),
                    ..Default::default()
                },
                now(),
            )
            .unwrap();
        assert_eq!(outcome.advanced_orders, vec![first, second]);

        wait_for_processing();
        let pool = h.pools.get(tenant_id, &pool_id).unwrap();
        assert_eq!(pool.committed_quantity, 50);
        assert_eq!(pool.status, PoolStatus::Completed);

        // Both orders advanced to processing, reserving their quantities.
        for order_id in [first, second] {
            assert_eq!(
                h.orders.get(tenant_id, &order_id).unwrap().status,
                OrderStatus::Processing
            );
        }
        let stock = h.stock.get(tenant_id, &product_id).unwrap();
        assert_eq!(stock.current_stock, 150);
        assert_eq!(stock.reserved_stock, 50);

        // Exactly one completion notification, naming all participants.
        let completions = h.notifier.pool_completed_notifications();
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].total_quantity, 50);
        assert_eq!(
            completions[0].participants,
            vec![(first, first_buyer), (second, second_buyer)]
        );

        // The cascade is recorded in each order's history.
        let history = h.history.get(tenant_id, &first).unwrap();
        let last = history.entries.last().unwrap();
        assert_eq!(last.to, OrderStatus::Processing);
        assert_eq!(last.note, "Pool completed");
    }

    #[test]
    fn cancelling_processing_order_releases_reserved_stock() {
        let h = setup();
        let tenant_id = tenant();
        let product_id = seed_product(&h, tenant_id, 10, 100);
        let order_id = seed_order(&h, tenant_id, buyer(), product_id, 30);

        h.workflow
            .update_order_status(
                tenant_id,
                order_id,
                OrderStatus::Processing,
                buyer(),
                Role::Admin,
                TransitionMetadata::default(),
                now(),
            )
            .unwrap();
        h.workflow
            .update_order_status(
                tenant_id,
                order_id,
                OrderStatus::Cancelled,
                buyer(),
                Role::Admin,
                TransitionMetadata::default(),
                now(),
            )
            .unwrap();

        wait_for_processing();
        let stock = h.stock.get(tenant_id, &product_id).unwrap();
        assert_eq!(stock.current_stock, 100);
        assert_eq!(stock.reserved_stock, 0);
    }

    #[test]
    fn cancelling_confirmed_order_releases_reserved_stock() {
        let h = setup();
        let tenant_id = tenant();
        let product_id = seed_product(&h, tenant_id, 10, 100);
        let order_id = seed_order(&h, tenant_id, buyer(), product_id, 30);

        for (target, role) in [
            (OrderStatus::Processing, Role::Admin),
            (OrderStatus::Confirmed, Role::Supplier),
        ] {
            h.workflow
                .update_order_status(
                    tenant_id,
                    order_id,
                    target,
                    buyer(),
                    role,
                    TransitionMetadata::default(),
                    now(),
                )
                .unwrap();
        }
        wait_for_processing();
        let stock = h.stock.get(tenant_id, &product_id).unwrap();
        assert_eq!((stock.current_stock, stock.reserved_stock), (70, 30));

        // A late cancellation must not strand the reservation.
        h.workflow
            .update_order_status(
                tenant_id,
                order_id,
                OrderStatus::Cancelled,
                buyer(),
                Role::Admin,
                TransitionMetadata::default(),
                now(),
            )
            .unwrap();

        wait_for_processing();
        let stock = h.stock.get(tenant_id, &product_id).unwrap();
        assert_eq!((stock.current_stock, stock.reserved_stock), (100, 0));
    }

    #[test]
    fn refunding_paid_order_releases_reserved_stock() {
        let h = setup();
        let tenant_id = tenant();
        let product_id = seed_product(&h, tenant_id, 10, 100);
        let order_id = seed_order(&h, tenant_id, buyer(), product_id, 30);

        for (target, role) in [
            (OrderStatus::Processing, Role::Admin),
            (OrderStatus::Confirmed, Role::Supplier),
            (OrderStatus::Paid, Role::Admin),
            (OrderStatus::Refunded, Role::Admin),
        ] {
            h.workflow
                .update_order_status(
                    tenant_id,
                    order_id,
                    target,
                    buyer(),
                    role,
                    TransitionMetadata::default(),
                    now(),
                )
                .unwrap();
        }

        wait_for_processing();
        let stock = h.stock.get(tenant_id, &product_id).unwrap();
        assert_eq!((stock.current_stock, stock.reserved_stock), (100, 0));
    }

    #[test]
    fn locked_pool_rejects_new_joins_but_members_can_cancel() {
        let h = setup();
        let tenant_id = tenant();
        let admin = buyer();
        let product_id = seed_product(&h, tenant_id, 100, 200);

        let first_buyer = buyer();
        let first = seed_order(&h, tenant_id, first_buyer, product_id, 30);
        let outcome = h
            .workflow
            .update_order_status(
                tenant_id,
                first,
                OrderStatus::Pooling,
                first_buyer,
                Role::Customer,
                TransitionMetadata::default(),
                now(),
            )
            .unwrap();
        let pool_id = outcome.pool_id.unwrap();

        h.workflow.lock_pool(tenant_id, pool_id, admin, now()).unwrap();
        wait_for_processing();
        assert_eq!(
            h.pools.get(tenant_id, &pool_id).unwrap().status,
            PoolStatus::Locked
        );

        // No new joins while locked.
        let second_buyer = buyer();
        let second = seed_order(&h, tenant_id, second_buyer, product_id, 10);
        let err = h
            .workflow
            .update_order_status(
                tenant_id,
                second,
                OrderStatus::Pooling,
                second_buyer,
                Role::Customer,
                TransitionMetadata {
                    pool_id: Some(pool_id.0),
                    ..Default::default()
                },
                now(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("locked"));

        // Existing members can still cancel out of the locked pool.
        h.workflow
            .update_order_status(
                tenant_id,
                first,
                OrderStatus::Cancelled,
                first_buyer,
                Role::Customer,
                TransitionMetadata::default(),
                now(),
            )
            .unwrap();
        wait_for_processing();
        let pool = h.pools.get(tenant_id, &pool_id).unwrap();
        assert_eq!(pool.committed_quantity, 0);
        assert!(pool.members.is_empty());
    }

    #[test]
    fn insufficient_stock_rejects_transition_without_side_effects() {
        let h = setup();
        let tenant_id = tenant();
        let product_id = seed_product(&h, tenant_id, 10, 20);
        let order_id = seed_order(&h, tenant_id, buyer(), product_id, 30);

        let err = h
            .workflow
            .update_order_status(
                tenant_id,
                order_id,
                OrderStatus::Processing,
                buyer(),
                Role::Admin,
                TransitionMetadata::default(),
                now(),
            )
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Invariant(_)));

        wait_for_processing();
        // Nothing moved: order still pending, stock untouched, no history.
        let order = h.orders.get(tenant_id, &order_id).unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        let stock = h.stock.get(tenant_id, &product_id).unwrap();
        assert_eq!(stock.current_stock, 20);
        assert_eq!(stock.reserved_stock, 0);
        assert!(h.history.get(tenant_id, &order_id).is_none());
    }

    #[test]
    fn notification_failure_does_not_fail_the_transition() {
        let h = setup();
        let tenant_id = tenant();
        let product_id = seed_product(&h, tenant_id, 10, 100);
        let order_id = seed_order(&h, tenant_id, buyer(), product_id, 5);

        h.notifier.set_failing(true);
        let outcome = h
            .workflow
            .update_order_status(
                tenant_id,
                order_id,
                OrderStatus::Processing,
                buyer(),
                Role::Admin,
                TransitionMetadata::default(),
                now(),
            )
            .unwrap();
        assert_eq!(outcome.order.status(), OrderStatus::Processing);
        assert!(h.notifier.order_status_notifications().is_empty());
    }

    #[test]
    fn cancelling_pooling_order_frees_pool_capacity() {
        let h = setup();
        let tenant_id = tenant();
        let product_id = seed_product(&h, tenant_id, 50, 200);
        let order_id = seed_order(&h, tenant_id, buyer(), product_id, 45);

        let outcome = h
            .workflow
            .update_order_status(
                tenant_id,
                order_id,
                OrderStatus::Pooling,
                buyer(),
                Role::Customer,
                TransitionMetadata::default(),
                now(),
            )
            .unwrap();
        let pool_id = outcome.pool_id.unwrap();

        h.workflow
            .update_order_status(
                tenant_id,
                order_id,
                OrderStatus::Cancelled,
                buyer(),
                Role::Customer,
                TransitionMetadata::default(),
                now(),
            )
            .unwrap();

        wait_for_processing();
        let pool = h.pools.get(tenant_id, &pool_id).unwrap();
        assert_eq!(pool.committed_quantity, 0);
        assert!(pool.members.is_empty());
        assert_eq!(pool.status, PoolStatus::Open);
    }

    #[test]
    fn history_records_every_transition_in_order() {
        let h = setup();
        let tenant_id = tenant();
        let product_id = seed_product(&h, tenant_id, 10, 100);
        let actor = buyer();
        let order_id = seed_order(&h, tenant_id, actor, product_id, 5);

        for (target, role) in [
            (OrderStatus::Processing, Role::Admin),
            (OrderStatus::Confirmed, Role::Supplier),
            (OrderStatus::Paid, Role::Admin),
        ] {
            h.workflow
                .update_order_status(
                    tenant_id,
                    order_id,
                    target,
                    actor,
                    role,
                    TransitionMetadata::default(),
                    now(),
                )
                .unwrap();
        }

        wait_for_processing();
        let history = h.history.get(tenant_id, &order_id).unwrap();
        let transitions: Vec<(OrderStatus, OrderStatus)> =
            history.entries.iter().map(|e| (e.from, e.to)).collect();
        assert_eq!(
            transitions,
            vec![
                (OrderStatus::Pending, OrderStatus::Processing),
                (OrderStatus::Processing, OrderStatus::Confirmed),
                (OrderStatus::Confirmed, OrderStatus::Paid),
            ]
        );
        // Sequence numbers strictly increase.
        let seqs: Vec<u64> = history.entries.iter().map(|e| e.sequence_number).collect();
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn tenants_are_isolated() {
        let h = setup();
        let tenant_a = tenant();
        let tenant_b = tenant();
        let product_id = seed_product(&h, tenant_a, 10, 100);
        let order_id = seed_order(&h, tenant_a, buyer(), product_id, 5);

        // Tenant B cannot see or act on tenant A's order.
        assert!(matches!(
            h.workflow.get_order(tenant_b, order_id),
            Err(WorkflowError::NotFound)
        ));
        let err = h
            .workflow
            .update_order_status(
                tenant_b,
                order_id,
                OrderStatus::Processing,
                buyer(),
                Role::Admin,
                TransitionMetadata::default(),
                now(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("order not found"));

        wait_for_processing();
        assert!(h.orders.get(tenant_b, &order_id).is_none());
        assert!(h.orders.get(tenant_a, &order_id).is_some());
    }

    #[test]
    fn draft_order_flow_and_deletion() {
        let h = setup();
        let tenant_id = tenant();
        let product_id = seed_product(&h, tenant_id, 10, 100);
        let actor = buyer();
        let order_id = OrderId::new(AggregateId::new());

        h.workflow
            .create_order(tenant_id, order_id, actor, true, now())
            .unwrap();
        h.workflow
            .add_item(
                tenant_id,
                order_id,
                OrderItem {
                    product_id,
                    quantity: 5,
                    unit_price: 1000,
                },
                now(),
            )
            .unwrap();

        // A draft can only be submitted, and deletion removes the read model.
        let targets = h
            .workflow
            .allowed_transitions(tenant_id, order_id, Role::Customer)
            .unwrap();
        assert_eq!(targets, vec![OrderStatus::Pending]);

        h.workflow
            .delete_order(tenant_id, order_id, actor, now())
            .unwrap();
        wait_for_processing();
        assert!(h.orders.get(tenant_id, &order_id).is_none());
        assert!(matches!(
            h.workflow.get_order(tenant_id, order_id),
            Err(WorkflowError::NotFound)
        ));
    }
}
