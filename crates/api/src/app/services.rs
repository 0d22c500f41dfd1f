use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};

use depot_catalog::ProductId;
use depot_core::TenantId;
use depot_events::{EventBus, EventEnvelope, InMemoryEventBus};
use depot_infra::{
    event_store::InMemoryEventStore,
    notify::{NotificationSink, OrderStatusNotification, PoolCompletedNotification},
    projections::{
        OrderHistoryProjection, OrderHistoryReadModel, OrderReadModel, OrdersProjection,
        PoolReadModel, PoolsProjection, ProductStockProjection, ProductStockReadModel,
    },
    read_model::InMemoryTenantStore,
    workflow::OrderWorkflow,
};
use depot_orders::OrderId;
use depot_pools::PoolId;

/// Realtime message broadcasted via SSE.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RealtimeMessage {
    pub tenant_id: TenantId,
    pub topic: String,
    pub payload: serde_json::Value,
}

/// API-local notification sink that pushes order/pool notifications onto the
/// realtime channel (lossy; no backpressure on the workflow).
#[derive(Debug)]
pub struct RealtimeNotificationSink {
    realtime_tx: broadcast::Sender<RealtimeMessage>,
}

impl RealtimeNotificationSink {
    pub fn new(realtime_tx: broadcast::Sender<RealtimeMessage>) -> Self {
        Self { realtime_tx }
    }
}

impl NotificationSink for RealtimeNotificationSink {
    fn notify_order_status_change(
        &self,
        notification: OrderStatusNotification,
    ) -> Result<(), String> {
        let _ = self.realtime_tx.send(RealtimeMessage {
            tenant_id: notification.tenant_id,
            topic: "orders.status_notification".to_string(),
            payload: serde_json::json!({
                "kind": "order_status_notification",
                "recipient": notification.recipient.to_string(),
                "order_id": notification.order_id.0.to_string(),
                "from": notification.from.as_str(),
                "to": notification.to.as_str(),
                "note": notification.note,
            }),
        });
        Ok(())
    }

    fn notify_pool_completed(
        &self,
        notification: PoolCompletedNotification,
    ) -> Result<(), String> {
        let _ = self.realtime_tx.send(RealtimeMessage {
            tenant_id: notification.tenant_id,
            topic: "pools.pool_completed".to_string(),
            payload: serde_json::json!({
                "kind": "pool_completed_notification",
                "pool_id": notification.pool_id.0.to_string(),
                "total_quantity": notification.total_quantity,
                "participants": notification
                    .participants
                    .iter()
                    .map(|(order_id, buyer)| serde_json::json!({
                        "order_id": order_id.0.to_string(),
                        "buyer": buyer.to_string(),
                    }))
                    .collect::<Vec<_>>(),
            }),
        });
        Ok(())
    }
}

type Bus = Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>;
type Workflow = OrderWorkflow<Arc<InMemoryEventStore>, Bus, Arc<RealtimeNotificationSink>>;

type OrdersView = OrdersProjection<Arc<InMemoryTenantStore<OrderId, OrderReadModel>>>;
type HistoryView = OrderHistoryProjection<Arc<InMemoryTenantStore<OrderId, OrderHistoryReadModel>>>;
type PoolsView = PoolsProjection<Arc<InMemoryTenantStore<PoolId, PoolReadModel>>>;
type StockView = ProductStockProjection<Arc<InMemoryTenantStore<ProductId, ProductStockReadModel>>>;

pub struct AppServices {
    workflow: Arc<Workflow>,
    orders_projection: Arc<OrdersView>,
    history_projection: Arc<HistoryView>,
    pools_projection: Arc<PoolsView>,
    stock_projection: Arc<StockView>,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
}

/// Wire the in-memory stack: store + bus + workflow + projections, plus the
/// background subscriber feeding the projections from the bus.
pub fn build_services() -> AppServices {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());

    let orders_projection: Arc<OrdersView> =
        Arc::new(OrdersProjection::new(Arc::new(InMemoryTenantStore::new())));
    let history_projection: Arc<HistoryView> = Arc::new(OrderHistoryProjection::new(Arc::new(
        InMemoryTenantStore::new(),
    )));
    let pools_projection: Arc<PoolsView> =
        Arc::new(PoolsProjection::new(Arc::new(InMemoryTenantStore::new())));
    let stock_projection: Arc<StockView> = Arc::new(ProductStockProjection::new(Arc::new(
        InMemoryTenantStore::new(),
    )));

    // Realtime channel (SSE): lossy broadcast, tenant-filtered in handlers.
    let (realtime_tx, _realtime_rx) = broadcast::channel::<RealtimeMessage>(256);

    // Background subscriber: bus -> projections -> realtime.
    {
        let sub = bus.subscribe();
        let orders_projection = orders_projection.clone();
        let history_projection = history_projection.clone();
        let pools_projection = pools_projection.clone();
        let stock_projection = stock_projection.clone();
        let realtime_tx = realtime_tx.clone();
        tokio::task::spawn_blocking(move || loop {
            match sub.recv() {
                Ok(env) => {
                    let at = env.aggregate_type().to_string();

                    let apply_ok = match at.as_str() {
                        "orders.order" => {
                            if let Err(e) = orders_projection.apply_envelope(&env) {
                                Err(e.to_string())
                            } else if let Err(e) = history_projection.apply_envelope(&env) {
                                Err(e.to_string())
                            } else {
                                Ok(())
                            }
                        }
                        "pools.pool" => {
                            pools_projection.apply_envelope(&env).map_err(|e| e.to_string())
                        }
                        "catalog.product" => {
                            stock_projection.apply_envelope(&env).map_err(|e| e.to_string())
                        }
                        _ => Ok(()),
                    };

                    if let Err(e) = apply_ok {
                        tracing::warn!("projection apply failed: {e}");
                        continue;
                    }

                    // Broadcast projection update (lossy; no backpressure on core).
                    let _ = realtime_tx.send(RealtimeMessage {
                        tenant_id: env.tenant_id(),
                        topic: format!("{at}.projection_updated"),
                        payload: serde_json::json!({
                            "kind": "projection_update",
                            "aggregate_type": at,
                            "aggregate_id": env.aggregate_id().to_string(),
                            "sequence_number": env.sequence_number(),
                        }),
                    });
                }
                Err(_) => break,
            }
        });
    }

    let notifier = Arc::new(RealtimeNotificationSink::new(realtime_tx.clone()));
    let workflow = Arc::new(OrderWorkflow::new(store, bus, notifier));

    AppServices {
        workflow,
        orders_projection,
        history_projection,
        pools_projection,
        stock_projection,
        realtime_tx,
    }
}

impl AppServices {
    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn realtime_tx(&self) -> &broadcast::Sender<RealtimeMessage> {
        &self.realtime_tx
    }

    pub fn orders_get(&self, tenant_id: TenantId, order_id: &OrderId) -> Option<OrderReadModel> {
        self.orders_projection.get(tenant_id, order_id)
    }

    pub fn orders_list(&self, tenant_id: TenantId) -> Vec<OrderReadModel> {
        self.orders_projection.list(tenant_id)
    }

    pub fn history_get(
        &self,
        tenant_id: TenantId,
        order_id: &OrderId,
    ) -> Option<OrderHistoryReadModel> {
        self.history_projection.get(tenant_id, order_id)
    }

    pub fn pools_get(&self, tenant_id: TenantId, pool_id: &PoolId) -> Option<PoolReadModel> {
        self.pools_projection.get(tenant_id, pool_id)
    }

    pub fn pools_list(&self, tenant_id: TenantId) -> Vec<PoolReadModel> {
        self.pools_projection.list(tenant_id)
    }

    pub fn products_get(
        &self,
        tenant_id: TenantId,
        product_id: &ProductId,
    ) -> Option<ProductStockReadModel> {
        self.stock_projection.get(tenant_id, product_id)
    }

    pub fn products_list(&self, tenant_id: TenantId) -> Vec<ProductStockReadModel> {
        self.stock_projection.list(tenant_id)
    }
}

/// Build an SSE stream for a tenant (used by `/stream`).
pub fn tenant_sse_stream(
    services: Arc<AppServices>,
    tenant_id: TenantId,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(m) if m.tenant_id == tenant_id => {
            let data = serde_json::to_string(&m.payload).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(m.topic).data(data)))
        }
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
