use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;

use depot_auth::Permission;
use depot_catalog::ProductId;
use depot_core::{AggregateId, UserId};
use depot_orders::{OrderId, OrderItem, OrderStatus};

use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/:id", get(get_order).delete(delete_order))
        .route("/:id/items", post(add_item))
        .route("/:id/status", patch(update_status))
        .route("/:id/history", get(get_history))
        .route("/:id/transitions", get(get_transitions))
}

fn actor(principal: &PrincipalContext) -> UserId {
    UserId::from_uuid(*principal.principal_id().as_uuid())
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateOrderRequest>,
) -> axum::response::Response {
    let cmd_auth = CmdAuth {
        inner: &body,
        required: vec![Permission::new("orders.create")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let mut items = Vec::with_capacity(body.items.len());
    for raw in &body.items {
        let product_agg: AggregateId = match raw.product_id.parse() {
            Ok(v) => v,
            Err(_) => {
                return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid product id")
            }
        };
        items.push(OrderItem {
            product_id: ProductId::new(product_agg),
            quantity: raw.quantity,
            unit_price: raw.unit_price,
        });
    }

    let order_id = OrderId::new(AggregateId::new());
    if let Err(e) = services.workflow().create_order(
        tenant.tenant_id(),
        order_id,
        actor(&principal),
        body.draft,
        Utc::now(),
    ) {
        return errors::workflow_error_to_response(e);
    }
    for item in items {
        if let Err(e) = services
            .workflow()
            .add_item(tenant.tenant_id(), order_id, item, Utc::now())
        {
            return errors::workflow_error_to_response(e);
        }
    }

    let status = if body.draft {
        OrderStatus::Draft
    } else {
        OrderStatus::Pending
    };
    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": order_id.0.to_string(),
            "status": status.as_str(),
        })),
    )
        .into_response()
}

pub async fn add_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AddItemRequest>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid order id"),
    };
    let product_agg: AggregateId = match body.product_id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid product id")
        }
    };

    let cmd_auth = CmdAuth {
        inner: &body,
        required: vec![Permission::new("orders.add_item")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let item = OrderItem {
        product_id: ProductId::new(product_agg),
        quantity: body.quantity,
        unit_price: body.unit_price,
    };
    if let Err(e) =
        services
            .workflow()
            .add_item(tenant.tenant_id(), OrderId::new(agg), item, Utc::now())
    {
        return errors::workflow_error_to_response(e);
    }

    (StatusCode::OK, Json(serde_json::json!({"id": agg.to_string()}))).into_response()
}

pub async fn update_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateStatusRequest>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid order id"),
    };

    let target: OrderStatus = match body.target_status.parse() {
        Ok(v) => v,
        Err(e) => return errors::transition_error_to_response(e),
    };

    let cmd_auth = CmdAuth {
        inner: &body,
        required: vec![Permission::new("orders.update_status")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let Some(role) = principal.effective_role() else {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", "token grants no role");
    };

    let outcome = match services.workflow().update_order_status(
        tenant.tenant_id(),
        OrderId::new(agg),
        target,
        actor(&principal),
        role,
        body.metadata,
        Utc::now(),
    ) {
        Ok(o) => o,
        Err(e) => return errors::workflow_error_to_response(e),
    };

    let mut payload = dto::domain_order_to_json(&outcome.order);
    if let Some(obj) = payload.as_object_mut() {
        obj.insert(
            "advanced_orders".to_string(),
            serde_json::json!(outcome
                .advanced_orders
                .iter()
                .map(|o| o.0.to_string())
                .collect::<Vec<_>>()),
        );
        if let Some(pool) = outcome.pool_id {
            obj.insert("pool_id".to_string(), serde_json::json!(pool.0.to_string()));
        }
    }
    (StatusCode::OK, Json(payload)).into_response()
}

pub async fn delete_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid order id"),
    };

    let cmd_auth = CmdAuth {
        inner: (),
        required: vec![Permission::new("orders.delete")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    if let Err(e) = services.workflow().delete_order(
        tenant.tenant_id(),
        OrderId::new(agg),
        actor(&principal),
        Utc::now(),
    ) {
        return errors::workflow_error_to_response(e);
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({"id": agg.to_string(), "deleted": true})),
    )
        .into_response()
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid order id"),
    };
    match services.orders_get(tenant.tenant_id(), &OrderId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::order_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "order not found"),
    }
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    let items = services
        .orders_list(tenant.tenant_id())
        .into_iter()
        .map(dto::order_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn get_history(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid order id"),
    };
    match services.history_get(tenant.tenant_id(), &OrderId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::history_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "order history not found"),
    }
}

/// Targets the caller's role could move the order to right now. Reads the
/// event stream directly, so it is consistent with the command path.
pub async fn get_transitions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid order id"),
    };

    let Some(role) = principal.effective_role() else {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", "token grants no role");
    };

    let order = match services
        .workflow()
        .get_order(tenant.tenant_id(), OrderId::new(agg))
    {
        Ok(o) => o,
        Err(e) => return errors::workflow_error_to_response(e),
    };

    let targets = depot_orders::allowed_targets(order.status(), role);
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "id": agg.to_string(),
            "from": order.status().as_str(),
            "role": role.as_str(),
            "targets": targets.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        })),
    )
        .into_response()
}
