use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use depot_auth::Permission;
use depot_core::{AggregateId, UserId};
use depot_pools::PoolId;

use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_pools))
        .route("/:id", get(get_pool))
        .route("/:id/lock", post(lock_pool))
}

pub async fn get_pool(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid pool id"),
    };
    match services.pools_get(tenant.tenant_id(), &PoolId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::pool_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "pool not found"),
    }
}

/// Freeze joins on a pool; members may still leave.
pub async fn lock_pool(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid pool id"),
    };

    let cmd_auth = CmdAuth {
        inner: (),
        required: vec![Permission::new("pools.lock")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let actor = UserId::from_uuid(*principal.principal_id().as_uuid());
    if let Err(e) = services
        .workflow()
        .lock_pool(tenant.tenant_id(), PoolId::new(agg), actor, Utc::now())
    {
        return errors::workflow_error_to_response(e);
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({"id": agg.to_string(), "status": "LOCKED"})),
    )
        .into_response()
}

pub async fn list_pools(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    let items = services
        .pools_list(tenant.tenant_id())
        .into_iter()
        .map(dto::pool_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
