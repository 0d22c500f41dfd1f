use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use depot_infra::workflow::WorkflowError;
use depot_orders::TransitionError;

/// Map a workflow failure onto an HTTP response.
///
/// Transition rejections keep their stable codes (`INVALID_STATUS_TRANSITION`,
/// `INVALID_ROLE_TRANSITION`, ...) and their exact messages; clients match on
/// both.
pub fn workflow_error_to_response(err: WorkflowError) -> axum::response::Response {
    match err {
        WorkflowError::Transition(e) => transition_error_to_response(e),
        WorkflowError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        WorkflowError::Invariant(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        WorkflowError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        WorkflowError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        WorkflowError::Internal(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
        }
    }
}

pub fn transition_error_to_response(err: TransitionError) -> axum::response::Response {
    let status = match &err {
        TransitionError::InvalidStatus(_) => StatusCode::BAD_REQUEST,
        TransitionError::InvalidStatusTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        TransitionError::InvalidRoleTransition { .. } => StatusCode::FORBIDDEN,
        TransitionError::NotFound => StatusCode::NOT_FOUND,
    };
    json_error(status, err.code(), err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
