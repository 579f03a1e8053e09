use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use kacaf_infra::WorkflowError;

/// Map a workflow failure to its HTTP response.
///
/// Forbidden becomes 401 for anonymous callers so clients know to log in.
pub fn workflow_error_to_response(err: WorkflowError, anonymous: bool) -> axum::response::Response {
    match err {
        WorkflowError::Forbidden(reason) if anonymous => json_error(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            format!("authentication required ({reason})"),
        ),
        WorkflowError::Forbidden(reason) => {
            json_error(StatusCode::FORBIDDEN, "forbidden", reason.as_str())
        }
        WorkflowError::InvalidState(msg) => json_error(StatusCode::CONFLICT, "invalid_state", msg),
        WorkflowError::AlreadyDecided => json_error(
            StatusCode::CONFLICT,
            "already_decided",
            "subject already carries a final decision",
        ),
        WorkflowError::NotFound(what) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
        }
        WorkflowError::ConflictingUpdate => json_error(
            StatusCode::CONFLICT,
            "conflict",
            "concurrent update; retry the request",
        ),
        WorkflowError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        WorkflowError::Store(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            e.to_string(),
        ),
        WorkflowError::Deserialize(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
    }
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
