use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use inspectra_infra::AccessError;

/// Denials are expected outcomes and carry their details; anything else is an
/// internal fault and stays opaque to the caller.
pub fn access_error_to_response(err: &AccessError) -> axum::response::Response {
    match err.denial() {
        Some(denial) => (
            StatusCode::FORBIDDEN,
            axum::Json(json!({
                "error": "access_denied",
                "message": denial.message,
                "details": denial,
            })),
        )
            .into_response(),
        None => internal_error(),
    }
}

pub fn internal_error() -> axum::response::Response {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
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
