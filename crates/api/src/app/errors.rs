use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stocklink_infra::SyncError;

pub fn sync_error_to_response(err: SyncError) -> axum::response::Response {
    match err {
        SyncError::Authentication(msg) => json_error(StatusCode::UNAUTHORIZED, "unauthorized", msg),
        SyncError::MalformedPayload(msg) => json_error(StatusCode::BAD_REQUEST, "malformed_payload", msg),
        SyncError::Domain(e) => json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()),
        other => {
            tracing::error!(error = %other, "request failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
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
