use axum::{
    Json, Router,
    body::Bytes,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use chrono::Utc;
use serde_json::json;

use stocklink_events::Notification;
use stocklink_infra::SyncError;

use crate::app::AppState;
use crate::app::dto::InventoryWebhook;
use crate::app::errors::sync_error_to_response;
use crate::context::TenantContext;
use crate::signature::SIGNATURE_HEADER;

pub fn router() -> Router {
    Router::new().route("/inventory", post(inventory_changed))
}

/// Inbound "inventory level changed" delivery.
///
/// Signature first (401), then tenant and body (400); only a validated
/// notification reaches the pipeline. Always acknowledged with the intake outcome.
async fn inventory_changed(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match accept(&state, &headers, &body).await {
        Ok(response) => response,
        Err(e) => sync_error_to_response(e),
    }
}

async fn accept(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<Response, SyncError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    state.signature.verify(body, signature)?;

    let tenant = TenantContext::from_headers(headers)?;

    let payload: InventoryWebhook = serde_json::from_slice(body)
        .map_err(|e| SyncError::MalformedPayload(e.to_string()))?;
    let event = payload.into_event(Utc::now())?;

    let outcome = state
        .services
        .pipeline
        .ingest(Notification::new(tenant.tenant_id(), event))
        .await;
    tracing::debug!(tenant = %tenant.tenant_id(), outcome = outcome.as_str(), "webhook accepted");

    Ok((StatusCode::OK, Json(json!({ "outcome": outcome.as_str() }))).into_response())
}
