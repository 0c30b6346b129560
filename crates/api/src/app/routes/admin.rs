use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::json;

use stocklink_infra::SyncError;
use stocklink_infra::lock::LockOutcome;

use crate::app::AppState;
use crate::app::dto::ReconcileRequest;
use crate::app::errors::sync_error_to_response;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new().route("/reconcile", post(reconcile))
}

/// Re-derive every child of `master_id` from the master's current quantity.
///
/// Runs the pass inline; if one is already running for the group the
/// request is merged into it and `coalesced` is returned.
async fn reconcile(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<ReconcileRequest>,
) -> Response {
    let (master_id, location_id) = match body.into_ids() {
        Ok(ids) => ids,
        Err(e) => return sync_error_to_response(SyncError::Domain(e)),
    };

    let outcome = state
        .services
        .engine
        .reconcile_manual(tenant.tenant_id(), master_id, location_id)
        .await;

    let body = match outcome {
        LockOutcome::Ran { passes } => json!({ "outcome": "ran", "passes": passes }),
        LockOutcome::Coalesced => json!({ "outcome": "coalesced", "passes": 0 }),
    };
    (StatusCode::ACCEPTED, Json(body)).into_response()
}
