//! HTTP API application wiring (Axum router).
//!
//! - `routes/`: handlers, one file per surface (webhooks, admin, system)
//! - `dto.rs`: request/response bodies
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use secrecy::{ExposeSecret, SecretString};
use tower::ServiceBuilder;

use stocklink_infra::SyncServices;

use crate::config::ServerConfig;
use crate::middleware;
use crate::signature::SignatureValidator;

pub mod dto;
pub mod errors;
pub mod routes;

/// Everything a handler needs; cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub services: SyncServices,
    pub signature: Arc<SignatureValidator>,
    pub admin_token: Option<Arc<SecretString>>,
}

impl AppState {
    pub fn new(services: SyncServices, config: &ServerConfig) -> Self {
        Self {
            services,
            signature: Arc::new(SignatureValidator::new(SecretString::from(
                config.webhook_secret.expose_secret(),
            ))),
            admin_token: config
                .admin_token
                .as_ref()
                .map(|token| Arc::new(SecretString::from(token.expose_secret()))),
        }
    }
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(state: AppState) -> Router {
    let admin_auth = middleware::AdminAuth {
        token: state.admin_token.clone(),
    };

    // Admin routes: require the bearer token and a tenant header.
    let admin = routes::admin::router().layer(axum::middleware::from_fn_with_state(
        admin_auth,
        middleware::admin_middleware,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/webhooks", routes::webhooks::router())
        .nest("/admin", admin)
        .layer(ServiceBuilder::new().layer(Extension(state)))
}
