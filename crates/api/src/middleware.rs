use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

use crate::app::errors::{json_error, sync_error_to_response};
use crate::context::TenantContext;

#[derive(Clone)]
pub struct AdminAuth {
    /// `None` rejects every admin request.
    pub token: Option<Arc<SecretString>>,
}

/// Bearer-token check for admin routes, then tenant resolution.
pub async fn admin_middleware(
    State(auth): State<AdminAuth>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let unauthorized = || json_error(StatusCode::UNAUTHORIZED, "unauthorized", "invalid admin token");

    let Some(expected) = auth.token.as_deref() else {
        return Err(unauthorized());
    };
    let presented = extract_bearer(req.headers()).ok_or_else(unauthorized)?;
    if !bool::from(presented.as_bytes().ct_eq(expected.expose_secret().as_bytes())) {
        tracing::warn!("admin request with invalid token");
        return Err(unauthorized());
    }

    let tenant = TenantContext::from_headers(req.headers()).map_err(sync_error_to_response)?;
    req.extensions_mut().insert(tenant);

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?
        .trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_is_extracted() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer  abc "));
        assert_eq!(extract_bearer(&headers), Some("abc"));

        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer(&headers), None);
    }
}
