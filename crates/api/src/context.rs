use axum::http::HeaderMap;

use stocklink_core::TenantId;
use stocklink_infra::SyncError;

pub const TENANT_HEADER: &str = "x-stocklink-tenant";

/// Tenant context for a request.
///
/// Resolved from `X-Stocklink-Tenant`; every pipeline key is scoped by it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn from_headers(headers: &HeaderMap) -> Result<Self, SyncError> {
        let raw = headers
            .get(TENANT_HEADER)
            .ok_or_else(|| SyncError::MalformedPayload("missing tenant header".into()))?
            .to_str()
            .map_err(|_| SyncError::MalformedPayload("tenant header is not ASCII".into()))?;
        let tenant_id = raw
            .trim()
            .parse::<TenantId>()
            .map_err(|e| SyncError::MalformedPayload(format!("invalid tenant: {e}")))?;
        Ok(Self::new(tenant_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn tenant_is_parsed_from_header() {
        let tenant = TenantId::new();
        let mut headers = HeaderMap::new();
        headers.insert(TENANT_HEADER, HeaderValue::from_str(&tenant.to_string()).unwrap());
        assert_eq!(TenantContext::from_headers(&headers).unwrap().tenant_id(), tenant);
    }

    #[test]
    fn missing_or_invalid_tenant_is_malformed() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            TenantContext::from_headers(&headers),
            Err(SyncError::MalformedPayload(_))
        ));
        headers.insert(TENANT_HEADER, HeaderValue::from_static("not-a-uuid"));
        assert!(matches!(
            TenantContext::from_headers(&headers),
            Err(SyncError::MalformedPayload(_))
        ));
    }
}
