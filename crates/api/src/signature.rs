//! HMAC-SHA256 signature validation for inbound inventory webhooks.
//!
//! The platform signs the raw body with a shared secret and sends
//! `X-Stocklink-Signature: sha256=<hex>`. Verification happens before the body
//! is parsed; a failure has no side effects.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use stocklink_infra::SyncError;

pub const SIGNATURE_HEADER: &str = "x-stocklink-signature";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("missing signature header")]
    MissingSignature,

    #[error("invalid signature format: {0}")]
    InvalidSignatureFormat(String),

    #[error("signature mismatch")]
    InvalidSignature,
}

impl From<WebhookError> for SyncError {
    fn from(e: WebhookError) -> Self {
        SyncError::Authentication(e.to_string())
    }
}

pub struct SignatureValidator {
    secret: SecretString,
}

impl SignatureValidator {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Verify `signature_header` (`sha256=<hex>`) against `payload`.
    ///
    /// Comparison is constant-time; neither the secret nor the signature is logged.
    pub fn verify(&self, payload: &[u8], signature_header: Option<&str>) -> Result<(), WebhookError> {
        let header = signature_header.ok_or(WebhookError::MissingSignature)?;
        let signature_hex = header
            .trim()
            .strip_prefix("sha256=")
            .ok_or_else(|| WebhookError::InvalidSignatureFormat("missing sha256= prefix".into()))?;
        let expected = hex::decode(signature_hex)
            .map_err(|e| WebhookError::InvalidSignatureFormat(format!("invalid hex: {e}")))?;

        let computed = self.compute(payload)?;
        if computed.ct_eq(&expected).into() {
            Ok(())
        } else {
            tracing::warn!("webhook signature verification failed");
            Err(WebhookError::InvalidSignature)
        }
    }

    /// `sha256=<hex>` header value for `payload` (used by clients and tests).
    pub fn sign(&self, payload: &[u8]) -> Result<String, WebhookError> {
        Ok(format!("sha256={}", hex::encode(self.compute(payload)?)))
    }

    fn compute(&self, payload: &[u8]) -> Result<Vec<u8>, WebhookError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|e| WebhookError::InvalidSignatureFormat(e.to_string()))?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

impl std::fmt::Debug for SignatureValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureValidator")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
