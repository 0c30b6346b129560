//! HTTP server configuration.

use secrecy::SecretString;
use tracing::warn;

const DEV_WEBHOOK_SECRET: &str = "dev-webhook-secret";

pub struct ServerConfig {
    pub bind: String,
    pub webhook_secret: SecretString,
    /// `None` disables `POST /admin/reconcile`.
    pub admin_token: Option<SecretString>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let webhook_secret = non_empty("STOCKLINK_WEBHOOK_SECRET").unwrap_or_else(|| {
            warn!("STOCKLINK_WEBHOOK_SECRET not set; using insecure dev default");
            DEV_WEBHOOK_SECRET.to_string()
        });

        Self {
            bind: non_empty("STOCKLINK_BIND").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            webhook_secret: SecretString::from(webhook_secret),
            admin_token: non_empty("STOCKLINK_ADMIN_TOKEN").map(SecretString::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = ServerConfig::from_lookup(|_| None);
        assert_eq!(cfg.bind, "0.0.0.0:8080");
        assert_eq!(cfg.webhook_secret.expose_secret(), DEV_WEBHOOK_SECRET);
        assert!(cfg.admin_token.is_none());
    }

    #[test]
    fn values_are_read_from_lookup() {
        let cfg = ServerConfig::from_lookup(|name| match name {
            "STOCKLINK_BIND" => Some("127.0.0.1:9000".into()),
            "STOCKLINK_WEBHOOK_SECRET" => Some("s3cret".into()),
            "STOCKLINK_ADMIN_TOKEN" => Some("admin".into()),
            _ => None,
        });
        assert_eq!(cfg.bind, "127.0.0.1:9000");
        assert_eq!(cfg.webhook_secret.expose_secret(), "s3cret");
        assert_eq!(cfg.admin_token.as_ref().map(|t| t.expose_secret()), Some("admin"));
    }
}
