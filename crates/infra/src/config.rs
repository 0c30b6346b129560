//! Configuration loading and representation.

use std::time::Duration;

use tracing::warn;

/// Tunables of the reconciliation core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Exact-duplicate suppression TTL.
    pub dedup_ttl: Duration,
    /// Predicted-echo suppression TTL.
    pub echo_ttl: Duration,
    /// Per (node, location) debounce TTL.
    pub debounce_ttl: Duration,
    /// Aggregation window (fixed, armed by the first event of a group).
    pub window: Duration,
    /// Relationship cache TTL.
    pub resolver_ttl: Duration,
    /// Max tuples per batched platform write.
    pub write_batch_size: usize,
    /// Merchant URL receiving before/after reports.
    pub report_url: Option<String>,
    /// Postgres for baselines and the processed-delivery ledger.
    pub database_url: Option<String>,
    /// Redis for shared dedup/echo/debounce key sets.
    pub redis_url: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            dedup_ttl: Duration::from_secs(10),
            echo_ttl: Duration::from_secs(10),
            debounce_ttl: Duration::from_secs(6),
            window: Duration::from_secs(5),
            resolver_ttl: Duration::from_secs(30),
            write_batch_size: 100,
            report_url: None,
            database_url: None,
            redis_url: None,
        }
    }
}

impl SyncConfig {
    /// Load from `STOCKLINK_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let millis = |name: &str, default: Duration| -> Duration {
            match lookup(name) {
                None => default,
                Some(raw) => match raw.trim().parse::<u64>() {
                    Ok(ms) => Duration::from_millis(ms),
                    Err(_) => {
                        warn!(variable = name, value = %raw, "invalid duration; using default");
                        default
                    }
                },
            }
        };

        let write_batch_size = match lookup("STOCKLINK_WRITE_BATCH_SIZE") {
            None => defaults.write_batch_size,
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    warn!(variable = "STOCKLINK_WRITE_BATCH_SIZE", value = %raw, "invalid batch size; using default");
                    defaults.write_batch_size
                }
            },
        };

        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Self {
            dedup_ttl: millis("STOCKLINK_DEDUP_TTL_MS", defaults.dedup_ttl),
            echo_ttl: millis("STOCKLINK_ECHO_TTL_MS", defaults.echo_ttl),
            debounce_ttl: millis("STOCKLINK_DEBOUNCE_TTL_MS", defaults.debounce_ttl),
            window: millis("STOCKLINK_WINDOW_MS", defaults.window),
            resolver_ttl: millis("STOCKLINK_RESOLVER_TTL_MS", defaults.resolver_ttl),
            write_batch_size,
            report_url: non_empty("STOCKLINK_REPORT_URL"),
            database_url: non_empty("DATABASE_URL"),
            redis_url: non_empty("REDIS_URL"),
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_documented_windows() {
        let cfg = SyncConfig::from_lookup(|_| None);
        assert_eq!(cfg.dedup_ttl, Duration::from_secs(10));
        assert_eq!(cfg.echo_ttl, Duration::from_secs(10));
        assert_eq!(cfg.debounce_ttl, Duration::from_secs(6));
        assert_eq!(cfg.window, Duration::from_secs(5));
        assert_eq!(cfg, SyncConfig::default());
    }

    #[test]
    fn overrides_are_read_in_milliseconds() {
        let cfg = SyncConfig::from_lookup(lookup(&[
            ("STOCKLINK_WINDOW_MS", "250"),
            ("STOCKLINK_WRITE_BATCH_SIZE", "7"),
            ("STOCKLINK_REPORT_URL", "https://merchant.example/hook"),
        ]));
        assert_eq!(cfg.window, Duration::from_millis(250));
        assert_eq!(cfg.write_batch_size, 7);
        assert_eq!(cfg.report_url.as_deref(), Some("https://merchant.example/hook"));
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let cfg = SyncConfig::from_lookup(lookup(&[
            ("STOCKLINK_DEBOUNCE_TTL_MS", "soon"),
            ("STOCKLINK_WRITE_BATCH_SIZE", "0"),
            ("DATABASE_URL", "  "),
        ]));
        assert_eq!(cfg.debounce_ttl, Duration::from_secs(6));
        assert_eq!(cfg.write_batch_size, 100);
        assert_eq!(cfg.database_url, None);
    }
}
