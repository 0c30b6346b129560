//! Wiring: build the whole reconciliation stack from a [`SyncConfig`].

use std::sync::Arc;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::baseline::{BaselineStore, InMemoryBaselineStore, PostgresBaselineStore};
use crate::config::SyncConfig;
use crate::engine::Reconciler;
use crate::error::{PersistenceError, SyncResult};
use crate::filter::{DeliveryFilter, FilterTtls};
use crate::ledger::PostgresKeyLedger;
use crate::notifier::{NoopNotifier, ReportNotifier, WebhookReportNotifier};
use crate::pipeline::SyncPipeline;
use crate::platform::CommercePlatform;
use crate::resolver::RelationshipResolver;
use crate::window::AggregationWindow;
use crate::writer::PropagationWriter;

/// Handles to every long-lived component.
#[derive(Clone)]
pub struct SyncServices {
    pub config: SyncConfig,
    pub pipeline: Arc<SyncPipeline>,
    pub engine: Arc<Reconciler>,
    pub window: Arc<AggregationWindow>,
    pub resolver: Arc<RelationshipResolver>,
}

impl SyncServices {
    /// Process-local ledgers and baselines (single instance, dev, tests).
    pub fn in_memory(config: SyncConfig, platform: Arc<dyn CommercePlatform>) -> Self {
        let filter = DeliveryFilter::in_memory(FilterTtls::from(&config));
        Self::assemble(config, platform, filter, Arc::new(InMemoryBaselineStore::new()))
    }

    /// Postgres baselines/ledgers when `database_url` is set, Redis key sets
    /// when `redis_url` is set (feature `redis`); in-memory otherwise.
    pub async fn connect(
        config: SyncConfig,
        platform: Arc<dyn CommercePlatform>,
    ) -> SyncResult<Self> {
        let ttls = FilterTtls::from(&config);

        let Some(database_url) = config.database_url.clone() else {
            info!("no DATABASE_URL; using in-memory baselines and key ledgers");
            let filter = Self::redis_filter(&config, ttls)?
                .unwrap_or_else(|| DeliveryFilter::in_memory(ttls));
            return Ok(Self::in_memory_with_filter(config, platform, filter));
        };

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&database_url)
            .await
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;
        apply_schema(&pool).await?;
        info!("connected to Postgres for baselines and processed-delivery ledger");

        let filter = match Self::redis_filter(&config, ttls)? {
            Some(filter) => filter,
            None => DeliveryFilter::new(
                Arc::new(PostgresKeyLedger::new(pool.clone(), "dedup")),
                Arc::new(PostgresKeyLedger::new(pool.clone(), "echo")),
                Arc::new(PostgresKeyLedger::new(pool.clone(), "debounce")),
                ttls,
            ),
        };
        let baselines: Arc<dyn BaselineStore> = Arc::new(PostgresBaselineStore::new(pool));
        Ok(Self::assemble(config, platform, filter, baselines))
    }

    /// Flush every open aggregation group (graceful shutdown).
    pub async fn shutdown(&self) -> usize {
        let flushed = self.window.flush_all().await;
        info!(flushed, "aggregation window drained");
        flushed
    }

    fn in_memory_with_filter(
        config: SyncConfig,
        platform: Arc<dyn CommercePlatform>,
        filter: DeliveryFilter,
    ) -> Self {
        Self::assemble(config, platform, filter, Arc::new(InMemoryBaselineStore::new()))
    }

    #[cfg(feature = "redis")]
    fn redis_filter(config: &SyncConfig, ttls: FilterTtls) -> SyncResult<Option<DeliveryFilter>> {
        use crate::ledger::RedisKeyLedger;

        let Some(url) = config.redis_url.as_deref() else {
            return Ok(None);
        };
        info!("using Redis for dedup/echo/debounce key sets");
        Ok(Some(DeliveryFilter::new(
            Arc::new(RedisKeyLedger::new(url, "stocklink:dedup")?),
            Arc::new(RedisKeyLedger::new(url, "stocklink:echo")?),
            Arc::new(RedisKeyLedger::new(url, "stocklink:debounce")?),
            ttls,
        )))
    }

    #[cfg(not(feature = "redis"))]
    fn redis_filter(config: &SyncConfig, _ttls: FilterTtls) -> SyncResult<Option<DeliveryFilter>> {
        if config.redis_url.is_some() {
            warn!("REDIS_URL set but the `redis` feature is disabled; ignoring");
        }
        Ok(None)
    }

    fn assemble(
        config: SyncConfig,
        platform: Arc<dyn CommercePlatform>,
        filter: DeliveryFilter,
        baselines: Arc<dyn BaselineStore>,
    ) -> Self {
        let filter = Arc::new(filter);
        let resolver = Arc::new(RelationshipResolver::new(platform.clone(), config.resolver_ttl));
        let writer = PropagationWriter::new(platform.clone(), filter.clone(), config.write_batch_size);
        let engine = Arc::new(Reconciler::new(
            platform,
            baselines,
            resolver.clone(),
            writer,
            report_notifier(&config),
        ));
        let window = AggregationWindow::new(config.window, engine.clone());
        let pipeline = Arc::new(SyncPipeline::new(filter, resolver.clone(), window.clone()));

        Self {
            config,
            pipeline,
            engine,
            window,
            resolver,
        }
    }
}

/// Idempotent DDL for baselines and the processed-delivery ledger.
const SCHEMA: &str = include_str!("../migrations/0001_stocklink.sql");

async fn apply_schema(pool: &PgPool) -> Result<(), PersistenceError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| PersistenceError::Storage(format!("schema setup failed: {e}")))?;
    Ok(())
}

fn report_notifier(config: &SyncConfig) -> Arc<dyn ReportNotifier> {
    let Some(url) = config.report_url.as_deref() else {
        return Arc::new(NoopNotifier);
    };
    match WebhookReportNotifier::new(url) {
        Ok(notifier) => Arc::new(notifier),
        Err(e) => {
            warn!(error = %e, "failed to build report client; reports disabled");
            Arc::new(NoopNotifier)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use stocklink_core::TenantId;

    use crate::lock::LockOutcome;
    use crate::platform::InMemoryPlatform;

    #[test]
    fn schema_is_safe_to_apply_on_every_connect() {
        let creates: Vec<&str> = SCHEMA
            .lines()
            .filter(|l| l.trim_start().starts_with("CREATE"))
            .collect();
        assert_eq!(creates.len(), 3);
        assert!(creates.iter().all(|l| l.contains("IF NOT EXISTS")));
    }

    #[tokio::test]
    async fn unreachable_report_url_does_not_affect_the_pass() {
        // Bind then drop: nothing listens on the port afterwards.
        let addr = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();
        let config = SyncConfig {
            report_url: Some(format!("http://{addr}/reports")),
            ..SyncConfig::default()
        };

        let platform = Arc::new(InMemoryPlatform::new());
        let tenant = TenantId::new();
        platform.link(tenant, &"m".into(), &[("c1", None)]);
        platform.set_level(tenant, &"m".into(), &"l".into(), 6);
        platform.set_level(tenant, &"c1".into(), &"l".into(), 1);
        let services = SyncServices::in_memory(config, platform.clone());

        let outcome = services
            .engine
            .reconcile_manual(tenant, "m".into(), "l".into())
            .await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(outcome, LockOutcome::Ran { passes: 1 });
        assert_eq!(platform.level(tenant, &"c1".into(), &"l".into()), Some(6));
    }
}
