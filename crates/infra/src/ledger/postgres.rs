//! Postgres-backed durable processed-delivery ledger.
//!
//! Recommended over the in-memory ledger for multi-instance deployments: a
//! delivery admitted by one instance is visible to all of them. Expired rows
//! are reclaimed on conflict and by `purge_expired`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;

use super::KeyLedger;
use crate::error::LedgerError;

pub struct PostgresKeyLedger {
    pool: Arc<PgPool>,
    namespace: String,
}

impl PostgresKeyLedger {
    /// `namespace` separates the dedup, echo and debounce sets sharing one table.
    pub fn new(pool: PgPool, namespace: impl Into<String>) -> Self {
        Self {
            pool: Arc::new(pool),
            namespace: namespace.into(),
        }
    }

    /// Delete expired rows; returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, LedgerError> {
        let result = sqlx::query(
            r#"
            DELETE FROM processed_deliveries
            WHERE namespace = $1 AND expires_at <= NOW()
            "#,
        )
        .bind(&self.namespace)
        .execute(&*self.pool)
        .await
        .map_err(backend)?;
        Ok(result.rows_affected())
    }
}

fn backend(e: sqlx::Error) -> LedgerError {
    LedgerError::Backend(e.to_string())
}

fn ttl_secs(ttl: Duration) -> f64 {
    ttl.as_secs_f64()
}

#[async_trait]
impl KeyLedger for PostgresKeyLedger {
    async fn insert_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, LedgerError> {
        // An expired row is overwritten; a live one makes the upsert a no-op.
        let inserted = sqlx::query(
            r#"
            INSERT INTO processed_deliveries (namespace, key, expires_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3))
            ON CONFLICT (namespace, key)
            DO UPDATE SET expires_at = EXCLUDED.expires_at
            WHERE processed_deliveries.expires_at <= NOW()
            RETURNING key
            "#,
        )
        .bind(&self.namespace)
        .bind(key)
        .bind(ttl_secs(ttl))
        .fetch_optional(&*self.pool)
        .await
        .map_err(backend)?;

        Ok(inserted.is_some())
    }

    async fn contains(&self, key: &str) -> Result<bool, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT 1
            FROM processed_deliveries
            WHERE namespace = $1 AND key = $2 AND expires_at > NOW()
            "#,
        )
        .bind(&self.namespace)
        .bind(key)
        .fetch_optional(&*self.pool)
        .await
        .map_err(backend)?;

        Ok(row.is_some())
    }

    async fn insert(&self, key: &str, ttl: Duration) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO processed_deliveries (namespace, key, expires_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3))
            ON CONFLICT (namespace, key)
            DO UPDATE SET expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(&self.namespace)
        .bind(key)
        .bind(ttl_secs(ttl))
        .execute(&*self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }
}
