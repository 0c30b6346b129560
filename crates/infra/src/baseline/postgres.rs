//! Postgres-backed baseline store.
//!
//! Every query carries `tenant_id` in its WHERE clause or primary key.
//! Schema: `migrations/0001_stocklink.sql`.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use stocklink_core::{LocationId, NodeId, Quantity, TenantId};

use super::BaselineStore;
use crate::error::PersistenceError;

pub struct PostgresBaselineStore {
    pool: Arc<PgPool>,
}

impl PostgresBaselineStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn storage(e: sqlx::Error) -> PersistenceError {
    PersistenceError::Storage(e.to_string())
}

#[async_trait]
impl BaselineStore for PostgresBaselineStore {
    async fn get(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        location_id: &LocationId,
    ) -> Result<Option<Quantity>, PersistenceError> {
        let row = sqlx::query(
            r#"
            SELECT quantity
            FROM inventory_baselines
            WHERE tenant_id = $1 AND node_id = $2 AND location_id = $3
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(node_id.as_str())
        .bind(location_id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(storage)?;

        row.map(|r| r.try_get::<i64, _>("quantity"))
            .transpose()
            .map_err(storage)
    }

    async fn put(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        location_id: &LocationId,
        quantity: Quantity,
    ) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO inventory_baselines (tenant_id, node_id, location_id, quantity, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (tenant_id, node_id, location_id)
            DO UPDATE SET quantity = EXCLUDED.quantity, updated_at = NOW()
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(node_id.as_str())
        .bind(location_id.as_str())
        .bind(quantity)
        .execute(&*self.pool)
        .await
        .map_err(storage)?;

        Ok(())
    }

    async fn compare_and_set(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        location_id: &LocationId,
        expected: Option<Quantity>,
        new: Quantity,
    ) -> Result<bool, PersistenceError> {
        let result = match expected {
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO inventory_baselines (tenant_id, node_id, location_id, quantity, updated_at)
                    VALUES ($1, $2, $3, $4, NOW())
                    ON CONFLICT (tenant_id, node_id, location_id) DO NOTHING
                    "#,
                )
                .bind(tenant_id.as_uuid())
                .bind(node_id.as_str())
                .bind(location_id.as_str())
                .bind(new)
                .execute(&*self.pool)
                .await
            }
            Some(expected) => {
                sqlx::query(
                    r#"
                    UPDATE inventory_baselines
                    SET quantity = $4, updated_at = NOW()
                    WHERE tenant_id = $1 AND node_id = $2 AND location_id = $3 AND quantity = $5
                    "#,
                )
                .bind(tenant_id.as_uuid())
                .bind(node_id.as_str())
                .bind(location_id.as_str())
                .bind(new)
                .bind(expected)
                .execute(&*self.pool)
                .await
            }
        }
        .map_err(storage)?;

        Ok(result.rows_affected() == 1)
    }
}
