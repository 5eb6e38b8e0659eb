//! Sync cursor repository implementation for PostgreSQL.

use async_trait::async_trait;
use sqlx::PgPool;

use concord_core::error::{StorageError, StorageResult};
use concord_core::ports::CursorRepository;

/// PostgreSQL implementation of CursorRepository.
///
/// The cursor is keyed by contract id so several contracts can be
/// synced against the same database.
pub struct PgCursorRepository {
    pool: PgPool,
    contract_id: String,
}

impl PgCursorRepository {
    pub fn new(pool: PgPool, contract_id: impl Into<String>) -> Self {
        Self {
            pool,
            contract_id: contract_id.into(),
        }
    }
}

#[async_trait]
impl CursorRepository for PgCursorRepository {
    async fn get(&self) -> StorageResult<Option<u64>> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT last_applied FROM sync_cursor WHERE contract_id = $1")
                .bind(&self.contract_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(row.map(|(height,)| height as u64))
    }

    async fn set(&self, height: u64) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_cursor (contract_id, last_applied, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (contract_id) DO UPDATE SET
                last_applied = EXCLUDED.last_applied,
                updated_at = NOW()
            "#,
        )
        .bind(&self.contract_id)
        .bind(height as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(())
    }
}
