//! Escrow projection repository implementation for PostgreSQL.

use async_trait::async_trait;
use sqlx::PgPool;

use concord_core::error::{StorageError, StorageResult};
use concord_core::models::EscrowProjection;
use concord_core::ports::ProjectionRepository;

/// PostgreSQL implementation of ProjectionRepository.
pub struct PgProjectionRepository {
    pool: PgPool,
}

impl PgProjectionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectionRepository for PgProjectionRepository {
    async fn find(&self, escrow_id: &str) -> StorageResult<Option<EscrowProjection>> {
        let row = sqlx::query_as::<_, ProjectionRow>(
            r#"
            SELECT id, status, amount, asset, is_active, creator, created_at, updated_at
            FROM escrow_projections
            WHERE id = $1
            "#,
        )
        .bind(escrow_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        row.map(ProjectionRow::into_projection).transpose()
    }

    async fn save(&self, projection: &EscrowProjection) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO escrow_projections (
                id, status, amount, asset, is_active, creator, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                amount = EXCLUDED.amount,
                asset = EXCLUDED.asset,
                is_active = EXCLUDED.is_active,
                creator = COALESCE(EXCLUDED.creator, escrow_projections.creator),
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&projection.id)
        .bind(projection.status.as_str())
        .bind(&projection.amount)
        .bind(&projection.asset)
        .bind(projection.is_active)
        .bind(&projection.creator)
        .bind(projection.created_at)
        .bind(projection.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct ProjectionRow {
    id: String,
    status: String,
    amount: String,
    asset: String,
    is_active: bool,
    creator: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl ProjectionRow {
    fn into_projection(self) -> StorageResult<EscrowProjection> {
        let status = self
            .status
            .parse()
            .map_err(|e: String| StorageError::SerializationError(e))?;

        Ok(EscrowProjection {
            id: self.id,
            status,
            amount: self.amount,
            asset: self.asset,
            is_active: self.is_active,
            creator: self.creator,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
