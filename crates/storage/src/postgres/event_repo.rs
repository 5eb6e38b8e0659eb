//! Event log repository implementation for PostgreSQL.

use async_trait::async_trait;
use sqlx::PgPool;

use concord_core::error::{StorageError, StorageResult};
use concord_core::models::{EventFields, EventKind, LedgerEvent};
use concord_core::ports::EventRepository;

/// PostgreSQL implementation of EventRepository.
pub struct PgEventRepository {
    pool: PgPool,
}

impl PgEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventRepository for PgEventRepository {
    async fn find(&self, tx_hash: &str, event_index: u32) -> StorageResult<Option<LedgerEvent>> {
        let row = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT tx_hash, event_index, kind, ledger, "timestamp", payload, fields
            FROM ledger_events
            WHERE tx_hash = $1 AND event_index = $2
            "#,
        )
        .bind(tx_hash)
        .bind(event_index as i32)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        row.map(EventRow::into_event).transpose()
    }

    async fn save(&self, event: &LedgerEvent) -> StorageResult<()> {
        let fields = serde_json::to_value(&event.fields)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        // The conflict target is the natural unique key: re-observing an
        // event is a no-op, never a duplicate row.
        sqlx::query(
            r#"
            INSERT INTO ledger_events (
                tx_hash, event_index, kind, escrow_id, ledger, "timestamp", payload, fields
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (tx_hash, event_index) DO NOTHING
            "#,
        )
        .bind(&event.tx_hash)
        .bind(event.event_index as i32)
        .bind(event.kind.as_str())
        .bind(&event.fields.escrow_id)
        .bind(event.ledger as i64)
        .bind(event.timestamp)
        .bind(&event.payload)
        .bind(&fields)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    tx_hash: String,
    event_index: i32,
    kind: String,
    ledger: i64,
    timestamp: chrono::DateTime<chrono::Utc>,
    payload: serde_json::Value,
    fields: serde_json::Value,
}

impl EventRow {
    fn into_event(self) -> StorageResult<LedgerEvent> {
        let fields: EventFields = serde_json::from_value(self.fields)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        Ok(LedgerEvent {
            tx_hash: self.tx_hash,
            event_index: self.event_index as u32,
            kind: EventKind::from_discriminator(&self.kind),
            ledger: self.ledger as u64,
            timestamp: self.timestamp,
            payload: self.payload,
            fields,
        })
    }
}
