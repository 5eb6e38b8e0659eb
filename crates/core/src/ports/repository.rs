//! Port traits for data repositories.
//!
//! These traits define the storage interface used by the domain layer.
//! Implementations live in the infrastructure layer (e.g., `concord-storage`).

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::models::{EscrowProjection, LedgerEvent};

/// Repository for the immutable ledger event log.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Look up an event by its natural unique key.
    async fn find(&self, tx_hash: &str, event_index: u32) -> StorageResult<Option<LedgerEvent>>;

    /// Persist an event. Re-saving an already-recorded `(tx_hash,
    /// event_index)` pair must be a no-op, never a duplicate row.
    async fn save(&self, event: &LedgerEvent) -> StorageResult<()>;
}

/// Repository for escrow projections.
#[async_trait]
pub trait ProjectionRepository: Send + Sync {
    /// Get the projection for an escrow id.
    async fn find(&self, escrow_id: &str) -> StorageResult<Option<EscrowProjection>>;

    /// Insert or update a projection (upsert on id).
    async fn save(&self, projection: &EscrowProjection) -> StorageResult<()>;
}

/// Repository for the sync cursor.
///
/// The cursor is a single scalar: the highest ledger height whose events
/// have been durably applied. The supervisor holds the only in-memory copy
/// between persists.
#[async_trait]
pub trait CursorRepository: Send + Sync {
    /// Get the persisted cursor, if any sync has ever completed a batch.
    async fn get(&self) -> StorageResult<Option<u64>>;

    /// Persist the cursor (upsert).
    async fn set(&self, height: u64) -> StorageResult<()>;
}

/// Combined repository access for the synchronizer.
pub trait Repositories: Send + Sync {
    /// Access the event log repository.
    fn events(&self) -> &dyn EventRepository;

    /// Access the projection repository.
    fn projections(&self) -> &dyn ProjectionRepository;

    /// Access the cursor repository.
    fn cursor(&self) -> &dyn CursorRepository;
}
