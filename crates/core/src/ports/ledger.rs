//! Port trait for the ledger data source.
//!
//! This trait defines the interface for reading the ledger head, contract
//! events and current escrow state from a Soroban RPC endpoint.
//! Implementations live in the infrastructure layer (e.g., `concord-soroban`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ChainResult;
use crate::models::ChainEscrow;

/// Raw contract event from the ledger before normalization.
#[derive(Debug, Clone)]
pub struct RawLedgerEvent {
    /// Transaction hash (hex).
    pub tx_hash: String,
    /// Event index within the transaction.
    pub event_index: u32,
    /// Ledger height the event was emitted at.
    pub ledger: u64,
    /// Wall-clock timestamp of the ledger close.
    pub closed_at: DateTime<Utc>,
    /// Discriminator topic (e.g., "escrow_created").
    pub name: String,
    /// Event payload as JSON.
    pub payload: serde_json::Value,
}

/// Port trait for the ledger data source.
///
/// Designed for straight-line polling: the supervisor reads the head and
/// fetches inclusive height ranges. There is no subscription surface and
/// no reorg handling beyond cursor resumption.
#[async_trait]
pub trait LedgerSource: Send + Sync {
    /// Get the height of the most recently closed ledger.
    async fn head(&self) -> ChainResult<u64>;

    /// Fetch all contract events for the inclusive range `[from, to]`,
    /// ordered by ledger then event index.
    ///
    /// Implementations must return the complete set for the range or fail
    /// the whole call. Silent partial ranges would corrupt the cursor.
    async fn fetch_range(&self, from: u64, to: u64) -> ChainResult<Vec<RawLedgerEvent>>;

    /// Fetch the current ledger-side state of one escrow, if it exists.
    ///
    /// Used by reconciliation only; the poll loop never calls this.
    async fn fetch_escrow(&self, escrow_id: &str) -> ChainResult<Option<ChainEscrow>>;
}
