//! In-memory port implementations for service tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{ChainError, ChainResult, StorageError, StorageResult};
use crate::models::{ChainEscrow, EscrowProjection, EventFields, EventKind, LedgerEvent};
use crate::ports::{
    CursorRepository, EventRepository, LedgerSource, ProjectionRepository, RawLedgerEvent,
    Repositories,
};

// =============================================================================
// Builders
// =============================================================================

pub fn raw_event(
    tx_hash: &str,
    event_index: u32,
    ledger: u64,
    name: &str,
    payload: serde_json::Value,
) -> RawLedgerEvent {
    RawLedgerEvent {
        tx_hash: tx_hash.to_string(),
        event_index,
        ledger,
        closed_at: Utc::now(),
        name: name.to_string(),
        payload,
    }
}

pub fn event(
    tx_hash: &str,
    event_index: u32,
    ledger: u64,
    kind: EventKind,
    escrow_id: &str,
) -> LedgerEvent {
    LedgerEvent {
        tx_hash: tx_hash.to_string(),
        event_index,
        kind,
        ledger,
        timestamp: Utc::now(),
        payload: serde_json::json!({ "escrow_id": escrow_id }),
        fields: EventFields {
            escrow_id: Some(escrow_id.to_string()),
            amount: Some("100".to_string()),
            ..EventFields::default()
        },
    }
}

// =============================================================================
// In-memory repositories
// =============================================================================

/// Hash-map backed implementation of all repository ports, with call
/// accounting so tests can assert on persistence behavior.
#[derive(Default)]
pub struct MemoryRepositories {
    events: Mutex<HashMap<(String, u32), LedgerEvent>>,
    event_saves: AtomicUsize,
    projections: Mutex<HashMap<String, EscrowProjection>>,
    cursor: Mutex<Option<u64>>,
    cursor_writes: Mutex<Vec<u64>>,
    fail_projection_reads: AtomicBool,
    fail_event_saves: Mutex<HashSet<String>>,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_save_count(&self) -> usize {
        self.event_saves.load(Ordering::SeqCst)
    }

    pub fn projection(&self, escrow_id: &str) -> Option<EscrowProjection> {
        self.projections.lock().unwrap().get(escrow_id).cloned()
    }

    pub fn insert_projection(&self, projection: EscrowProjection) {
        self.projections
            .lock()
            .unwrap()
            .insert(projection.id.clone(), projection);
    }

    pub fn set_persisted_cursor(&self, height: u64) {
        *self.cursor.lock().unwrap() = Some(height);
    }

    /// Heights passed to `cursor().set()`, in call order.
    pub fn cursor_writes(&self) -> Vec<u64> {
        self.cursor_writes.lock().unwrap().clone()
    }

    /// Make every projection read fail with a query error.
    pub fn fail_projection_reads(&self) {
        self.fail_projection_reads.store(true, Ordering::SeqCst);
    }

    /// Make saves of events with this transaction hash fail with a
    /// query error.
    pub fn fail_event_save(&self, tx_hash: &str) {
        self.fail_event_saves
            .lock()
            .unwrap()
            .insert(tx_hash.to_string());
    }
}

#[async_trait]
impl EventRepository for MemoryRepositories {
    async fn find(&self, tx_hash: &str, event_index: u32) -> StorageResult<Option<LedgerEvent>> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .get(&(tx_hash.to_string(), event_index))
            .cloned())
    }

    async fn save(&self, event: &LedgerEvent) -> StorageResult<()> {
        if self.fail_event_saves.lock().unwrap().contains(&event.tx_hash) {
            return Err(StorageError::QueryError("injected save failure".into()));
        }
        self.event_saves.fetch_add(1, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap()
            .insert((event.tx_hash.clone(), event.event_index), event.clone());
        Ok(())
    }
}

#[async_trait]
impl ProjectionRepository for MemoryRepositories {
    async fn find(&self, escrow_id: &str) -> StorageResult<Option<EscrowProjection>> {
        if self.fail_projection_reads.load(Ordering::SeqCst) {
            return Err(StorageError::QueryError("injected read failure".into()));
        }
        Ok(self.projections.lock().unwrap().get(escrow_id).cloned())
    }

    async fn save(&self, projection: &EscrowProjection) -> StorageResult<()> {
        self.projections
            .lock()
            .unwrap()
            .insert(projection.id.clone(), projection.clone());
        Ok(())
    }
}

#[async_trait]
impl CursorRepository for MemoryRepositories {
    async fn get(&self) -> StorageResult<Option<u64>> {
        Ok(*self.cursor.lock().unwrap())
    }

    async fn set(&self, height: u64) -> StorageResult<()> {
        *self.cursor.lock().unwrap() = Some(height);
        self.cursor_writes.lock().unwrap().push(height);
        Ok(())
    }
}

impl Repositories for MemoryRepositories {
    fn events(&self) -> &dyn EventRepository {
        self
    }

    fn projections(&self) -> &dyn ProjectionRepository {
        self
    }

    fn cursor(&self) -> &dyn CursorRepository {
        self
    }
}

// =============================================================================
// In-memory ledger
// =============================================================================

/// Scripted ledger source with call accounting.
#[derive(Default)]
pub struct MemoryLedger {
    head: Mutex<u64>,
    head_fails: AtomicBool,
    events: Mutex<Vec<RawLedgerEvent>>,
    escrows: Mutex<HashMap<String, ChainEscrow>>,
    head_calls: AtomicUsize,
    fetch_calls: Mutex<Vec<(u64, u64)>>,
}

impl MemoryLedger {
    pub fn new(head: u64) -> Self {
        Self {
            head: Mutex::new(head),
            ..Self::default()
        }
    }

    pub fn push_event(&self, raw: RawLedgerEvent) {
        self.events.lock().unwrap().push(raw);
    }

    pub fn insert_escrow(&self, escrow: ChainEscrow) {
        self.escrows.lock().unwrap().insert(escrow.id.clone(), escrow);
    }

    /// Make every `head()` call fail with an RPC error.
    pub fn fail_head_calls(&self) {
        self.head_fails.store(true, Ordering::SeqCst);
    }

    pub fn head_call_count(&self) -> usize {
        self.head_calls.load(Ordering::SeqCst)
    }

    /// `(from, to)` ranges passed to `fetch_range`, in call order.
    pub fn fetch_calls(&self) -> Vec<(u64, u64)> {
        self.fetch_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LedgerSource for MemoryLedger {
    async fn head(&self) -> ChainResult<u64> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        if self.head_fails.load(Ordering::SeqCst) {
            return Err(ChainError::RpcError("injected head failure".into()));
        }
        Ok(*self.head.lock().unwrap())
    }

    async fn fetch_range(&self, from: u64, to: u64) -> ChainResult<Vec<RawLedgerEvent>> {
        self.fetch_calls.lock().unwrap().push((from, to));
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.ledger >= from && e.ledger <= to)
            .cloned()
            .collect())
    }

    async fn fetch_escrow(&self, escrow_id: &str) -> ChainResult<Option<ChainEscrow>> {
        Ok(self.escrows.lock().unwrap().get(escrow_id).cloned())
    }
}
