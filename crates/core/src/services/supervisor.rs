//! Ledger poll supervisor - orchestrates the sync loop.
//!
//! One supervisor instance owns the cursor, the running flag and the
//! failure counter as an explicit state value behind a mutex. The loop
//! reads the ledger head, partitions the pending range into fixed-size
//! batches and applies them strictly in order; the cursor is persisted
//! only after a batch has been durably applied, so a crash resumes at
//! the last completed batch.
//!
//! Batches are never processed concurrently: applying events for the
//! same escrow out of order would corrupt the state machine.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::error::SyncResult;
use crate::metrics::{record_batch_applied, record_cycle_failure, BatchTimer};
use crate::models::SyncStatus;
use crate::ports::{LedgerSource, Repositories};
use crate::services::applier::{ApplyOutcome, EventApplier};
use crate::services::normalizer::normalize;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the poll supervisor.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Sleep between poll cycles when the head has not advanced.
    pub poll_interval: Duration,
    /// Number of ledger heights fetched and applied per batch.
    pub batch_size: u64,
    /// Consecutive failed cycles before the loop stops permanently.
    pub max_failures: u32,
    /// Sleep before retrying after a failed cycle.
    pub backoff: Duration,
    /// First ledger to sync when no cursor has ever been persisted.
    pub start_ledger: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 100,
            max_failures: 5,
            backoff: Duration::from_secs(5),
            start_ledger: 0,
        }
    }
}

// =============================================================================
// Supervisor State
// =============================================================================

/// Mutable supervisor state, held as one explicit value so the loop and
/// the control surface observe it consistently.
#[derive(Debug)]
struct SupervisorState {
    running: bool,
    stop_requested: bool,
    cursor: u64,
    failures: u32,
}

// =============================================================================
// PollSupervisor
// =============================================================================

/// Drives the fetch → normalize → apply cycle against the ledger.
///
/// # Contract
///
/// - [`start`](Self::start) is a no-op when already running.
/// - [`stop`](Self::stop) is cooperative: it never interrupts an in-flight
///   fetch or batch-apply.
/// - A cycle error backs off and retries; reaching the consecutive-failure
///   limit is terminal until [`restart`](Self::restart).
/// - [`manual_sync`](Self::manual_sync) rewinds the cursor and triggers one
///   cycle immediately.
pub struct PollSupervisor<L, R>
where
    L: LedgerSource,
    R: Repositories,
{
    config: PollConfig,
    ledger: Arc<L>,
    repos: Arc<R>,
    applier: EventApplier<R>,
    state: Mutex<SupervisorState>,
    wake: Notify,
}

impl<L, R> PollSupervisor<L, R>
where
    L: LedgerSource + 'static,
    R: Repositories + 'static,
{
    pub fn new(config: PollConfig, ledger: Arc<L>, repos: Arc<R>) -> Self {
        let state = SupervisorState {
            running: false,
            stop_requested: false,
            cursor: config.start_ledger,
            failures: 0,
        };
        Self {
            config,
            ledger,
            applier: EventApplier::new(repos.clone()),
            repos,
            state: Mutex::new(state),
            wake: Notify::new(),
        }
    }

    /// Start the poll loop on a background task.
    ///
    /// No-op when the loop is already running. The spawned loop resolves
    /// the cursor from storage (falling back to the configured start
    /// ledger) before the first cycle.
    pub fn start(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().expect("supervisor state poisoned");
            if state.running {
                warn!("Poll supervisor is already running");
                return;
            }
            state.running = true;
            state.stop_requested = false;
            state.failures = 0;
        }

        info!("⛓️  Starting ledger sync");
        let supervisor = Arc::clone(self);
        tokio::spawn(async move { supervisor.run_loop().await });
    }

    /// Request a cooperative stop.
    ///
    /// The flag is observed at the top of each loop iteration and between
    /// batches; an in-flight fetch or batch-apply always completes first.
    pub fn stop(&self) {
        self.state
            .lock()
            .expect("supervisor state poisoned")
            .stop_requested = true;
        self.wake.notify_one();
        info!("🛑 Ledger sync stop requested");
    }

    /// Stop, wait for the loop to exit, then start again.
    ///
    /// This is the only way to recover after the consecutive-failure
    /// limit has been reached.
    pub async fn restart(self: &Arc<Self>) {
        self.stop();
        while self.status().running {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.start();
    }

    /// Snapshot of the supervisor state.
    pub fn status(&self) -> SyncStatus {
        let state = self.state.lock().expect("supervisor state poisoned");
        SyncStatus {
            running: state.running,
            cursor_height: state.cursor,
            failure_count: state.failures,
        }
    }

    /// Rewind the cursor to `height - 1` and trigger one poll cycle
    /// immediately, without waiting for the next scheduled tick.
    ///
    /// This is the single sanctioned way to move the cursor backwards.
    #[instrument(skip(self))]
    pub async fn manual_sync(&self, height: u64) -> SyncResult<()> {
        let running = {
            let mut state = self.state.lock().expect("supervisor state poisoned");
            state.cursor = height.saturating_sub(1);
            state.running
        };
        info!(height, "Manual sync requested");

        if running {
            self.wake.notify_one();
            Ok(())
        } else {
            self.run_cycle().await.map(|_| ())
        }
    }

    fn stop_requested(&self) -> bool {
        self.state
            .lock()
            .expect("supervisor state poisoned")
            .stop_requested
    }

    async fn run_loop(&self) {
        let mut cursor_resolved = false;

        loop {
            if self.stop_requested() {
                break;
            }

            let cycle = if cursor_resolved {
                self.run_cycle().await
            } else {
                match self.resolve_cursor().await {
                    Ok(()) => {
                        cursor_resolved = true;
                        self.run_cycle().await
                    }
                    Err(e) => Err(e),
                }
            };

            match cycle {
                Ok(applied) => {
                    if applied > 0 {
                        debug!(applied, "Poll cycle complete");
                    }
                    self.state.lock().expect("supervisor state poisoned").failures = 0;
                }
                Err(e) => {
                    record_cycle_failure();
                    let failures = {
                        let mut state = self.state.lock().expect("supervisor state poisoned");
                        state.failures += 1;
                        state.failures
                    };
                    warn!(
                        error = ?e,
                        attempt = failures,
                        max = self.config.max_failures,
                        "⚠️  Poll cycle failed"
                    );
                    if failures >= self.config.max_failures {
                        error!(
                            attempts = failures,
                            "❌ Too many consecutive failures; sync stopped, restart required"
                        );
                        break;
                    }
                    tokio::time::sleep(self.config.backoff).await;
                    continue;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = self.wake.notified() => {}
            }
        }

        self.state.lock().expect("supervisor state poisoned").running = false;
        info!("🛑 Ledger sync stopped");
    }

    /// Resolve the starting cursor from storage, or fall back to the
    /// configured start ledger when no sync has ever completed.
    async fn resolve_cursor(&self) -> SyncResult<()> {
        let cursor = match self.repos.cursor().get().await? {
            Some(height) => {
                info!(cursor = height, "Resuming from persisted cursor");
                height
            }
            None => {
                info!(start = self.config.start_ledger, "No cursor found, starting fresh");
                self.config.start_ledger
            }
        };
        self.state.lock().expect("supervisor state poisoned").cursor = cursor;
        Ok(())
    }

    /// One poll cycle: read the head and apply the pending range in
    /// strictly sequential batches, persisting the cursor per batch.
    async fn run_cycle(&self) -> SyncResult<u64> {
        let head = self.ledger.head().await?;
        let mut cursor = self
            .state
            .lock()
            .expect("supervisor state poisoned")
            .cursor;

        if head <= cursor {
            trace!(head, cursor, "No new ledgers");
            return Ok(0);
        }

        debug!(from = cursor + 1, to = head, "Processing ledger range");
        let step = self.config.batch_size.max(1);
        let mut applied = 0;

        while cursor < head {
            if self.stop_requested() {
                debug!(cursor, "Stop requested mid-range, leaving remainder for restart");
                break;
            }

            let batch_end = head.min(cursor + step);
            applied += self.apply_batch(cursor + 1, batch_end).await?;

            // Durable before advance: a crash after this point resumes at
            // batch_end + 1 and replays nothing.
            self.repos.cursor().set(batch_end).await?;
            self.state.lock().expect("supervisor state poisoned").cursor = batch_end;
            record_batch_applied();
            cursor = batch_end;
        }

        Ok(applied)
    }

    /// Fetch and apply one inclusive batch of ledger heights.
    ///
    /// A ledger-level fetch failure aborts the batch (and only this
    /// batch); a single bad event is logged and skipped, never blocking
    /// the rest of the batch.
    async fn apply_batch(&self, from: u64, to: u64) -> SyncResult<u64> {
        let _timer = BatchTimer::new();
        let events = self.ledger.fetch_range(from, to).await?;
        trace!(from, to, events = events.len(), "Batch fetched");

        let mut applied = 0;
        for raw in &events {
            let event = normalize(raw);
            match self.applier.apply(&event).await {
                Ok(ApplyOutcome::Applied) => applied += 1,
                Ok(_) => {}
                Err(e) => {
                    error!(
                        tx = %event.tx_hash,
                        index = event.event_index,
                        error = ?e,
                        "❌ Event apply failed"
                    );
                }
            }
        }

        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EscrowStatus;
    use crate::services::testing::{raw_event, MemoryLedger, MemoryRepositories};
    use serde_json::json;

    fn supervisor(
        config: PollConfig,
        ledger: Arc<MemoryLedger>,
        repos: Arc<MemoryRepositories>,
    ) -> Arc<PollSupervisor<MemoryLedger, MemoryRepositories>> {
        Arc::new(PollSupervisor::new(config, ledger, repos))
    }

    /// Wait until `predicate` holds, letting the paused clock advance.
    async fn wait_for(mut predicate: impl FnMut() -> bool) {
        for _ in 0..1000 {
            if predicate() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("condition not reached");
    }

    // Test critique: le découpage en lots couvre la plage sans trou ni
    // recouvrement, et le curseur est persisté après chaque lot dans l'ordre
    #[tokio::test]
    async fn pending_range_is_partitioned_into_ordered_batches() {
        let ledger = Arc::new(MemoryLedger::new(250));
        let repos = Arc::new(MemoryRepositories::new());
        let sup = supervisor(PollConfig::default(), ledger.clone(), repos.clone());

        // Not running: manual_sync(1) rewinds to 0 and runs one cycle inline.
        sup.manual_sync(1).await.unwrap();

        assert_eq!(ledger.fetch_calls(), vec![(1, 100), (101, 200), (201, 250)]);
        assert_eq!(repos.cursor_writes(), vec![100, 200, 250]);
        assert_eq!(sup.status().cursor_height, 250);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_terminates_after_max_consecutive_failures() {
        let ledger = Arc::new(MemoryLedger::new(10));
        ledger.fail_head_calls();
        let repos = Arc::new(MemoryRepositories::new());
        let sup = supervisor(PollConfig::default(), ledger.clone(), repos.clone());

        sup.start();
        wait_for(|| !sup.status().running).await;

        // One head() per failed cycle, then nothing more.
        assert_eq!(ledger.head_call_count(), 5);
        assert_eq!(sup.status().failure_count, 5);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(ledger.head_call_count(), 5);

        // Restart is the only recovery path, and it polls again.
        sup.restart().await;
        wait_for(|| ledger.head_call_count() > 5).await;
        sup.stop();
        wait_for(|| !sup.status().running).await;
    }

    #[tokio::test(start_paused = true)]
    async fn loop_applies_events_and_resumes_from_persisted_cursor() {
        let ledger = Arc::new(MemoryLedger::new(3));
        ledger.push_event(raw_event(
            "tx1",
            0,
            1,
            "escrow_created",
            json!({ "escrow_id": "7", "amount": "50", "asset": "XLM", "creator": "GABC" }),
        ));
        ledger.push_event(raw_event(
            "tx2",
            0,
            2,
            "escrow_funded",
            json!({ "escrow_id": "7", "amount": "50", "funder": "GDEF" }),
        ));
        let repos = Arc::new(MemoryRepositories::new());
        repos.set_persisted_cursor(0);
        let sup = supervisor(PollConfig::default(), ledger.clone(), repos.clone());

        sup.start();
        wait_for(|| sup.status().cursor_height == 3).await;
        sup.stop();
        wait_for(|| !sup.status().running).await;

        let projection = repos.projection("7").unwrap();
        assert_eq!(projection.status, EscrowStatus::Active);
        assert_eq!(repos.event_save_count(), 2);
        // Head at the cursor: exactly one batch was needed.
        assert_eq!(ledger.fetch_calls(), vec![(1, 3)]);
    }

    // Test critique: un événement en échec est consigné et ignoré - le
    // reste du lot s'applique et le curseur avance quand même
    #[tokio::test]
    async fn failing_event_does_not_block_the_rest_of_the_batch() {
        let ledger = Arc::new(MemoryLedger::new(2));
        ledger.push_event(raw_event(
            "tx1",
            0,
            1,
            "escrow_created",
            json!({ "escrow_id": "1", "amount": "10", "creator": "GAAA" }),
        ));
        ledger.push_event(raw_event(
            "tx2",
            0,
            1,
            "escrow_created",
            json!({ "escrow_id": "2", "amount": "20", "creator": "GBBB" }),
        ));
        ledger.push_event(raw_event(
            "tx3",
            0,
            2,
            "escrow_funded",
            json!({ "escrow_id": "2", "amount": "20", "funder": "GCCC" }),
        ));
        let repos = Arc::new(MemoryRepositories::new());
        repos.fail_event_save("tx1");
        let sup = supervisor(PollConfig::default(), ledger.clone(), repos.clone());

        sup.manual_sync(1).await.unwrap();

        // The failing event left no trace, its batch-mates applied fully.
        assert!(repos.projection("1").is_none());
        assert_eq!(repos.projection("2").unwrap().status, EscrowStatus::Active);
        assert_eq!(repos.event_save_count(), 2);

        // The cycle itself is a success: cursor persisted, no failure.
        assert_eq!(repos.cursor_writes(), vec![2]);
        assert_eq!(sup.status().cursor_height, 2);
        assert_eq!(sup.status().failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_start_is_a_no_op() {
        let ledger = Arc::new(MemoryLedger::new(0));
        let repos = Arc::new(MemoryRepositories::new());
        let sup = supervisor(PollConfig::default(), ledger.clone(), repos.clone());

        sup.start();
        sup.start();
        assert!(sup.status().running);

        sup.stop();
        wait_for(|| !sup.status().running).await;
    }

    #[tokio::test(start_paused = true)]
    async fn successful_cycle_resets_failure_counter() {
        let ledger = Arc::new(MemoryLedger::new(5));
        let repos = Arc::new(MemoryRepositories::new());
        let sup = supervisor(PollConfig::default(), ledger.clone(), repos.clone());

        sup.start();
        wait_for(|| sup.status().cursor_height == 5).await;
        assert_eq!(sup.status().failure_count, 0);

        sup.stop();
        wait_for(|| !sup.status().running).await;
    }
}
