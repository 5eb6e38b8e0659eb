//! Metrics definitions for the synchronizer.
//!
//! This module defines all metrics used throughout the synchronizer.
//! Metrics are collected using the `metrics` crate and can be exported
//! to Prometheus via `metrics-exporter-prometheus`.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

/// Initialize all metric descriptions.
/// Call this once at startup before any metrics are recorded.
pub fn init_metrics() {
    describe_counter!(
        "events_ingested_total",
        "Total number of ledger events persisted"
    );
    describe_counter!(
        "events_duplicate_total",
        "Total number of already-seen events skipped on replay"
    );
    describe_counter!(
        "events_unknown_total",
        "Total number of events with an unrecognized discriminator"
    );
    describe_counter!(
        "escrow_transitions_total",
        "Total number of escrow status transitions applied"
    );
    describe_counter!(
        "batches_applied_total",
        "Total number of ledger batches durably applied"
    );
    describe_histogram!(
        "batch_apply_duration_seconds",
        "Time taken to fetch and apply one ledger batch in seconds"
    );
    describe_counter!(
        "poll_cycle_failures_total",
        "Total number of failed poll cycles"
    );
    describe_counter!(
        "reconciliation_checks_total",
        "Total number of escrows checked for consistency"
    );
    describe_counter!(
        "reconciliation_inconsistent_total",
        "Total number of escrows found inconsistent"
    );
}

/// Record a persisted ledger event.
///
/// # Arguments
/// * `kind` - The normalized event kind string
pub fn record_event_ingested(kind: &str) {
    counter!("events_ingested_total", "kind" => kind.to_string()).increment(1);
}

/// Record a duplicate event skipped during replay.
pub fn record_event_duplicate() {
    counter!("events_duplicate_total").increment(1);
}

/// Record an event with an unknown discriminator.
pub fn record_event_unknown() {
    counter!("events_unknown_total").increment(1);
}

/// Record an applied escrow status transition.
///
/// # Arguments
/// * `to` - The status the escrow moved to
pub fn record_transition(to: &str) {
    counter!("escrow_transitions_total", "to" => to.to_string()).increment(1);
}

/// Record a durably applied ledger batch.
pub fn record_batch_applied() {
    counter!("batches_applied_total").increment(1);
}

/// Record the duration of one batch fetch-and-apply.
pub fn record_batch_duration(duration_secs: f64) {
    histogram!("batch_apply_duration_seconds").record(duration_secs);
}

/// Record a failed poll cycle.
pub fn record_cycle_failure() {
    counter!("poll_cycle_failures_total").increment(1);
}

/// Record reconciliation results.
///
/// # Arguments
/// * `checked` - Number of escrows checked in the call
/// * `inconsistent` - Number of escrows found inconsistent
pub fn record_reconciliation(checked: u64, inconsistent: u64) {
    counter!("reconciliation_checks_total").increment(checked);
    counter!("reconciliation_inconsistent_total").increment(inconsistent);
}

/// A timer that automatically records batch duration when dropped.
pub struct BatchTimer {
    start: Instant,
}

impl BatchTimer {
    /// Start a new batch timer.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for BatchTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BatchTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        record_batch_duration(duration);
    }
}
