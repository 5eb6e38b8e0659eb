//! Store-vs-ledger consistency checking.
//!
//! The engine resolves the stored projection and the ledger-side state of
//! each requested escrow independently and reports field-level divergence.
//! It never mutates either side. Ids are processed strictly sequentially:
//! error isolation per id matters more here than throughput, and it keeps
//! the RPC load on the ledger endpoint bounded.

use std::sync::Arc;

use tracing::{debug, error, instrument};

use crate::error::{ReconcileError, ReconcileResult};
use crate::metrics::record_reconciliation;
use crate::models::{
    ChainEscrow, CheckOutcome, CheckRequest, CheckSummary, EscrowDiffReport, EscrowProjection,
    FieldMismatch,
};
use crate::ports::{LedgerSource, Repositories};

/// Configuration for the reconciliation engine.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Hard cap on the number of escrows per request.
    pub max_targets: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self { max_targets: 50 }
    }
}

/// Compares stored projections against ledger truth for requested escrows.
pub struct ReconciliationEngine<L, R>
where
    L: LedgerSource,
    R: Repositories,
{
    config: ReconcileConfig,
    ledger: Arc<L>,
    repos: Arc<R>,
}

impl<L, R> ReconciliationEngine<L, R>
where
    L: LedgerSource,
    R: Repositories,
{
    pub fn new(config: ReconcileConfig, ledger: Arc<L>, repos: Arc<R>) -> Self {
        Self {
            config,
            ledger,
            repos,
        }
    }

    /// Run one consistency check.
    ///
    /// Request validation happens before any lookup: an inverted range or
    /// an id set above the cap is rejected as a caller error. After that,
    /// a failure while processing one id is confined to that id's report
    /// entry and never aborts the rest of the batch.
    #[instrument(skip_all)]
    pub async fn check(&self, request: CheckRequest) -> ReconcileResult<CheckOutcome> {
        let ids = self.resolve_ids(request)?;
        debug!(targets = ids.len(), "Starting consistency check");

        let mut reports = Vec::with_capacity(ids.len());
        let mut summary = CheckSummary {
            total_checked: ids.len(),
            ..CheckSummary::default()
        };

        for id in ids {
            let report = match self.check_one(id).await {
                Ok(report) => report,
                Err(e) => {
                    error!(escrow = id, error = %e, "Consistency check errored for escrow");
                    summary.total_errored += 1;
                    EscrowDiffReport {
                        escrow_id: id,
                        is_consistent: false,
                        fields_mismatched: Vec::new(),
                        missing_in_db: false,
                        missing_on_chain: false,
                        error: Some(e.to_string()),
                    }
                }
            };

            if report.missing_in_db {
                summary.total_missing_in_db += 1;
            }
            if report.missing_on_chain {
                summary.total_missing_on_chain += 1;
            }
            if !report.fields_mismatched.is_empty() {
                summary.total_inconsistent += 1;
            }
            reports.push(report);
        }

        record_reconciliation(
            summary.total_checked as u64,
            reports.iter().filter(|r| !r.is_consistent).count() as u64,
        );

        Ok(CheckOutcome { reports, summary })
    }

    /// Resolve and validate the requested id set.
    fn resolve_ids(&self, request: CheckRequest) -> ReconcileResult<Vec<u64>> {
        let max = self.config.max_targets;

        match request {
            CheckRequest::Ids(ids) => {
                if ids.len() > max {
                    return Err(ReconcileError::TooManyTargets {
                        requested: ids.len(),
                        max,
                    });
                }
                Ok(ids)
            }
            CheckRequest::Range { from_id, to_id } => {
                if from_id > to_id {
                    return Err(ReconcileError::InvalidRange {
                        from: from_id,
                        to: to_id,
                    });
                }
                // The cap is checked arithmetically so an absurd range is
                // rejected before a single id is materialized.
                let span = to_id - from_id;
                if span >= max as u64 {
                    return Err(ReconcileError::TooManyTargets {
                        requested: span.saturating_add(1) as usize,
                        max,
                    });
                }
                Ok((from_id..=to_id).collect())
            }
        }
    }

    /// Check one escrow. Lookup failures on either side are classified as
    /// "missing" rather than propagated; only unexpected errors (e.g.
    /// value serialization) bubble up to become an errored report.
    async fn check_one(&self, id: u64) -> ReconcileResult<EscrowDiffReport> {
        let key = id.to_string();

        let stored = self.repos.projections().find(&key).await.ok().flatten();
        let on_chain = self.ledger.fetch_escrow(&key).await.ok().flatten();

        let report = match (stored, on_chain) {
            (None, None) => EscrowDiffReport {
                escrow_id: id,
                is_consistent: false,
                fields_mismatched: Vec::new(),
                missing_in_db: true,
                missing_on_chain: true,
                error: None,
            },
            (None, Some(_)) => EscrowDiffReport {
                escrow_id: id,
                is_consistent: false,
                fields_mismatched: Vec::new(),
                missing_in_db: true,
                missing_on_chain: false,
                error: None,
            },
            (Some(_), None) => EscrowDiffReport {
                escrow_id: id,
                is_consistent: false,
                fields_mismatched: Vec::new(),
                missing_in_db: false,
                missing_on_chain: true,
                error: None,
            },
            (Some(projection), Some(escrow)) => {
                let mismatches = compare_escrow(&projection, &escrow)?;
                EscrowDiffReport {
                    escrow_id: id,
                    is_consistent: mismatches.is_empty(),
                    fields_mismatched: mismatches,
                    missing_in_db: false,
                    missing_on_chain: false,
                    error: None,
                }
            }
        };

        Ok(report)
    }
}

/// Compare the fixed comparable field set, carrying literal values from
/// both sides into every mismatch.
fn compare_escrow(
    stored: &EscrowProjection,
    on_chain: &ChainEscrow,
) -> ReconcileResult<Vec<FieldMismatch>> {
    let mut mismatches = Vec::new();

    if stored.status != on_chain.status {
        mismatches.push(mismatch("status", &stored.status, &on_chain.status)?);
    }
    if stored.amount != on_chain.amount {
        mismatches.push(mismatch("amount", &stored.amount, &on_chain.amount)?);
    }
    // The ledger side may not report an asset; only a differing asset is
    // a divergence, an absent one is not.
    if let Some(asset) = &on_chain.asset {
        if &stored.asset != asset {
            mismatches.push(mismatch("asset", &stored.asset, asset)?);
        }
    }

    Ok(mismatches)
}

fn mismatch<D, C>(field: &str, db: &D, chain: &C) -> ReconcileResult<FieldMismatch>
where
    D: serde::Serialize,
    C: serde::Serialize,
{
    let to_value = |v: Result<serde_json::Value, serde_json::Error>| {
        v.map_err(|e| crate::error::StorageError::SerializationError(e.to_string()))
    };
    Ok(FieldMismatch {
        field_name: field.to_string(),
        db_value: to_value(serde_json::to_value(db))?,
        chain_value: to_value(serde_json::to_value(chain))?,
    })
}
