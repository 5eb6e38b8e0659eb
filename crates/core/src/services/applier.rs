//! Escrow lifecycle state machine.
//!
//! The applier takes one normalized [`LedgerEvent`] and applies it to the
//! escrow projection idempotently. The status transitions live in
//! [`plan`], a pure function over `(current status, event kind)` pairs
//! that is exhaustively enumerated - any pair not listed is a no-op.

use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::error::DomainResult;
use crate::metrics::{record_event_duplicate, record_event_ingested, record_transition};
use crate::models::{EscrowProjection, EscrowStatus, EventKind, LedgerEvent};
use crate::ports::Repositories;

// =============================================================================
// Transition Table
// =============================================================================

/// What a `(status, kind)` pair requires of the projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Create the projection in `Pending`.
    Create,
    /// Move to a new status, optionally clearing the active flag.
    Transition {
        to: EscrowStatus,
        clear_active: bool,
    },
    /// Record as an audit side-effect only, no projection change.
    Audit,
    /// Nothing to do.
    NoOp,
}

/// The escrow transition table.
///
/// `current` is `None` when no projection exists yet. Terminal absorption
/// is enforced here: once `Completed` or `Cancelled`, every kind maps to
/// [`Action::NoOp`] except the audit-only `MilestoneReleased`.
pub fn plan(current: Option<EscrowStatus>, kind: &EventKind) -> Action {
    use EscrowStatus::*;

    match (current, kind) {
        (None, EventKind::Created) => Action::Create,
        // Idempotent replay of a creation event.
        (Some(_), EventKind::Created) => Action::NoOp,

        (Some(Pending), EventKind::Funded) => Action::Transition {
            to: Active,
            clear_active: false,
        },

        (_, EventKind::MilestoneReleased) => Action::Audit,

        (Some(s), EventKind::Completed) if !s.is_terminal() => Action::Transition {
            to: Completed,
            clear_active: true,
        },
        (Some(s), EventKind::Cancelled) if !s.is_terminal() => Action::Transition {
            to: Cancelled,
            clear_active: true,
        },

        (Some(Active), EventKind::DisputeCreated) => Action::Transition {
            to: Disputed,
            clear_active: false,
        },
        // Resolving a dispute returns the escrow to Active; completion or
        // cancellation is signalled by its own subsequent event.
        (Some(Disputed), EventKind::DisputeResolved) => Action::Transition {
            to: Active,
            clear_active: false,
        },

        _ => Action::NoOp,
    }
}

// =============================================================================
// EventApplier
// =============================================================================

/// Outcome of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Event persisted and projection effects applied.
    Applied,
    /// `(tx_hash, event_index)` was already recorded; nothing changed.
    Duplicate,
    /// Event persisted for audit only (unknown kind or no escrow id).
    Recorded,
}

/// Applies normalized events to escrow projections, idempotently.
pub struct EventApplier<R: Repositories> {
    repos: Arc<R>,
}

impl<R: Repositories> EventApplier<R> {
    pub fn new(repos: Arc<R>) -> Self {
        Self { repos }
    }

    /// Apply one event.
    ///
    /// The duplicate check on `(tx_hash, event_index)` runs before any
    /// mutation, so replaying an already-applied event returns
    /// [`ApplyOutcome::Duplicate`] without re-deriving projection effects.
    pub async fn apply(&self, event: &LedgerEvent) -> DomainResult<ApplyOutcome> {
        if self
            .repos
            .events()
            .find(&event.tx_hash, event.event_index)
            .await?
            .is_some()
        {
            trace!(tx = %event.tx_hash, index = event.event_index, "Event already processed");
            record_event_duplicate();
            return Ok(ApplyOutcome::Duplicate);
        }

        self.repos.events().save(event).await?;
        record_event_ingested(event.kind.as_str());

        if event.kind.is_unknown() {
            return Ok(ApplyOutcome::Recorded);
        }
        let Some(escrow_id) = event.fields.escrow_id.as_deref() else {
            // Recorded for audit; there is no projection to target.
            debug!(tx = %event.tx_hash, kind = %event.kind, "Event carries no escrow id");
            return Ok(ApplyOutcome::Recorded);
        };

        let current = self.repos.projections().find(escrow_id).await?;

        match plan(current.as_ref().map(|p| p.status), &event.kind) {
            Action::Create => {
                let projection = projection_from_event(escrow_id, event);
                self.repos.projections().save(&projection).await?;
                record_transition(EscrowStatus::Pending.as_str());
                info!(escrow = escrow_id, "🆕 Escrow created from ledger");
            }
            Action::Transition { to, clear_active } => {
                // `plan` only yields a transition when a projection exists.
                let Some(mut projection) = current else {
                    debug!(escrow = escrow_id, kind = %event.kind, "No projection to transition");
                    return Ok(ApplyOutcome::Recorded);
                };
                let from = projection.status;
                projection.status = to;
                if clear_active {
                    projection.is_active = false;
                }
                projection.updated_at = event.timestamp;
                self.repos.projections().save(&projection).await?;
                record_transition(to.as_str());
                info!(escrow = escrow_id, %from, %to, "Escrow status updated");
            }
            Action::Audit => {
                info!(
                    escrow = escrow_id,
                    milestone = event.fields.milestone_index,
                    "Milestone released"
                );
            }
            Action::NoOp => {
                trace!(escrow = escrow_id, kind = %event.kind, "No transition for event");
            }
        }

        Ok(ApplyOutcome::Applied)
    }
}

/// Build a fresh `Pending` projection from a creation event.
fn projection_from_event(escrow_id: &str, event: &LedgerEvent) -> EscrowProjection {
    EscrowProjection {
        id: escrow_id.to_string(),
        status: EscrowStatus::Pending,
        amount: event.fields.amount.clone().unwrap_or_else(|| "0".into()),
        asset: event.fields.asset.clone().unwrap_or_else(|| "XLM".into()),
        is_active: true,
        creator: event.fields.from_address.clone(),
        created_at: event.timestamp,
        updated_at: event.timestamp,
    }
}
