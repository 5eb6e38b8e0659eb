//! Domain models for ledger events, escrow projections and
//! reconciliation reports.
//!
//! These models are storage-agnostic and represent the canonical
//! form of synchronized data within the domain layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Event Kinds
// =============================================================================

/// Closed set of escrow contract event kinds.
///
/// The discriminator strings are the topic names emitted by the escrow
/// contract. Anything outside the closed table maps to [`EventKind::Unknown`]
/// carrying the raw discriminator, so unrecognized events are recorded for
/// audit instead of being dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Created,
    Funded,
    MilestoneReleased,
    Completed,
    Cancelled,
    DisputeCreated,
    DisputeResolved,
    /// Unrecognized discriminator, kept verbatim.
    Unknown(String),
}

impl EventKind {
    /// Map a contract topic discriminator to a kind.
    pub fn from_discriminator(name: &str) -> Self {
        match name {
            "escrow_created" => Self::Created,
            "escrow_funded" => Self::Funded,
            "milestone_released" => Self::MilestoneReleased,
            "escrow_completed" => Self::Completed,
            "escrow_cancelled" => Self::Cancelled,
            "dispute_created" => Self::DisputeCreated,
            "dispute_resolved" => Self::DisputeResolved,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Canonical string form (the contract topic name).
    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "escrow_created",
            Self::Funded => "escrow_funded",
            Self::MilestoneReleased => "milestone_released",
            Self::Completed => "escrow_completed",
            Self::Cancelled => "escrow_cancelled",
            Self::DisputeCreated => "dispute_created",
            Self::DisputeResolved => "dispute_resolved",
            Self::Unknown(name) => name,
        }
    }

    /// Whether this kind is outside the closed table.
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_discriminator(&s))
    }
}

// =============================================================================
// Ledger Events
// =============================================================================

/// Typed fields extracted from an event payload.
///
/// Every field is optional: extraction is total over the kind table and a
/// missing field is simply left absent. An absent `escrow_id` means the
/// event is recorded for audit but never reaches a projection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFields {
    pub escrow_id: Option<String>,
    /// Decimal amount string, Horizon convention.
    pub amount: Option<String>,
    pub asset: Option<String>,
    pub milestone_index: Option<u32>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub reason: Option<String>,
}

/// Immutable record of one contract-emitted event.
///
/// `(tx_hash, event_index)` is the natural unique key; observing the same
/// pair twice must be a no-op, never a duplicate row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Transaction hash (hex).
    pub tx_hash: String,
    /// Event index within the transaction.
    pub event_index: u32,
    /// Normalized event kind.
    pub kind: EventKind,
    /// Ledger height the event was emitted at.
    pub ledger: u64,
    /// Wall-clock timestamp of the ledger close.
    pub timestamp: DateTime<Utc>,
    /// Raw event payload, kept opaque for audit.
    pub payload: serde_json::Value,
    /// Fields extracted per kind.
    pub fields: EventFields,
}

// =============================================================================
// Escrow Projection
// =============================================================================

/// Escrow lifecycle status.
///
/// `Completed` and `Cancelled` are absorbing: no event observed after
/// reaching them may change the status again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscrowStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
    Disputed,
}

impl EscrowStatus {
    /// Whether this status is terminal (absorbing).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Disputed => "DISPUTED",
        }
    }
}

impl std::fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EscrowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "ACTIVE" => Ok(Self::Active),
            "COMPLETED" => Ok(Self::Completed),
            "CANCELLED" => Ok(Self::Cancelled),
            "DISPUTED" => Ok(Self::Disputed),
            other => Err(format!("unknown escrow status: {other}")),
        }
    }
}

/// Mutable current-state view of one escrow, derived from events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowProjection {
    /// Escrow identifier as emitted by the contract.
    pub id: String,
    pub status: EscrowStatus,
    /// Decimal amount string.
    pub amount: String,
    pub asset: String,
    /// Cleared when the escrow reaches a terminal status.
    pub is_active: bool,
    /// Originating address, when the creation event carried one.
    pub creator: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Ledger-side view of one escrow, restricted to the comparable fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainEscrow {
    pub id: String,
    pub status: EscrowStatus,
    pub amount: String,
    pub asset: Option<String>,
}

// =============================================================================
// Sync State
// =============================================================================

/// Snapshot of the poll supervisor state, exposed as the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub running: bool,
    /// Highest ledger whose events have been durably applied.
    pub cursor_height: u64,
    pub failure_count: u32,
}

// =============================================================================
// Reconciliation
// =============================================================================

/// A reconciliation request: explicit ids or an inclusive id range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CheckRequest {
    Ids(Vec<u64>),
    Range { from_id: u64, to_id: u64 },
}

/// One field that differs between the stored and ledger-side view.
///
/// Values are carried literally so the caller can render both sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMismatch {
    pub field_name: String,
    pub db_value: serde_json::Value,
    pub chain_value: serde_json::Value,
}

/// Per-escrow reconciliation outcome. Created fresh per call, never
/// persisted; owned by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowDiffReport {
    pub escrow_id: u64,
    pub is_consistent: bool,
    pub fields_mismatched: Vec<FieldMismatch>,
    #[serde(default)]
    pub missing_in_db: bool,
    #[serde(default)]
    pub missing_on_chain: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated counts over one reconciliation call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSummary {
    pub total_checked: usize,
    pub total_inconsistent: usize,
    pub total_missing_in_db: usize,
    pub total_missing_on_chain: usize,
    pub total_errored: usize,
}

/// Full result of one reconciliation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub reports: Vec<EscrowDiffReport>,
    pub summary: CheckSummary,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_discriminator_roundtrip() {
        for name in [
            "escrow_created",
            "escrow_funded",
            "milestone_released",
            "escrow_completed",
            "escrow_cancelled",
            "dispute_created",
            "dispute_resolved",
        ] {
            let kind = EventKind::from_discriminator(name);
            assert!(!kind.is_unknown());
            assert_eq!(kind.as_str(), name);
        }
    }

    #[test]
    fn unknown_kind_keeps_discriminator() {
        let kind = EventKind::from_discriminator("fee_bump");
        assert!(kind.is_unknown());
        assert_eq!(kind.as_str(), "fee_bump");
    }

    #[test]
    fn terminal_statuses() {
        assert!(EscrowStatus::Completed.is_terminal());
        assert!(EscrowStatus::Cancelled.is_terminal());
        assert!(!EscrowStatus::Pending.is_terminal());
        assert!(!EscrowStatus::Active.is_terminal());
        assert!(!EscrowStatus::Disputed.is_terminal());
    }

    #[test]
    fn status_string_roundtrip() {
        for status in [
            EscrowStatus::Pending,
            EscrowStatus::Active,
            EscrowStatus::Completed,
            EscrowStatus::Cancelled,
            EscrowStatus::Disputed,
        ] {
            assert_eq!(status.as_str().parse::<EscrowStatus>(), Ok(status));
        }
        assert!("SETTLED".parse::<EscrowStatus>().is_err());
    }

    #[test]
    fn status_serializes_to_screaming_snake() {
        let json = serde_json::to_value(EscrowStatus::Active).unwrap();
        assert_eq!(json, serde_json::json!("ACTIVE"));
    }
}
