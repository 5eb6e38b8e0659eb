//! Event classification and field extraction.
//!
//! Normalization is a pure, total function from a raw contract event to a
//! storable [`LedgerEvent`]. The discriminator is looked up against the
//! closed kind table; anything unmatched becomes [`EventKind::Unknown`]
//! carrying the raw payload - logged, never fatal. For known kinds a fixed
//! per-kind field set is extracted; a missing optional field stays absent.

use tracing::warn;

use crate::metrics::record_event_unknown;
use crate::models::{EventFields, EventKind, LedgerEvent};
use crate::ports::RawLedgerEvent;

/// Normalize one raw contract event.
///
/// Never fails: malformed payloads degrade to absent fields, and unknown
/// discriminators are preserved for later inspection.
pub fn normalize(raw: &RawLedgerEvent) -> LedgerEvent {
    let kind = EventKind::from_discriminator(&raw.name);

    if kind.is_unknown() {
        warn!(
            tx = %raw.tx_hash,
            index = raw.event_index,
            discriminator = %raw.name,
            "Unknown event discriminator, recording as-is"
        );
        record_event_unknown();
    }

    let fields = extract_fields(&kind, &raw.payload);

    LedgerEvent {
        tx_hash: raw.tx_hash.clone(),
        event_index: raw.event_index,
        kind,
        ledger: raw.ledger,
        timestamp: raw.closed_at,
        payload: raw.payload.clone(),
        fields,
    }
}

/// Extract the fixed field set for a kind from the event payload.
///
/// Total over the kind table: every arm reads exactly the fields the
/// contract emits for that event, nothing is probed speculatively.
fn extract_fields(kind: &EventKind, payload: &serde_json::Value) -> EventFields {
    let mut fields = EventFields {
        escrow_id: str_field(payload, "escrow_id"),
        ..EventFields::default()
    };

    match kind {
        EventKind::Created => {
            fields.amount = amount_field(payload, "amount");
            fields.asset = str_field(payload, "asset");
            fields.from_address = str_field(payload, "creator");
        }
        EventKind::Funded => {
            fields.amount = amount_field(payload, "amount");
            fields.asset = str_field(payload, "asset");
            fields.from_address = str_field(payload, "funder");
        }
        EventKind::MilestoneReleased => {
            fields.milestone_index = u32_field(payload, "milestone_index");
            fields.amount = amount_field(payload, "amount");
            fields.to_address = str_field(payload, "recipient");
        }
        EventKind::Completed => {
            fields.to_address = str_field(payload, "recipient");
        }
        EventKind::Cancelled => {
            fields.reason = str_field(payload, "reason");
        }
        EventKind::DisputeCreated => {
            fields.from_address = str_field(payload, "disputant");
            fields.reason = str_field(payload, "reason");
        }
        EventKind::DisputeResolved => {
            fields.reason = str_field(payload, "resolution");
        }
        EventKind::Unknown(_) => {
            // Payload shape is unknown; keep only the raw payload, which
            // the caller stores verbatim.
            fields.escrow_id = None;
        }
    }

    fields
}

fn str_field(payload: &serde_json::Value, key: &str) -> Option<String> {
    payload.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

/// Amounts arrive either as decimal strings (Horizon convention) or as
/// raw integers from older contract builds; both canonicalize to a string.
fn amount_field(payload: &serde_json::Value, key: &str) -> Option<String> {
    match payload.get(key) {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn u32_field(payload: &serde_json::Value, key: &str) -> Option<u32> {
    payload
        .get(key)
        .and_then(|v| v.as_u64())
        .and_then(|v| u32::try_from(v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::raw_event;
    use serde_json::json;

    #[test]
    fn created_event_extracts_full_field_set() {
        let raw = raw_event(
            "abc123",
            0,
            10,
            "escrow_created",
            json!({
                "escrow_id": "42",
                "amount": "150.5000000",
                "asset": "USDC",
                "creator": "GCREATOR",
            }),
        );

        let event = normalize(&raw);

        assert_eq!(event.kind, EventKind::Created);
        assert_eq!(event.fields.escrow_id.as_deref(), Some("42"));
        assert_eq!(event.fields.amount.as_deref(), Some("150.5000000"));
        assert_eq!(event.fields.asset.as_deref(), Some("USDC"));
        assert_eq!(event.fields.from_address.as_deref(), Some("GCREATOR"));
        assert_eq!(event.fields.to_address, None);
    }

    #[test]
    fn numeric_amount_is_canonicalized_to_string() {
        let raw = raw_event(
            "abc123",
            0,
            10,
            "escrow_funded",
            json!({ "escrow_id": "42", "amount": 100, "funder": "GFUNDER" }),
        );

        let event = normalize(&raw);
        assert_eq!(event.fields.amount.as_deref(), Some("100"));
        assert_eq!(event.fields.from_address.as_deref(), Some("GFUNDER"));
    }

    #[test]
    fn milestone_released_extracts_index_and_recipient() {
        let raw = raw_event(
            "abc123",
            2,
            11,
            "milestone_released",
            json!({
                "escrow_id": "42",
                "milestone_index": 3,
                "amount": "25",
                "recipient": "GRECIPIENT",
            }),
        );

        let event = normalize(&raw);
        assert_eq!(event.kind, EventKind::MilestoneReleased);
        assert_eq!(event.fields.milestone_index, Some(3));
        assert_eq!(event.fields.to_address.as_deref(), Some("GRECIPIENT"));
    }

    #[test]
    fn out_of_range_milestone_index_degrades_to_absent() {
        let raw = raw_event(
            "abc123",
            0,
            11,
            "milestone_released",
            json!({ "escrow_id": "42", "milestone_index": 4_294_967_296u64 }),
        );

        let event = normalize(&raw);
        assert_eq!(event.fields.milestone_index, None);
    }

    #[test]
    fn dispute_resolved_maps_resolution_to_reason() {
        let raw = raw_event(
            "abc123",
            0,
            12,
            "dispute_resolved",
            json!({ "escrow_id": "42", "resolution": "refund issued" }),
        );

        let event = normalize(&raw);
        assert_eq!(event.kind, EventKind::DisputeResolved);
        assert_eq!(event.fields.reason.as_deref(), Some("refund issued"));
    }

    #[test]
    fn missing_optional_fields_stay_absent() {
        let raw = raw_event(
            "abc123",
            0,
            10,
            "escrow_cancelled",
            json!({ "escrow_id": "42" }),
        );

        let event = normalize(&raw);
        assert_eq!(event.fields.escrow_id.as_deref(), Some("42"));
        assert_eq!(event.fields.reason, None);
    }

    #[test]
    fn unknown_discriminator_keeps_payload_and_drops_fields() {
        let payload = json!({ "escrow_id": "42", "something": "else" });
        let raw = raw_event("abc123", 0, 10, "fee_charged", payload.clone());

        let event = normalize(&raw);
        assert!(event.kind.is_unknown());
        assert_eq!(event.kind.as_str(), "fee_charged");
        assert_eq!(event.payload, payload);
        // Unknown shapes are never speculatively probed for an escrow id.
        assert_eq!(event.fields.escrow_id, None);
    }
}
