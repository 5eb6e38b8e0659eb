//! Soroban JSON-RPC client implementing the LedgerSource port.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument, trace, warn};

use concord_core::error::{ChainError, ChainResult};
use concord_core::models::ChainEscrow;
use concord_core::ports::{LedgerSource, RawLedgerEvent};

/// Page size requested from `getEvents`. The RPC caps at 10000; a smaller
/// page keeps individual responses cheap to parse.
const EVENTS_PAGE_LIMIT: u32 = 200;

/// Wall-clock budget for fetching one ledger range, all pages included.
const RANGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the Soroban client.
#[derive(Debug, Clone)]
pub struct SorobanClientConfig {
    /// HTTP URL of the Soroban RPC endpoint.
    pub rpc_url: String,
    /// C-address of the escrow contract whose events are fetched.
    pub contract_id: String,
}

impl Default for SorobanClientConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8000/soroban/rpc".to_string(),
            contract_id: String::new(),
        }
    }
}

/// Soroban RPC adapter implementing the LedgerSource port.
pub struct SorobanClient {
    http: reqwest::Client,
    rpc_url: String,
    contract_id: String,
    next_request_id: AtomicU64,
}

impl SorobanClient {
    /// Build a client for the configured endpoint.
    pub fn new(config: SorobanClientConfig) -> ChainResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| ChainError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            http,
            rpc_url: config.rpc_url,
            contract_id: config.contract_id,
            next_request_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> ChainResult<T> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_request_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        trace!(method, "RPC call");

        let response = self
            .http
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChainError::ConnectionFailed(e.to_string()))?;

        let body: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(ChainError::RpcError(format!(
                "{} (code {})",
                error.message, error.code
            )));
        }

        body.result
            .ok_or_else(|| ChainError::InvalidResponse("missing result field".to_string()))
    }

    /// Fetch every event page for `[from, to]`, following cursors.
    async fn collect_range(&self, from: u64, to: u64) -> ChainResult<Vec<RawLedgerEvent>> {
        let mut events = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            // The RPC rejects startLedger once a cursor is supplied, so
            // follow-up pages carry the cursor alone.
            let pagination = match &cursor {
                Some(c) => json!({ "limit": EVENTS_PAGE_LIMIT, "cursor": c }),
                None => json!({ "limit": EVENTS_PAGE_LIMIT }),
            };
            let mut params = json!({
                "endLedger": to,
                "filters": [{
                    "type": "contract",
                    "contractIds": [self.contract_id],
                }],
                "pagination": pagination,
                "xdrFormat": "json",
            });
            if cursor.is_none() {
                params["startLedger"] = json!(from);
            }

            let page: GetEventsResult = self.call("getEvents", params).await?;
            let page_len = page.events.len();

            for envelope in page.events {
                if envelope.in_successful_contract_call == Some(false) {
                    continue;
                }
                events.push(envelope.into_raw()?);
            }

            match page.cursor {
                Some(next) if page_len as u32 == EVENTS_PAGE_LIMIT => cursor = Some(next),
                _ => break,
            }
        }

        Ok(events)
    }
}

#[async_trait]
impl LedgerSource for SorobanClient {
    async fn head(&self) -> ChainResult<u64> {
        let latest: LatestLedgerResult = self.call("getLatestLedger", json!({})).await?;
        Ok(latest.sequence)
    }

    #[instrument(skip(self))]
    async fn fetch_range(&self, from: u64, to: u64) -> ChainResult<Vec<RawLedgerEvent>> {
        let events = tokio::time::timeout(RANGE_TIMEOUT, self.collect_range(from, to))
            .await
            .map_err(|_| ChainError::Timeout { from, to })??;

        debug!(from, to, count = events.len(), "Fetched ledger range");

        Ok(events)
    }

    async fn fetch_escrow(&self, escrow_id: &str) -> ChainResult<Option<ChainEscrow>> {
        let key = json!({
            "contract_data": {
                "contract": self.contract_id,
                "key": { "vec": [{ "symbol": "Escrow" }, { "string": escrow_id }] },
                "durability": "persistent",
            }
        });

        let result: GetLedgerEntriesResult = self
            .call(
                "getLedgerEntries",
                json!({ "keys": [key], "xdrFormat": "json" }),
            )
            .await?;

        let Some(entry) = result.entries.into_iter().next() else {
            return Ok(None);
        };

        let val = &entry.data_json["contract_data"]["val"];
        parse_escrow_entry(escrow_id, val).map(Some)
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct LatestLedgerResult {
    sequence: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetEventsResult {
    #[serde(default)]
    events: Vec<EventEnvelope>,
    cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventEnvelope {
    /// "<toid>-<event index>" as assigned by the RPC.
    id: String,
    ledger: u64,
    ledger_closed_at: DateTime<Utc>,
    tx_hash: String,
    #[serde(default)]
    topic_json: Vec<Value>,
    #[serde(default)]
    value_json: Value,
    in_successful_contract_call: Option<bool>,
}

impl EventEnvelope {
    fn into_raw(self) -> ChainResult<RawLedgerEvent> {
        let event_index = event_index_from_id(&self.id)
            .ok_or_else(|| ChainError::InvalidResponse(format!("malformed event id: {}", self.id)))?;

        let name = match topic_name(&self.topic_json) {
            Some(name) => name,
            None => {
                warn!(id = %self.id, "Event without a symbol topic");
                String::new()
            }
        };

        Ok(RawLedgerEvent {
            tx_hash: self.tx_hash,
            event_index,
            ledger: self.ledger,
            closed_at: self.ledger_closed_at,
            name,
            payload: self.value_json,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetLedgerEntriesResult {
    #[serde(default)]
    entries: Vec<LedgerEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerEntry {
    data_json: Value,
}

// =============================================================================
// Decoding
// =============================================================================

/// Extract the event index from an RPC event id ("<toid>-<index>").
fn event_index_from_id(id: &str) -> Option<u32> {
    id.rsplit_once('-')?.1.parse().ok()
}

/// First symbol topic of the event, used as the discriminator.
fn topic_name(topics: &[Value]) -> Option<String> {
    let first = topics.first()?;
    first["symbol"]
        .as_str()
        .or_else(|| first.as_str())
        .map(str::to_string)
}

/// Decode an escrow contract storage value into a ChainEscrow.
fn parse_escrow_entry(escrow_id: &str, val: &Value) -> ChainResult<ChainEscrow> {
    let status_val = scval_map_get(val, "status")
        .ok_or_else(|| ChainError::InvalidResponse("escrow entry without status".to_string()))?;
    let status_str = scval_string(status_val)
        .ok_or_else(|| ChainError::InvalidResponse("non-string escrow status".to_string()))?;
    let status = status_str
        .parse()
        .map_err(ChainError::InvalidResponse)?;

    let amount = scval_map_get(val, "amount")
        .and_then(scval_amount)
        .ok_or_else(|| ChainError::InvalidResponse("escrow entry without amount".to_string()))?;

    let asset = scval_map_get(val, "asset").and_then(scval_string);

    Ok(ChainEscrow {
        id: escrow_id.to_string(),
        status,
        amount,
        asset,
    })
}

/// Look up one entry of an ScVal map by its symbol or string key.
fn scval_map_get<'a>(val: &'a Value, name: &str) -> Option<&'a Value> {
    val["map"].as_array()?.iter().find_map(|entry| {
        let key = scval_string(&entry["key"])?;
        (key == name).then(|| &entry["val"])
    })
}

/// String content of an ScVal, whichever textual arm it uses.
fn scval_string(val: &Value) -> Option<String> {
    val["symbol"]
        .as_str()
        .or_else(|| val["string"].as_str())
        .or_else(|| val.as_str())
        .map(str::to_string)
}

/// Amount content of an ScVal as a decimal string.
///
/// The i128 arm serializes as a string in XDR-JSON; smaller integer arms
/// come through as JSON numbers.
fn scval_amount(val: &Value) -> Option<String> {
    if let Some(s) = val["i128"].as_str() {
        return Some(s.to_string());
    }
    if let Some(n) = val["u64"].as_u64().or_else(|| val["u32"].as_u64()) {
        return Some(n.to_string());
    }
    if let Some(s) = val.as_str() {
        return Some(s.to_string());
    }
    val.as_u64().map(|n| n.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    use concord_core::models::EscrowStatus;

    #[test]
    fn parses_event_index_from_rpc_id() {
        assert_eq!(event_index_from_id("0004660039930473-0000000002"), Some(2));
        assert_eq!(event_index_from_id("0000000000000001-0000000000"), Some(0));
        assert_eq!(event_index_from_id("not-an-index"), None);
        assert_eq!(event_index_from_id("noseparator"), None);
    }

    #[test]
    fn extracts_discriminator_from_symbol_topic() {
        let topics = vec![json!({ "symbol": "escrow_created" }), json!({ "string": "esc-1" })];
        assert_eq!(topic_name(&topics), Some("escrow_created".to_string()));

        // Certains RPC renvoient le topic comme chaine nue.
        let topics = vec![json!("escrow_funded")];
        assert_eq!(topic_name(&topics), Some("escrow_funded".to_string()));

        assert_eq!(topic_name(&[]), None);
    }

    #[test]
    fn event_envelope_converts_to_raw_event() {
        let envelope: EventEnvelope = serde_json::from_value(json!({
            "id": "0004660039930473-0000000001",
            "ledger": 51230,
            "ledgerClosedAt": "2025-06-01T12:00:00Z",
            "txHash": "ab12",
            "topicJson": [{ "symbol": "milestone_released" }],
            "valueJson": { "map": [] },
            "inSuccessfulContractCall": true
        }))
        .unwrap();

        let raw = envelope.into_raw().unwrap();
        assert_eq!(raw.tx_hash, "ab12");
        assert_eq!(raw.event_index, 1);
        assert_eq!(raw.ledger, 51230);
        assert_eq!(raw.name, "milestone_released");
    }

    #[test]
    fn malformed_event_id_is_an_invalid_response() {
        let envelope: EventEnvelope = serde_json::from_value(json!({
            "id": "garbage",
            "ledger": 1,
            "ledgerClosedAt": "2025-06-01T12:00:00Z",
            "txHash": "ab12",
        }))
        .unwrap();

        assert!(matches!(
            envelope.into_raw(),
            Err(ChainError::InvalidResponse(_))
        ));
    }

    #[test]
    fn parses_escrow_storage_entry() {
        let val = json!({
            "map": [
                { "key": { "symbol": "status" }, "val": { "symbol": "ACTIVE" } },
                { "key": { "symbol": "amount" }, "val": { "i128": "2500000000" } },
                { "key": { "symbol": "asset" }, "val": { "string": "USDC" } },
            ]
        });

        let escrow = parse_escrow_entry("esc-7", &val).unwrap();
        assert_eq!(escrow.id, "esc-7");
        assert_eq!(escrow.status, EscrowStatus::Active);
        assert_eq!(escrow.amount, "2500000000");
        assert_eq!(escrow.asset.as_deref(), Some("USDC"));
    }

    #[test]
    fn escrow_entry_without_status_is_rejected() {
        let val = json!({
            "map": [
                { "key": { "symbol": "amount" }, "val": { "i128": "100" } },
            ]
        });

        assert!(matches!(
            parse_escrow_entry("esc-7", &val),
            Err(ChainError::InvalidResponse(_))
        ));
    }

    #[test]
    fn amount_accepts_integer_arms() {
        assert_eq!(scval_amount(&json!({ "u64": 42 })), Some("42".to_string()));
        assert_eq!(scval_amount(&json!({ "u32": 7 })), Some("7".to_string()));
        assert_eq!(scval_amount(&json!("1000")), Some("1000".to_string()));
        assert_eq!(scval_amount(&json!({ "bool": true })), None);
    }
}
