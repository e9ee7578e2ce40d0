//! Advisory ledger metadata cached from `ledgerClosed` events

use serde_json::Value;
use std::time::Instant;

/// Last known ledger close, as reported by the server
///
/// Purely informational: fields are overwritten on every `ledgerClosed` event
/// and may be arbitrarily stale between events or while reconnecting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerSnapshot {
    pub ledger_index: Option<u64>,
    pub ledger_hash: Option<String>,
    pub ledger_time: Option<u64>,
    pub fee_base: Option<u64>,
    pub fee_ref: Option<u64>,
    pub reserve_base: Option<u64>,
    pub reserve_inc: Option<u64>,
    pub txn_count: Option<u64>,
    /// When the event that produced this snapshot arrived
    pub received_at: Option<Instant>,
}

impl LedgerSnapshot {
    /// Overwrite the snapshot from a `ledgerClosed` event
    pub fn update_from(&mut self, data: &Value) {
        self.ledger_index = data.get("ledger_index").and_then(Value::as_u64);
        self.ledger_hash = data.get("ledger_hash").and_then(Value::as_str).map(str::to_owned);
        self.ledger_time = data.get("ledger_time").and_then(Value::as_u64);
        self.fee_base = data.get("fee_base").and_then(Value::as_u64);
        self.fee_ref = data.get("fee_ref").and_then(Value::as_u64);
        self.reserve_base = data.get("reserve_base").and_then(Value::as_u64);
        self.reserve_inc = data.get("reserve_inc").and_then(Value::as_u64);
        self.txn_count = data.get("txn_count").and_then(Value::as_u64);
        self.received_at = Some(Instant::now());
    }

    /// Whether any ledger close has been seen
    pub fn is_known(&self) -> bool {
        self.ledger_index.is_some()
    }
}
