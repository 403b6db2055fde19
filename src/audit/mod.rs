//! Append-only audit trail.
//!
//! Every order attempt produces exactly one entry carrying the fully
//! resolved parameters that were actually sent to the broker. Entries are
//! never mutated after creation. Delivery to subscribers is fire-and-forget
//! so a slow or dropped observer can never stall the execution pipeline.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::warn;

use crate::error::{GambitError, Result};

// ============================================================================
// Entry Types
// ============================================================================

/// What kind of order event happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEvent {
    #[serde(rename = "BUY_PLACED")]
    BuyPlaced,
    #[serde(rename = "SELL_PLACED")]
    SellPlaced,
    #[serde(rename = "CLOSE_PLACED")]
    ClosePlaced,
    #[serde(rename = "TRAILING_STOP_TRIGGERED")]
    TrailingStopTriggered,
    #[serde(rename = "TRADE_EXECUTED")]
    TradeExecuted,
}

impl std::fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditEvent::BuyPlaced => "BUY_PLACED",
            AuditEvent::SellPlaced => "SELL_PLACED",
            AuditEvent::ClosePlaced => "CLOSE_PLACED",
            AuditEvent::TrailingStopTriggered => "TRAILING_STOP_TRIGGERED",
            AuditEvent::TradeExecuted => "TRADE_EXECUTED",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of the attempt the entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Submitted,
    RateLimited,
    Failed,
}

/// One record in the audit trail. Optional fields are omitted from the
/// serialized form when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
    pub symbol: String,
    pub outcome: AuditOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_loss: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditEntry {
    pub fn new(event: AuditEvent, symbol: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
            symbol: symbol.to_string(),
            outcome: AuditOutcome::Submitted,
            quantity: None,
            price: None,
            limit_price: None,
            stop_loss: None,
            take_profit: None,
            profit_loss: None,
            detail: None,
        }
    }

    pub fn outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn quantity(mut self, qty: Decimal) -> Self {
        self.quantity = Some(qty);
        self
    }

    pub fn price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn limit_price(mut self, limit: Option<Decimal>) -> Self {
        self.limit_price = limit;
        self
    }

    pub fn stop_loss(mut self, sl: Option<Decimal>) -> Self {
        self.stop_loss = sl;
        self
    }

    pub fn take_profit(mut self, tp: Option<Decimal>) -> Self {
        self.take_profit = tp;
        self
    }

    pub fn profit_loss(mut self, pnl: Decimal) -> Self {
        self.profit_loss = Some(pnl);
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ============================================================================
// Audit Log
// ============================================================================

/// In-memory log with optional JSONL persistence and a broadcast stream.
pub struct AuditLog {
    entries: Mutex<Vec<AuditEntry>>,
    file: Option<Mutex<std::fs::File>>,
    tx: broadcast::Sender<AuditEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            entries: Mutex::new(Vec::new()),
            file: None,
            tx,
        }
    }

    /// Log that also appends each entry as one JSON line to `path`.
    pub fn with_file(path: &Path) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(GambitError::Io)?;
        let (tx, _) = broadcast::channel(256);
        Ok(Self {
            entries: Mutex::new(Vec::new()),
            file: Some(Mutex::new(file)),
            tx,
        })
    }

    /// Append one entry. Persistence or delivery problems are logged and
    /// swallowed, never surfaced to the caller.
    pub fn record(&self, entry: AuditEntry) {
        if let Some(file) = &self.file {
            match serde_json::to_string(&entry) {
                Ok(line) => {
                    let mut f = file.lock().expect("audit file lock");
                    if let Err(e) = writeln!(f, "{}", line) {
                        warn!("Failed to persist audit entry: {}", e);
                    }
                }
                Err(e) => warn!("Failed to serialize audit entry: {}", e),
            }
        }

        // No receivers is fine
        let _ = self.tx.send(entry.clone());

        self.entries.lock().expect("audit entries lock").push(entry);
    }

    /// Live stream of entries for observers.
    pub fn subscribe(&self) -> broadcast::Receiver<AuditEntry> {
        self.tx.subscribe()
    }

    /// Snapshot of everything recorded so far.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("audit entries lock").clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("audit entries lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn entries_append_in_order() {
        let log = AuditLog::new();
        log.record(AuditEntry::new(AuditEvent::BuyPlaced, "AAPL").quantity(dec!(1)));
        log.record(AuditEntry::new(AuditEvent::ClosePlaced, "AAPL"));

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event, AuditEvent::BuyPlaced);
        assert_eq!(entries[1].event, AuditEvent::ClosePlaced);
    }

    #[test]
    fn none_fields_are_omitted_from_json() {
        let entry = AuditEntry::new(AuditEvent::SellPlaced, "TSLA").quantity(dec!(5));
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"SELL_PLACED\""));
        assert!(json.contains("\"quantity\""));
        assert!(!json.contains("stop_loss"));
        assert!(!json.contains("take_profit"));
        assert!(!json.contains("profit_loss"));
    }

    #[tokio::test]
    async fn subscribers_receive_entries() {
        let log = AuditLog::new();
        let mut rx = log.subscribe();
        log.record(AuditEntry::new(AuditEvent::TrailingStopTriggered, "X").price(dec!(99)));

        let got = rx.recv().await.unwrap();
        assert_eq!(got.event, AuditEvent::TrailingStopTriggered);
        assert_eq!(got.price, Some(dec!(99)));
    }

    #[test]
    fn jsonl_persistence_writes_one_line_per_entry() {
        let dir = std::env::temp_dir().join(format!("gambit-audit-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("audit.jsonl");
        let _ = std::fs::remove_file(&path);

        let log = AuditLog::with_file(&path).unwrap();
        log.record(AuditEntry::new(AuditEvent::BuyPlaced, "A"));
        log.record(AuditEntry::new(AuditEvent::TradeExecuted, "A").profit_loss(dec!(12.5)));

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: AuditEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.event, AuditEvent::TradeExecuted);
        assert_eq!(parsed.profit_loss, Some(dec!(12.5)));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
