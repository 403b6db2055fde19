use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::OrderSide;

/// Flat/Long/Short classification of current exposure for a symbol.
///
/// The authoritative copy lives with the broker; the engine queries it
/// per signal and never caches it long-term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Flat,
    Long,
    Short,
}

impl PositionSide {
    pub fn is_flat(&self) -> bool {
        matches!(self, PositionSide::Flat)
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionSide::Flat => write!(f, "FLAT"),
            PositionSide::Long => write!(f, "LONG"),
            PositionSide::Short => write!(f, "SHORT"),
        }
    }
}

/// Broker-reported position for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    /// Absolute quantity (never signed)
    pub quantity: Decimal,
    pub avg_entry_price: Decimal,
}

impl Position {
    /// The normalized form of "position not found".
    pub fn flat(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            side: PositionSide::Flat,
            quantity: Decimal::ZERO,
            avg_entry_price: Decimal::ZERO,
        }
    }
}

/// A single trade tick from the market feed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Tick {
    pub fn new(price: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self { price, timestamp }
    }
}

/// OHLCV bar used by batch strategies and the backtest engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    /// Degenerate bar built from a single tick (live adaptation of batch
    /// strategies appends these to the growing buffer).
    pub fn from_tick(price: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: Decimal::ZERO,
        }
    }
}

/// Open position details published in account snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionInfo {
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: Decimal,
    pub avg_entry_price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_value: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unrealized_pnl: Option<Decimal>,
}

/// Open order details published in account snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOrderInfo {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Decimal>,
    pub status: String,
}

/// Normalized account state pushed to observers by the status loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub equity: Decimal,
    pub cash: Decimal,
    pub positions: Vec<PositionInfo>,
    pub open_orders: Vec<OpenOrderInfo>,
    pub taken_at: DateTime<Utc>,
}
