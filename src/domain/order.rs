use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Order status as reported by the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Accepted by the broker, not yet filled
    Accepted,
    /// Fully filled
    Filled,
    /// Rejected by the broker
    Rejected,
}

/// What we want the broker to do.
///
/// An intent with neither `limit` nor `stop` set is a market intent; the
/// entry-offset overlay may fill in `limit` for those, and only those.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Decimal>,
    /// Fixed stop-loss level (simulation only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sl: Option<Decimal>,
    /// Fixed take-profit level (simulation only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tp: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl OrderIntent {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            client_order_id: Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            side,
            quantity,
            limit: None,
            stop: None,
            sl: None,
            tp: None,
            tag: None,
        }
    }

    pub fn with_limit(mut self, limit: Decimal) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_sl(mut self, sl: Decimal) -> Self {
        self.sl = Some(sl);
        self
    }

    pub fn with_tp(mut self, tp: Decimal) -> Self {
        self.tp = Some(tp);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// True when the caller left both limit and stop unset.
    pub fn is_market_intent(&self) -> bool {
        self.limit.is_none() && self.stop.is_none()
    }
}

/// Broker acknowledgement of a submitted order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub status: OrderStatus,
    /// Average fill price when the broker reports one
    pub filled_avg_price: Option<Decimal>,
    pub submitted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn market_intent_detection() {
        let intent = OrderIntent::market("BTC/USD", OrderSide::Buy, dec!(0.5));
        assert!(intent.is_market_intent());

        let with_limit = intent.clone().with_limit(dec!(100));
        assert!(!with_limit.is_market_intent());

        let mut with_stop = intent;
        with_stop.stop = Some(dec!(95));
        assert!(!with_stop.is_market_intent());
    }

    #[test]
    fn side_opposite() {
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
        assert_eq!(OrderSide::Sell.opposite(), OrderSide::Buy);
    }
}
