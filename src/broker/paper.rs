//! In-memory broker for paper trading and tests.
//!
//! Fills every order immediately: at the limit price when one is given,
//! otherwise at the current mark price for the symbol. Position state is
//! netted the way a real broker nets it, so `get_position` behaves as the
//! authoritative source of truth the engine expects.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{
    AccountSnapshot, OrderIntent, OrderResult, OrderSide, OrderStatus, Position, PositionInfo,
    PositionSide,
};
use crate::error::BrokerError;

#[derive(Debug, Clone)]
struct PaperPosition {
    /// Signed quantity: positive long, negative short
    signed_qty: Decimal,
    avg_entry_price: Decimal,
}

/// Simulated broker backed by in-memory state.
pub struct PaperBroker {
    cash: Mutex<Decimal>,
    marks: DashMap<String, Decimal>,
    positions: DashMap<String, PaperPosition>,
    submitted: Mutex<Vec<OrderIntent>>,
    /// Test hook: force submissions to fail transiently
    fail_submits: AtomicBool,
    /// Test hook: force position queries to fail transiently
    fail_position_queries: AtomicBool,
}

impl PaperBroker {
    pub fn new(initial_cash: Decimal) -> Self {
        Self {
            cash: Mutex::new(initial_cash),
            marks: DashMap::new(),
            positions: DashMap::new(),
            submitted: Mutex::new(Vec::new()),
            fail_submits: AtomicBool::new(false),
            fail_position_queries: AtomicBool::new(false),
        }
    }

    /// Update the mark price used to fill market intents and value positions.
    pub fn set_mark(&self, symbol: &str, price: Decimal) {
        self.marks.insert(symbol.to_string(), price);
    }

    /// Every intent ever submitted, in order.
    pub fn submitted_orders(&self) -> Vec<OrderIntent> {
        self.submitted.lock().expect("submitted lock").clone()
    }

    pub fn set_fail_submits(&self, fail: bool) {
        self.fail_submits.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_position_queries(&self, fail: bool) {
        self.fail_position_queries.store(fail, Ordering::SeqCst);
    }

    fn fill_price(&self, intent: &OrderIntent) -> Result<Decimal, BrokerError> {
        if let Some(limit) = intent.limit {
            return Ok(limit);
        }
        self.marks
            .get(&intent.symbol)
            .map(|m| *m)
            .ok_or_else(|| BrokerError::Rejected(format!("no market price for {}", intent.symbol)))
    }

    fn apply_fill(&self, intent: &OrderIntent, fill: Decimal) {
        let delta = match intent.side {
            OrderSide::Buy => intent.quantity,
            OrderSide::Sell => -intent.quantity,
        };

        {
            let mut cash = self.cash.lock().expect("cash lock");
            *cash -= delta * fill;
        }

        let mut removed = false;
        match self.positions.get_mut(&intent.symbol) {
            Some(mut entry) => {
                let current = entry.signed_qty;
                let updated = current + delta;
                if updated.is_zero() {
                    removed = true;
                } else if current.signum() == updated.signum()
                    && updated.abs() > current.abs()
                {
                    // Adding to the position: recompute the weighted average entry
                    let notional = current.abs() * entry.avg_entry_price + delta.abs() * fill;
                    entry.avg_entry_price = notional / updated.abs();
                    entry.signed_qty = updated;
                } else if current.signum() == updated.signum() {
                    // Reducing: entry price unchanged
                    entry.signed_qty = updated;
                } else {
                    // Flipped through zero: the remainder is a fresh position
                    entry.signed_qty = updated;
                    entry.avg_entry_price = fill;
                }
            }
            None => {
                self.positions.insert(
                    intent.symbol.clone(),
                    PaperPosition {
                        signed_qty: delta,
                        avg_entry_price: fill,
                    },
                );
            }
        }
        if removed {
            self.positions.remove(&intent.symbol);
        }
    }
}

#[async_trait]
impl crate::broker::BrokerClient for PaperBroker {
    fn name(&self) -> &str {
        "paper"
    }

    async fn get_position(&self, symbol: &str) -> Result<Position, BrokerError> {
        if self.fail_position_queries.load(Ordering::SeqCst) {
            return Err(BrokerError::Transient("position query failed".to_string()));
        }

        match self.positions.get(symbol) {
            Some(pos) => {
                let side = if pos.signed_qty > Decimal::ZERO {
                    PositionSide::Long
                } else {
                    PositionSide::Short
                };
                Ok(Position {
                    symbol: symbol.to_string(),
                    side,
                    quantity: pos.signed_qty.abs(),
                    avg_entry_price: pos.avg_entry_price,
                })
            }
            None => Err(BrokerError::PositionNotFound),
        }
    }

    async fn submit_order(&self, intent: &OrderIntent) -> Result<OrderResult, BrokerError> {
        if self.fail_submits.load(Ordering::SeqCst) {
            return Err(BrokerError::Transient("order submission failed".to_string()));
        }
        if intent.quantity <= Decimal::ZERO {
            return Err(BrokerError::Rejected("non-positive quantity".to_string()));
        }

        let fill = self.fill_price(intent)?;
        self.apply_fill(intent, fill);
        self.submitted
            .lock()
            .expect("submitted lock")
            .push(intent.clone());

        debug!(
            "Paper fill: {} {} {} @ {}",
            intent.side, intent.quantity, intent.symbol, fill
        );

        Ok(OrderResult {
            order_id: Uuid::new_v4().to_string(),
            status: OrderStatus::Filled,
            filled_avg_price: Some(fill),
            submitted_at: Utc::now(),
        })
    }

    async fn close_position(&self, symbol: &str) -> Result<OrderResult, BrokerError> {
        let position = self.get_position(symbol).await?;
        let side = match position.side {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
            PositionSide::Flat => return Err(BrokerError::PositionNotFound),
        };
        let intent =
            OrderIntent::market(symbol, side, position.quantity).with_tag("close_position");
        self.submit_order(&intent).await
    }

    async fn account_snapshot(&self) -> Result<AccountSnapshot, BrokerError> {
        let cash = *self.cash.lock().expect("cash lock");
        let mut equity = cash;
        let mut positions = Vec::new();

        for entry in self.positions.iter() {
            let mark = self
                .marks
                .get(entry.key())
                .map(|m| *m)
                .unwrap_or(entry.avg_entry_price);
            let market_value = entry.signed_qty * mark;
            equity += market_value;

            let side = if entry.signed_qty > Decimal::ZERO {
                PositionSide::Long
            } else {
                PositionSide::Short
            };
            positions.push(PositionInfo {
                symbol: entry.key().clone(),
                side,
                quantity: entry.signed_qty.abs(),
                avg_entry_price: entry.avg_entry_price,
                market_value: Some(market_value),
                unrealized_pnl: Some(entry.signed_qty * (mark - entry.avg_entry_price)),
            });
        }

        Ok(AccountSnapshot {
            equity,
            cash,
            positions,
            open_orders: Vec::new(),
            taken_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::BrokerClient;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn open_and_close_long() {
        let broker = PaperBroker::new(dec!(10000));
        broker.set_mark("AAPL", dec!(100));

        let open = OrderIntent::market("AAPL", OrderSide::Buy, dec!(10));
        broker.submit_order(&open).await.unwrap();

        let pos = broker.get_position("AAPL").await.unwrap();
        assert_eq!(pos.side, PositionSide::Long);
        assert_eq!(pos.quantity, dec!(10));
        assert_eq!(pos.avg_entry_price, dec!(100));

        broker.set_mark("AAPL", dec!(110));
        broker.close_position("AAPL").await.unwrap();

        assert!(matches!(
            broker.get_position("AAPL").await,
            Err(BrokerError::PositionNotFound)
        ));

        // 10000 - 10*100 + 10*110 = 10100
        let snapshot = broker.account_snapshot().await.unwrap();
        assert_eq!(snapshot.cash, dec!(10100));
        assert_eq!(snapshot.equity, dec!(10100));
    }

    #[tokio::test]
    async fn short_position_has_negative_exposure() {
        let broker = PaperBroker::new(dec!(10000));
        broker.set_mark("TSLA", dec!(200));

        let open = OrderIntent::market("TSLA", OrderSide::Sell, dec!(5));
        broker.submit_order(&open).await.unwrap();

        let pos = broker.get_position("TSLA").await.unwrap();
        assert_eq!(pos.side, PositionSide::Short);
        assert_eq!(pos.quantity, dec!(5));

        // Price drops: short profits
        broker.set_mark("TSLA", dec!(180));
        let snapshot = broker.account_snapshot().await.unwrap();
        assert_eq!(snapshot.equity, dec!(10100));
    }

    #[tokio::test]
    async fn limit_price_overrides_mark() {
        let broker = PaperBroker::new(dec!(1000));
        broker.set_mark("X", dec!(50));

        let intent = OrderIntent::market("X", OrderSide::Buy, dec!(1)).with_limit(dec!(49));
        broker.submit_order(&intent).await.unwrap();

        let pos = broker.get_position("X").await.unwrap();
        assert_eq!(pos.avg_entry_price, dec!(49));
    }

    #[tokio::test]
    async fn missing_mark_rejects_market_order() {
        let broker = PaperBroker::new(dec!(1000));
        let intent = OrderIntent::market("UNKNOWN", OrderSide::Buy, dec!(1));
        assert!(matches!(
            broker.submit_order(&intent).await,
            Err(BrokerError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn forced_failures_are_transient() {
        let broker = PaperBroker::new(dec!(1000));
        broker.set_mark("X", dec!(10));
        broker.set_fail_submits(true);

        let intent = OrderIntent::market("X", OrderSide::Buy, dec!(1));
        let err = broker.submit_order(&intent).await.unwrap_err();
        assert!(err.is_transient());

        broker.set_fail_position_queries(true);
        let err = broker.get_position("X").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn flipping_through_zero_resets_entry_price() {
        let broker = PaperBroker::new(dec!(10000));
        broker.set_mark("X", dec!(100));
        broker
            .submit_order(&OrderIntent::market("X", OrderSide::Buy, dec!(2)))
            .await
            .unwrap();
        broker.set_mark("X", dec!(120));
        broker
            .submit_order(&OrderIntent::market("X", OrderSide::Sell, dec!(5)))
            .await
            .unwrap();

        let pos = broker.get_position("X").await.unwrap();
        assert_eq!(pos.side, PositionSide::Short);
        assert_eq!(pos.quantity, dec!(3));
        assert_eq!(pos.avg_entry_price, dec!(120));
    }

    #[tokio::test]
    async fn averaging_into_a_position() {
        let broker = PaperBroker::new(dec!(10000));
        broker.set_mark("X", dec!(100));
        broker
            .submit_order(&OrderIntent::market("X", OrderSide::Buy, dec!(1)))
            .await
            .unwrap();
        broker.set_mark("X", dec!(110));
        broker
            .submit_order(&OrderIntent::market("X", OrderSide::Buy, dec!(1)))
            .await
            .unwrap();

        let pos = broker.get_position("X").await.unwrap();
        assert_eq!(pos.quantity, dec!(2));
        assert_eq!(pos.avg_entry_price, dec!(105));
    }
}
