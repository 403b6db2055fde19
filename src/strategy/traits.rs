//! Strategy interfaces.
//!
//! Two shapes exist in the wild and both are supported:
//! - **Incremental**: the strategy consumes one tick at a time and returns a
//!   signal directly.
//! - **Batch**: the strategy expects a growing bar history and places orders
//!   imperatively on a simulated broker; signals are recovered by diffing the
//!   broker's order list around each step.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{Candle, PositionSide, RiskParams, Signal};
use crate::error::Result;

// ============================================================================
// Incremental Shape
// ============================================================================

/// Strategy that produces a signal per tick.
pub trait IncrementalStrategy: Send {
    fn name(&self) -> &str;

    /// Consume one tick and return the directional decision.
    fn advance(&mut self, price: Decimal, timestamp: DateTime<Utc>) -> Result<Signal>;

    /// Risk parameters the strategy wants attached to the signal it just
    /// produced. Read immediately after `advance`.
    fn last_risk_params(&self) -> RiskParams {
        RiskParams::None
    }
}

// ============================================================================
// Batch Shape
// ============================================================================

/// Strategy driven bar-by-bar against an accumulated history.
pub trait BatchStrategy: Send {
    fn name(&self) -> &str;

    /// Process the latest bar. `history` always ends with the current bar.
    /// Orders are placed by calling into `broker`.
    fn on_bar(&mut self, history: &[Candle], broker: &mut SimBroker) -> Result<()>;
}

/// Imperative call a batch strategy made on the simulated broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimAction {
    Buy,
    Sell,
    Close,
}

/// One order recorded by the simulated broker.
#[derive(Debug, Clone)]
pub struct SimOrder {
    pub action: SimAction,
    pub limit: Option<Decimal>,
    pub stop: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub risk: RiskParams,
}

/// Minimal simulated broker handed to batch strategies.
///
/// It records every imperative call and tracks the side the strategy thinks
/// it holds, so a bare `close()` can later be mapped to the correct closing
/// direction. It never fills anything.
#[derive(Debug)]
pub struct SimBroker {
    orders: Vec<SimOrder>,
    side: PositionSide,
}

impl SimBroker {
    pub fn new() -> Self {
        Self {
            orders: Vec::new(),
            side: PositionSide::Flat,
        }
    }

    pub fn buy(&mut self, risk: RiskParams) {
        self.buy_with(None, None, None, risk);
    }

    pub fn buy_with(
        &mut self,
        limit: Option<Decimal>,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
        risk: RiskParams,
    ) {
        self.orders.push(SimOrder {
            action: SimAction::Buy,
            limit,
            stop: None,
            stop_loss,
            take_profit,
            risk,
        });
        self.side = PositionSide::Long;
    }

    pub fn sell(&mut self, risk: RiskParams) {
        self.sell_with(None, None, None, risk);
    }

    pub fn sell_with(
        &mut self,
        limit: Option<Decimal>,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
        risk: RiskParams,
    ) {
        self.orders.push(SimOrder {
            action: SimAction::Sell,
            limit,
            stop: None,
            stop_loss,
            take_profit,
            risk,
        });
        self.side = PositionSide::Short;
    }

    pub fn close(&mut self) {
        self.orders.push(SimOrder {
            action: SimAction::Close,
            limit: None,
            stop: None,
            stop_loss: None,
            take_profit: None,
            risk: RiskParams::None,
        });
        self.side = PositionSide::Flat;
    }

    /// Side as of the orders recorded so far.
    pub fn side(&self) -> PositionSide {
        self.side
    }

    pub fn orders(&self) -> &[SimOrder] {
        &self.orders
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn sim_broker_tracks_side_across_calls() {
        let mut sim = SimBroker::new();
        assert_eq!(sim.side(), PositionSide::Flat);

        sim.buy(RiskParams::None);
        assert_eq!(sim.side(), PositionSide::Long);

        sim.close();
        assert_eq!(sim.side(), PositionSide::Flat);

        sim.sell(RiskParams::None);
        assert_eq!(sim.side(), PositionSide::Short);
        assert_eq!(sim.order_count(), 3);
    }

    #[test]
    fn sim_orders_preserve_params() {
        let mut sim = SimBroker::new();
        sim.buy_with(Some(dec!(99)), Some(dec!(95)), Some(dec!(110)), RiskParams::None);

        let order = &sim.orders()[0];
        assert_eq!(order.action, SimAction::Buy);
        assert_eq!(order.limit, Some(dec!(99)));
        assert_eq!(order.stop_loss, Some(dec!(95)));
        assert_eq!(order.take_profit, Some(dec!(110)));
    }
}
