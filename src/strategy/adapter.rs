//! Normalizes both strategy shapes into one tick-advance interface.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{error, warn};

use crate::domain::{Candle, PositionSide, RiskParams, Signal};
use crate::strategy::{BatchStrategy, IncrementalStrategy, SimAction, SimBroker};

/// Adapter exposing `advance(price, timestamp) -> (Signal, RiskParams)`
/// over either strategy shape.
///
/// Any panic or error inside the wrapped strategy is caught here and turned
/// into `Signal::Hold`. The tick loop must survive strategy defects.
pub enum StrategyAdapter {
    Incremental(Box<dyn IncrementalStrategy>),
    Batch {
        strategy: Box<dyn BatchStrategy>,
        history: Vec<Candle>,
        sim: SimBroker,
    },
}

impl StrategyAdapter {
    pub fn incremental(strategy: Box<dyn IncrementalStrategy>) -> Self {
        Self::Incremental(strategy)
    }

    pub fn batch(strategy: Box<dyn BatchStrategy>) -> Self {
        Self::Batch {
            strategy,
            history: Vec::new(),
            sim: SimBroker::new(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Incremental(s) => s.name(),
            Self::Batch { strategy, .. } => strategy.name(),
        }
    }

    /// Feed one tick through the strategy and normalize the outcome.
    pub fn advance(&mut self, price: Decimal, timestamp: DateTime<Utc>) -> (Signal, RiskParams) {
        match self {
            Self::Incremental(strategy) => {
                let result = catch_unwind(AssertUnwindSafe(|| strategy.advance(price, timestamp)));
                match result {
                    Ok(Ok(signal)) => (signal, strategy.last_risk_params()),
                    Ok(Err(e)) => {
                        warn!("Strategy '{}' errored, holding: {}", strategy.name(), e);
                        (Signal::Hold, RiskParams::None)
                    }
                    Err(_) => {
                        error!("Strategy '{}' panicked, holding", strategy.name());
                        (Signal::Hold, RiskParams::None)
                    }
                }
            }
            Self::Batch {
                strategy,
                history,
                sim,
            } => {
                history.push(Candle::from_tick(price, timestamp));

                let before = sim.order_count();
                let side_before = sim.side();

                let result = catch_unwind(AssertUnwindSafe(|| {
                    strategy.on_bar(history.as_slice(), sim)
                }));
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!("Strategy '{}' errored, holding: {}", strategy.name(), e);
                        return (Signal::Hold, RiskParams::None);
                    }
                    Err(_) => {
                        error!("Strategy '{}' panicked, holding", strategy.name());
                        return (Signal::Hold, RiskParams::None);
                    }
                }

                let new_orders = &sim.orders()[before..];
                if new_orders.is_empty() {
                    return (Signal::Hold, RiskParams::None);
                }
                if new_orders.len() > 1 {
                    warn!(
                        "Strategy '{}' placed {} orders in one step, using the first",
                        strategy.name(),
                        new_orders.len()
                    );
                }

                let order = &new_orders[0];
                let signal = match order.action {
                    SimAction::Buy => Signal::Buy,
                    SimAction::Sell => Signal::Sell,
                    // A bare close maps to whichever direction exits the
                    // side held before this step
                    SimAction::Close => match side_before {
                        PositionSide::Long => Signal::Sell,
                        PositionSide::Short => Signal::Buy,
                        PositionSide::Flat => Signal::Hold,
                    },
                };
                (signal, order.risk.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TrailingParams;
    use crate::error::GambitError;
    use rust_decimal_macros::dec;

    struct FixedSignals {
        signals: Vec<Signal>,
        idx: usize,
        risk: RiskParams,
    }

    impl IncrementalStrategy for FixedSignals {
        fn name(&self) -> &str {
            "fixed"
        }

        fn advance(&mut self, _price: Decimal, _ts: DateTime<Utc>) -> crate::error::Result<Signal> {
            let s = self.signals.get(self.idx).copied().unwrap_or(Signal::Hold);
            self.idx += 1;
            Ok(s)
        }

        fn last_risk_params(&self) -> RiskParams {
            self.risk.clone()
        }
    }

    struct Faulty {
        panics: bool,
    }

    impl IncrementalStrategy for Faulty {
        fn name(&self) -> &str {
            "faulty"
        }

        fn advance(&mut self, _price: Decimal, _ts: DateTime<Utc>) -> crate::error::Result<Signal> {
            if self.panics {
                panic!("boom");
            }
            Err(GambitError::Strategy("bad state".to_string()))
        }
    }

    struct AlternatingBatch {
        bars_seen: usize,
    }

    impl BatchStrategy for AlternatingBatch {
        fn name(&self) -> &str {
            "alternating"
        }

        fn on_bar(&mut self, history: &[Candle], broker: &mut SimBroker) -> crate::error::Result<()> {
            assert_eq!(history.len(), self.bars_seen + 1);
            self.bars_seen += 1;
            match self.bars_seen {
                1 => broker.buy(RiskParams::None),
                2 => broker.close(),
                3 => broker.sell(RiskParams::None),
                4 => broker.close(),
                _ => {}
            }
            Ok(())
        }
    }

    #[test]
    fn incremental_signal_and_risk_pass_through() {
        let risk = RiskParams::Trailing(TrailingParams::new(dec!(0.01), dec!(0.02)));
        let mut adapter = StrategyAdapter::incremental(Box::new(FixedSignals {
            signals: vec![Signal::Buy],
            idx: 0,
            risk: risk.clone(),
        }));

        let (signal, got_risk) = adapter.advance(dec!(100), Utc::now());
        assert_eq!(signal, Signal::Buy);
        assert_eq!(got_risk, risk);
    }

    #[test]
    fn strategy_error_becomes_hold() {
        let mut adapter = StrategyAdapter::incremental(Box::new(Faulty { panics: false }));
        let (signal, risk) = adapter.advance(dec!(100), Utc::now());
        assert_eq!(signal, Signal::Hold);
        assert_eq!(risk, RiskParams::None);
    }

    #[test]
    fn strategy_panic_becomes_hold() {
        let mut adapter = StrategyAdapter::incremental(Box::new(Faulty { panics: true }));
        let (signal, _) = adapter.advance(dec!(100), Utc::now());
        assert_eq!(signal, Signal::Hold);
    }

    #[test]
    fn batch_orders_map_to_signals() {
        let mut adapter = StrategyAdapter::batch(Box::new(AlternatingBatch { bars_seen: 0 }));
        let now = Utc::now();

        // Buy opens long; the later close maps to Sell because the sim
        // broker was long going into that step
        assert_eq!(adapter.advance(dec!(100), now).0, Signal::Buy);
        assert_eq!(adapter.advance(dec!(101), now).0, Signal::Sell);
        assert_eq!(adapter.advance(dec!(102), now).0, Signal::Sell);
        assert_eq!(adapter.advance(dec!(103), now).0, Signal::Buy);
        assert_eq!(adapter.advance(dec!(104), now).0, Signal::Hold);
    }
}
