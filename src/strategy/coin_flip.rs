//! Coin-flip strategy, batch shape.
//!
//! Opens a random direction every `hold_bars` bars and closes it the same
//! number of bars later. Useless as alpha, useful for exercising the whole
//! pipeline end to end.

use rand::Rng;

use crate::domain::{Candle, PositionSide, RiskParams};
use crate::error::Result;
use crate::strategy::{BatchStrategy, SimBroker};

pub struct CoinFlipStrategy {
    hold_bars: usize,
    bars_in_position: usize,
    risk: RiskParams,
}

impl CoinFlipStrategy {
    pub fn new(hold_bars: usize, risk: RiskParams) -> Self {
        Self {
            hold_bars: hold_bars.max(1),
            bars_in_position: 0,
            risk,
        }
    }
}

impl BatchStrategy for CoinFlipStrategy {
    fn name(&self) -> &str {
        "coin_flip"
    }

    fn on_bar(&mut self, _history: &[Candle], broker: &mut SimBroker) -> Result<()> {
        if broker.side() == PositionSide::Flat {
            if rand::thread_rng().gen_bool(0.5) {
                broker.buy(self.risk.clone());
            } else {
                broker.sell(self.risk.clone());
            }
            self.bars_in_position = 0;
        } else {
            self.bars_in_position += 1;
            if self.bars_in_position >= self.hold_bars {
                broker.close();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn always_flat_after_hold_period() {
        let mut strategy = CoinFlipStrategy::new(2, RiskParams::None);
        let mut broker = SimBroker::new();
        let bar = Candle::from_tick(dec!(100), Utc::now());
        let history = vec![bar];

        // Bar 1 opens, bars 2-3 hold, bar 3 closes
        strategy.on_bar(&history, &mut broker).unwrap();
        assert_ne!(broker.side(), PositionSide::Flat);

        strategy.on_bar(&history, &mut broker).unwrap();
        strategy.on_bar(&history, &mut broker).unwrap();
        assert_eq!(broker.side(), PositionSide::Flat);
    }
}
