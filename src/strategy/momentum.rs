//! Tick momentum strategy.
//!
//! Classic fast/slow moving-average crossover over tick prices. Emits Buy
//! when the fast average crosses above the slow one, Sell on the opposite
//! cross, Hold otherwise.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use crate::domain::{RiskParams, Signal};
use crate::error::{GambitError, Result};
use crate::strategy::IncrementalStrategy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickMomentumConfig {
    /// Fast moving-average window (ticks)
    pub fast_period: usize,
    /// Slow moving-average window (ticks)
    pub slow_period: usize,
    /// Risk parameters attached to every entry signal
    pub risk: RiskParams,
}

impl Default for TickMomentumConfig {
    fn default() -> Self {
        Self {
            fast_period: 5,
            slow_period: 20,
            risk: RiskParams::None,
        }
    }
}

pub struct TickMomentumStrategy {
    config: TickMomentumConfig,
    prices: VecDeque<Decimal>,
    prev_diff: Option<Decimal>,
}

impl TickMomentumStrategy {
    pub fn new(config: TickMomentumConfig) -> Result<Self> {
        if config.fast_period == 0 || config.slow_period <= config.fast_period {
            return Err(GambitError::Validation(format!(
                "momentum windows must satisfy 0 < fast < slow, got fast={} slow={}",
                config.fast_period, config.slow_period
            )));
        }
        Ok(Self {
            config,
            prices: VecDeque::new(),
            prev_diff: None,
        })
    }

    fn mean_of_last(&self, n: usize) -> Decimal {
        let len = self.prices.len();
        let sum: Decimal = self.prices.iter().skip(len - n).copied().sum();
        sum / Decimal::from(n as u64)
    }
}

impl IncrementalStrategy for TickMomentumStrategy {
    fn name(&self) -> &str {
        "tick_momentum"
    }

    fn advance(&mut self, price: Decimal, _timestamp: DateTime<Utc>) -> Result<Signal> {
        self.prices.push_back(price);
        if self.prices.len() > self.config.slow_period {
            self.prices.pop_front();
        }
        if self.prices.len() < self.config.slow_period {
            return Ok(Signal::Hold);
        }

        let fast = self.mean_of_last(self.config.fast_period);
        let slow = self.mean_of_last(self.config.slow_period);
        let diff = fast - slow;

        let signal = match self.prev_diff {
            Some(prev) if prev <= Decimal::ZERO && diff > Decimal::ZERO => Signal::Buy,
            Some(prev) if prev >= Decimal::ZERO && diff < Decimal::ZERO => Signal::Sell,
            _ => Signal::Hold,
        };
        self.prev_diff = Some(diff);

        if signal != Signal::Hold {
            debug!("Momentum cross: fast={} slow={} -> {}", fast, slow, signal);
        }
        Ok(signal)
    }

    fn last_risk_params(&self) -> RiskParams {
        self.config.risk.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn run(strategy: &mut TickMomentumStrategy, prices: &[Decimal]) -> Vec<Signal> {
        let now = Utc::now();
        prices
            .iter()
            .map(|p| strategy.advance(*p, now).unwrap())
            .collect()
    }

    #[test]
    fn warmup_holds_until_slow_window_fills() {
        let mut s = TickMomentumStrategy::new(TickMomentumConfig {
            fast_period: 2,
            slow_period: 4,
            risk: RiskParams::None,
        })
        .unwrap();

        let signals = run(&mut s, &[dec!(10), dec!(10), dec!(10)]);
        assert!(signals.iter().all(|s| *s == Signal::Hold));
    }

    #[test]
    fn upward_cross_emits_buy_once() {
        let mut s = TickMomentumStrategy::new(TickMomentumConfig {
            fast_period: 2,
            slow_period: 4,
            risk: RiskParams::None,
        })
        .unwrap();

        // Flat then a sharp rise: fast average overtakes slow exactly once
        let signals = run(
            &mut s,
            &[dec!(10), dec!(10), dec!(10), dec!(10), dec!(12), dec!(14)],
        );
        assert_eq!(signals.iter().filter(|s| **s == Signal::Buy).count(), 1);
        assert!(!signals.contains(&Signal::Sell));
    }

    #[test]
    fn downward_cross_emits_sell() {
        let mut s = TickMomentumStrategy::new(TickMomentumConfig {
            fast_period: 2,
            slow_period: 4,
            risk: RiskParams::None,
        })
        .unwrap();

        let signals = run(
            &mut s,
            &[dec!(10), dec!(10), dec!(10), dec!(10), dec!(8), dec!(6)],
        );
        assert_eq!(signals.iter().filter(|s| **s == Signal::Sell).count(), 1);
    }

    #[test]
    fn invalid_windows_rejected_at_construction() {
        let bad = TickMomentumConfig {
            fast_period: 10,
            slow_period: 5,
            risk: RiskParams::None,
        };
        assert!(TickMomentumStrategy::new(bad).is_err());
    }
}
