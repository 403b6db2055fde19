use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Per-tick directional decision produced by a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Sell,
    Hold,
    Buy,
}

impl Signal {
    /// Numeric encoding used by incremental strategies (-1, 0, +1).
    pub fn value(&self) -> i8 {
        match self {
            Signal::Sell => -1,
            Signal::Hold => 0,
            Signal::Buy => 1,
        }
    }

    pub fn is_hold(&self) -> bool {
        matches!(self, Signal::Hold)
    }
}

impl From<i8> for Signal {
    fn from(value: i8) -> Self {
        match value {
            v if v > 0 => Signal::Buy,
            v if v < 0 => Signal::Sell,
            _ => Signal::Hold,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Sell => write!(f, "SELL"),
            Signal::Hold => write!(f, "HOLD"),
            Signal::Buy => write!(f, "BUY"),
        }
    }
}

/// Risk overlay configuration a strategy may attach to an order intent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum RiskParams {
    #[default]
    None,
    Trailing(TrailingParams),
}

impl RiskParams {
    pub fn is_none(&self) -> bool {
        matches!(self, RiskParams::None)
    }
}

/// Trailing-stop parameters.
///
/// `atr_multiplier` and `reference_atr` are accepted configuration
/// reserved for dynamic trail widening; the base behavior does not use
/// them to adjust `trail_pct`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailingParams {
    /// Favorable move required before the stop starts tracking (e.g., 0.01 = 1%)
    pub activation_pct: Decimal,
    /// Retracement from the extreme price that triggers a close (e.g., 0.015 = 1.5%)
    pub trail_pct: Decimal,
    /// Reserved: ATR multiple for dynamic trail adjustment
    #[serde(default = "default_atr_multiplier")]
    pub atr_multiplier: Decimal,
    /// Reserved: ATR value observed at entry
    #[serde(default)]
    pub reference_atr: Option<Decimal>,
}

fn default_atr_multiplier() -> Decimal {
    dec!(1.5)
}

impl Default for TrailingParams {
    fn default() -> Self {
        Self {
            activation_pct: dec!(0.01),
            trail_pct: dec!(0.015),
            atr_multiplier: default_atr_multiplier(),
            reference_atr: None,
        }
    }
}

impl TrailingParams {
    pub fn new(activation_pct: Decimal, trail_pct: Decimal) -> Self {
        Self {
            activation_pct,
            trail_pct,
            ..Default::default()
        }
    }

    /// Correct malformed fields to safe defaults with a logged warning.
    ///
    /// Invalid risk parameters from strategy code must never abort the
    /// pipeline; a non-positive percentage falls back to the default.
    pub fn normalized(mut self) -> Self {
        let defaults = TrailingParams::default();
        if self.activation_pct <= Decimal::ZERO {
            warn!(
                "Invalid trailing activation_pct {}, using default {}",
                self.activation_pct, defaults.activation_pct
            );
            self.activation_pct = defaults.activation_pct;
        }
        if self.trail_pct <= Decimal::ZERO {
            warn!(
                "Invalid trailing trail_pct {}, using default {}",
                self.trail_pct, defaults.trail_pct
            );
            self.trail_pct = defaults.trail_pct;
        }
        if self.atr_multiplier <= Decimal::ZERO {
            warn!(
                "Invalid trailing atr_multiplier {}, using default {}",
                self.atr_multiplier, defaults.atr_multiplier
            );
            self.atr_multiplier = defaults.atr_multiplier;
        }
        if let Some(atr) = self.reference_atr {
            if atr <= Decimal::ZERO {
                warn!("Invalid reference_atr {}, dropping it", atr);
                self.reference_atr = None;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_value_roundtrip() {
        assert_eq!(Signal::Buy.value(), 1);
        assert_eq!(Signal::Sell.value(), -1);
        assert_eq!(Signal::Hold.value(), 0);
        assert_eq!(Signal::from(1), Signal::Buy);
        assert_eq!(Signal::from(-3), Signal::Sell);
        assert_eq!(Signal::from(0), Signal::Hold);
    }

    #[test]
    fn trailing_params_normalization_corrects_bad_values() {
        let params = TrailingParams {
            activation_pct: dec!(-0.5),
            trail_pct: Decimal::ZERO,
            atr_multiplier: dec!(-1),
            reference_atr: Some(dec!(-2)),
        }
        .normalized();

        assert_eq!(params.activation_pct, dec!(0.01));
        assert_eq!(params.trail_pct, dec!(0.015));
        assert_eq!(params.atr_multiplier, dec!(1.5));
        assert_eq!(params.reference_atr, None);
    }

    #[test]
    fn trailing_params_normalization_keeps_valid_values() {
        let params = TrailingParams::new(dec!(0.02), dec!(0.03)).normalized();
        assert_eq!(params.activation_pct, dec!(0.02));
        assert_eq!(params.trail_pct, dec!(0.03));
    }
}
