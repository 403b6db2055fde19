//! Entry-offset overlay: simulated slippage for backtests.
//!
//! Market-intent orders get a limit price shifted against the trade
//! direction, so simulated entries are never better than the reference
//! close. Intents that already carry an explicit limit or stop are left
//! alone.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{OrderIntent, OrderSide};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetMode {
    /// `value` is a percentage of the basis price (1.0 means 1%)
    Percent,
    /// Offset amount is `latest ATR * value`
    Atr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetBasis {
    Close,
    /// Would require look-ahead; always downgraded to Close
    Open,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffsetConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_mode")]
    pub mode: OffsetMode,
    #[serde(default = "default_value")]
    pub value: Decimal,
    #[serde(default = "default_basis")]
    pub basis: OffsetBasis,
}

fn default_mode() -> OffsetMode {
    OffsetMode::Percent
}

fn default_value() -> Decimal {
    Decimal::ONE
}

fn default_basis() -> OffsetBasis {
    OffsetBasis::Close
}

impl Default for OffsetConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: default_mode(),
            value: default_value(),
            basis: default_basis(),
        }
    }
}

impl OffsetConfig {
    /// Correct invalid settings to safe ones, warning for each correction.
    /// A non-positive value disables the overlay rather than erroring.
    pub fn normalized(mut self) -> Self {
        if self.basis == OffsetBasis::Open {
            warn!("Offset basis 'open' requires look-ahead, downgrading to 'close'");
            self.basis = OffsetBasis::Close;
        }
        if self.enabled && self.value <= Decimal::ZERO {
            warn!("Non-positive offset value {}, disabling entry offset", self.value);
            self.enabled = false;
        }
        self
    }
}

/// Applies the configured offset to market-intent orders.
pub struct EntryOffset {
    config: OffsetConfig,
}

impl EntryOffset {
    pub fn new(config: OffsetConfig) -> Self {
        Self {
            config: config.normalized(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Set the intent's limit price from the latest close. No-op when the
    /// overlay is disabled or the intent already names a limit or stop.
    pub fn apply(&self, intent: &mut OrderIntent, close: Decimal, latest_atr: Option<Decimal>) {
        if !self.config.enabled || !intent.is_market_intent() {
            return;
        }

        let amount = match self.config.mode {
            OffsetMode::Percent => close * self.config.value / Decimal::ONE_HUNDRED,
            OffsetMode::Atr => match latest_atr {
                Some(atr) if atr > Decimal::ZERO => atr * self.config.value,
                _ => {
                    warn!(
                        "ATR unavailable for {}, skipping entry offset on this order",
                        intent.symbol
                    );
                    return;
                }
            },
        };

        // Slippage always works against the trade direction
        let limit = match intent.side {
            OrderSide::Buy => close - amount,
            OrderSide::Sell => close + amount,
        };
        intent.limit = Some(limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn percent_offset(value: Decimal) -> EntryOffset {
        EntryOffset::new(OffsetConfig {
            enabled: true,
            mode: OffsetMode::Percent,
            value,
            basis: OffsetBasis::Close,
        })
    }

    #[test]
    fn percent_mode_shifts_against_direction() {
        let offset = percent_offset(dec!(1.0));

        let mut buy = OrderIntent::market("X", OrderSide::Buy, dec!(1));
        offset.apply(&mut buy, dec!(100), None);
        assert_eq!(buy.limit, Some(dec!(99.0)));

        let mut sell = OrderIntent::market("X", OrderSide::Sell, dec!(1));
        offset.apply(&mut sell, dec!(100), None);
        assert_eq!(sell.limit, Some(dec!(101.0)));
    }

    #[test]
    fn atr_mode_uses_atr_times_multiplier() {
        let offset = EntryOffset::new(OffsetConfig {
            enabled: true,
            mode: OffsetMode::Atr,
            value: dec!(2),
            basis: OffsetBasis::Close,
        });

        let mut buy = OrderIntent::market("X", OrderSide::Buy, dec!(1));
        offset.apply(&mut buy, dec!(100), Some(dec!(1.5)));
        assert_eq!(buy.limit, Some(dec!(97.0)));
    }

    #[test]
    fn missing_atr_skips_offset() {
        let offset = EntryOffset::new(OffsetConfig {
            enabled: true,
            mode: OffsetMode::Atr,
            value: dec!(2),
            basis: OffsetBasis::Close,
        });

        let mut buy = OrderIntent::market("X", OrderSide::Buy, dec!(1));
        offset.apply(&mut buy, dec!(100), None);
        assert_eq!(buy.limit, None);
    }

    #[test]
    fn explicit_limit_is_never_overridden() {
        let offset = percent_offset(dec!(1.0));
        let mut intent =
            OrderIntent::market("X", OrderSide::Buy, dec!(1)).with_limit(dec!(95));
        offset.apply(&mut intent, dec!(100), None);
        assert_eq!(intent.limit, Some(dec!(95)));
    }

    #[test]
    fn open_basis_downgrades_to_close() {
        let config = OffsetConfig {
            enabled: true,
            mode: OffsetMode::Percent,
            value: dec!(1),
            basis: OffsetBasis::Open,
        }
        .normalized();
        assert_eq!(config.basis, OffsetBasis::Close);
        assert!(config.enabled);
    }

    #[test]
    fn non_positive_value_disables_overlay() {
        let offset = percent_offset(dec!(0));
        assert!(!offset.is_enabled());

        let mut buy = OrderIntent::market("X", OrderSide::Buy, dec!(1));
        offset.apply(&mut buy, dec!(100), None);
        assert_eq!(buy.limit, None);
    }
}
