//! Trailing-stop overlay: per-position state machine for live trading.
//!
//! Inactive until price moves `activation_pct` in the position's favor from
//! the confirmed entry. Once active, the extreme price ratchets with every
//! favorable tick and the stop trails it by `trail_pct`. A tick beyond the
//! stop reports a trigger; the engine closes the position and drops the
//! state.

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::domain::{PositionSide, TrailingParams};

#[derive(Debug, Clone)]
pub struct TrailingStop {
    side: PositionSide,
    entry_price: Decimal,
    params: TrailingParams,
    is_active: bool,
    extreme_price: Option<Decimal>,
    stop_price: Option<Decimal>,
}

impl TrailingStop {
    /// `entry_price` must be the broker-confirmed average fill, not the tick
    /// that produced the entry signal.
    pub fn new(side: PositionSide, entry_price: Decimal, params: TrailingParams) -> Self {
        Self {
            side,
            entry_price,
            params: params.normalized(),
            is_active: false,
            extreme_price: None,
            stop_price: None,
        }
    }

    pub fn side(&self) -> PositionSide {
        self.side
    }

    pub fn entry_price(&self) -> Decimal {
        self.entry_price
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn stop_price(&self) -> Option<Decimal> {
        self.stop_price
    }

    fn activation_level(&self) -> Decimal {
        match self.side {
            PositionSide::Short => {
                self.entry_price * (Decimal::ONE - self.params.activation_pct)
            }
            _ => self.entry_price * (Decimal::ONE + self.params.activation_pct),
        }
    }

    /// Advance the state machine by one tick. Returns `true` when the stop
    /// has fired and the position must be closed.
    pub fn update(&mut self, price: Decimal) -> bool {
        if !self.is_active {
            let activated = match self.side {
                PositionSide::Long => price >= self.activation_level(),
                PositionSide::Short => price <= self.activation_level(),
                PositionSide::Flat => false,
            };
            if activated {
                self.is_active = true;
                self.extreme_price = Some(price);
                info!(
                    "Trailing stop activated at {} (entry {}, {})",
                    price, self.entry_price, self.side
                );
            }
        } else if let Some(extreme) = self.extreme_price {
            let updated = match self.side {
                PositionSide::Long => extreme.max(price),
                _ => extreme.min(price),
            };
            if updated != extreme {
                debug!("Trailing extreme moved {} -> {}", extreme, updated);
            }
            self.extreme_price = Some(updated);
        }

        if self.is_active {
            if let Some(extreme) = self.extreme_price {
                self.stop_price = Some(match self.side {
                    PositionSide::Long => extreme * (Decimal::ONE - self.params.trail_pct),
                    _ => extreme * (Decimal::ONE + self.params.trail_pct),
                });
            }
        }

        // Trigger check runs every tick, a no-op until the stop price exists
        match (self.stop_price, self.side) {
            (Some(stop), PositionSide::Long) => price <= stop,
            (Some(stop), PositionSide::Short) => price >= stop,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn params(activation: Decimal, trail: Decimal) -> TrailingParams {
        TrailingParams::new(activation, trail)
    }

    #[test]
    fn long_activates_exactly_at_threshold() {
        let mut stop = TrailingStop::new(
            PositionSide::Long,
            dec!(100),
            params(dec!(0.01), dec!(0.015)),
        );

        assert!(!stop.update(dec!(100)));
        assert!(!stop.is_active());
        assert!(!stop.update(dec!(100.5)));
        assert!(!stop.is_active());
        assert!(!stop.update(dec!(101)));
        assert!(stop.is_active());
    }

    #[test]
    fn long_trigger_boundary() {
        let mut stop = TrailingStop::new(
            PositionSide::Long,
            dec!(100),
            params(dec!(0.01), dec!(0.015)),
        );

        stop.update(dec!(110));
        assert!(stop.is_active());
        assert_eq!(stop.stop_price(), Some(dec!(108.350)));

        assert!(!stop.update(dec!(108.4)));
        assert!(stop.update(dec!(108.0)));
    }

    #[test]
    fn extreme_ratchets_up_and_never_down() {
        let mut stop = TrailingStop::new(
            PositionSide::Long,
            dec!(100),
            params(dec!(0.01), dec!(0.01)),
        );

        stop.update(dec!(105));
        stop.update(dec!(110));
        let at_peak = stop.stop_price().unwrap();

        // Pullback above the stop leaves the stop unchanged
        stop.update(dec!(109.5));
        assert_eq!(stop.stop_price(), Some(at_peak));
    }

    #[test]
    fn short_side_mirrors_long() {
        let mut stop = TrailingStop::new(
            PositionSide::Short,
            dec!(100),
            params(dec!(0.01), dec!(0.01)),
        );

        assert!(!stop.update(dec!(99.5)));
        assert!(!stop.is_active());

        assert!(!stop.update(dec!(99)));
        assert!(stop.is_active());

        stop.update(dec!(95));
        assert_eq!(stop.stop_price(), Some(dec!(95.95)));
        assert!(stop.update(dec!(96)));
    }

    #[test]
    fn inactive_stop_never_triggers() {
        let mut stop = TrailingStop::new(
            PositionSide::Long,
            dec!(100),
            params(dec!(0.05), dec!(0.01)),
        );

        // Price collapses before activation: no stop exists yet
        assert!(!stop.update(dec!(90)));
        assert!(!stop.update(dec!(80)));
        assert_eq!(stop.stop_price(), None);
    }

    #[test]
    fn bad_params_are_normalized_not_rejected() {
        let stop = TrailingStop::new(
            PositionSide::Long,
            dec!(100),
            params(dec!(-1), dec!(0)),
        );
        // Defaults take over, stop still constructs
        assert!(!stop.is_active());
    }
}
