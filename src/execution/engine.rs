//! Order execution engine.
//!
//! Maps `(Signal, PositionSide)` to broker actions, enforces the minimum
//! interval between submissions, and owns the per-symbol trailing-stop
//! state. The broker is the authoritative source of position truth; the
//! engine re-queries it for every signal instead of caching.

use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::audit::{AuditEntry, AuditEvent, AuditLog, AuditOutcome};
use crate::broker::BrokerClient;
use crate::config::ExecutionConfig;
use crate::domain::{
    OrderIntent, OrderSide, PositionSide, RiskParams, Signal, Tick, TrailingParams,
};
use crate::error::{BrokerError, Result};
use crate::risk::TrailingStop;
use crate::strategy::StrategyAdapter;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub min_order_interval: Duration,
    pub fill_confirm_delay: Duration,
    pub allow_short: bool,
}

impl From<&ExecutionConfig> for EngineSettings {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            min_order_interval: Duration::from_secs(config.min_order_interval_secs),
            fill_confirm_delay: Duration::from_millis(config.fill_confirm_delay_ms),
            allow_short: config.allow_short,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            min_order_interval: Duration::from_secs(5),
            fill_confirm_delay: Duration::from_millis(500),
            allow_short: false,
        }
    }
}

pub struct ExecutionEngine {
    broker: Arc<dyn BrokerClient>,
    audit: Arc<AuditLog>,
    settings: EngineSettings,
    /// Last successful submission per symbol, for the rate limiter
    last_order_at: DashMap<String, Instant>,
    /// At most one trailing stop per symbol, alive while the position is open
    trailing: DashMap<String, TrailingStop>,
}

impl ExecutionEngine {
    pub fn new(broker: Arc<dyn BrokerClient>, audit: Arc<AuditLog>, settings: EngineSettings) -> Self {
        Self {
            broker,
            audit,
            settings,
            last_order_at: DashMap::new(),
            trailing: DashMap::new(),
        }
    }

    pub fn has_trailing(&self, symbol: &str) -> bool {
        self.trailing.contains_key(symbol)
    }

    /// Drop every trailing-stop state. Called on shutdown.
    pub fn clear_trailing(&self) {
        self.trailing.clear();
    }

    // ========================================================================
    // Tick Pipeline
    // ========================================================================

    /// Full per-tick pipeline: trailing update and trigger check, then the
    /// strategy, then the decision table. A triggered stop closes the
    /// position and short-circuits the rest of the tick.
    pub async fn process_tick(
        &self,
        symbol: &str,
        tick: &Tick,
        adapter: &mut StrategyAdapter,
        quantity: Decimal,
    ) -> Result<()> {
        if self.check_trailing(symbol, tick.price).await? {
            return Ok(());
        }

        let (signal, risk) = adapter.advance(tick.price, tick.timestamp);
        self.handle_signal(symbol, signal, &risk, quantity, tick.price)
            .await
    }

    /// Returns true when the trailing stop fired and the tick is done.
    async fn check_trailing(&self, symbol: &str, price: Decimal) -> Result<bool> {
        let triggered = match self.trailing.get_mut(symbol) {
            Some(mut state) => {
                let fired = state.update(price);
                if fired {
                    Some(state.stop_price())
                } else {
                    None
                }
            }
            None => return Ok(false),
        };

        let Some(stop_price) = triggered else {
            return Ok(false);
        };

        info!(
            "Trailing stop triggered for {} at {} (stop {:?}), closing position",
            symbol, price, stop_price
        );
        let mut entry = AuditEntry::new(AuditEvent::TrailingStopTriggered, symbol).price(price);
        if let Some(stop) = stop_price {
            entry = entry.detail(format!("stop_price={}", stop));
        }
        self.audit.record(entry);

        // The stop-driven close bypasses the rate limiter: retreating from
        // a losing position must never wait out the window
        match self.broker.close_position(symbol).await {
            Ok(result) => {
                self.last_order_at.insert(symbol.to_string(), Instant::now());
                self.audit.record(
                    AuditEntry::new(AuditEvent::ClosePlaced, symbol)
                        .price(price)
                        .detail(format!("order_id={}", result.order_id)),
                );
            }
            Err(e) => {
                warn!("Stop-triggered close failed for {}: {}", symbol, e);
                self.audit.record(
                    AuditEntry::new(AuditEvent::ClosePlaced, symbol)
                        .outcome(AuditOutcome::Failed)
                        .price(price)
                        .detail(e.to_string()),
                );
            }
        }

        // State is gone either way; a retry against a closed position would
        // be worse than a missed close
        self.trailing.remove(symbol);
        Ok(true)
    }

    // ========================================================================
    // Decision Table
    // ========================================================================

    /// Apply one strategy signal against the broker's current position.
    /// `price` is the tick that produced the signal; rejections carry it so
    /// every attempt is auditable with the same parameter set.
    pub async fn handle_signal(
        &self,
        symbol: &str,
        signal: Signal,
        risk: &RiskParams,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<()> {
        if signal == Signal::Hold {
            return Ok(());
        }

        if let Some(last) = self.last_order_at.get(symbol) {
            if last.elapsed() < self.settings.min_order_interval {
                debug!("Rate limiting order placement for {}", symbol);
                let event = match signal {
                    Signal::Buy => AuditEvent::BuyPlaced,
                    _ => AuditEvent::SellPlaced,
                };
                self.audit.record(
                    AuditEntry::new(event, symbol)
                        .outcome(AuditOutcome::RateLimited)
                        .quantity(quantity)
                        .price(price)
                        .detail(format!("signal={}", signal)),
                );
                return Ok(());
            }
        }

        let (side, position_qty) = match self.broker.get_position(symbol).await {
            Ok(p) => (p.side, p.quantity),
            Err(BrokerError::PositionNotFound) => (PositionSide::Flat, Decimal::ZERO),
            Err(e) => {
                warn!("Position query failed for {}, skipping signal: {}", symbol, e);
                return Ok(());
            }
        };

        match (signal, side) {
            (Signal::Buy, PositionSide::Flat) => {
                self.open(symbol, OrderSide::Buy, quantity, risk).await
            }
            (Signal::Buy, PositionSide::Short) => {
                self.close(symbol, position_qty, "buy signal closes short").await
            }
            (Signal::Buy, PositionSide::Long) => {
                debug!("Signal Buy for {}: already long, no-op", symbol);
                Ok(())
            }
            (Signal::Sell, PositionSide::Long) => {
                self.close(symbol, position_qty, "sell signal closes long").await
            }
            (Signal::Sell, PositionSide::Flat) => {
                if self.settings.allow_short {
                    self.open(symbol, OrderSide::Sell, quantity, risk).await
                } else {
                    debug!("Signal Sell for {}: flat and shorting disabled, no-op", symbol);
                    Ok(())
                }
            }
            (Signal::Sell, PositionSide::Short) => {
                debug!("Signal Sell for {}: already short, no-op", symbol);
                Ok(())
            }
            (Signal::Hold, _) => Ok(()),
        }
    }

    // ========================================================================
    // Order Paths
    // ========================================================================

    async fn open(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        risk: &RiskParams,
    ) -> Result<()> {
        let intent = OrderIntent::market(symbol, side, quantity).with_tag("signal_entry");
        let event = match side {
            OrderSide::Buy => AuditEvent::BuyPlaced,
            OrderSide::Sell => AuditEvent::SellPlaced,
        };

        let direction = match side {
            OrderSide::Buy => "LONG",
            OrderSide::Sell => "SHORT",
        };
        info!("Signal {}: entering {} x{} for {}", side, direction, quantity, symbol);
        let result = match self.broker.submit_order(&intent).await {
            Ok(r) => r,
            Err(e) => {
                warn!("Order submission failed for {}: {}", symbol, e);
                self.audit.record(
                    AuditEntry::new(event, symbol)
                        .outcome(AuditOutcome::Failed)
                        .quantity(quantity)
                        .detail(e.to_string()),
                );
                return Ok(());
            }
        };

        self.last_order_at.insert(symbol.to_string(), Instant::now());
        let mut entry = AuditEntry::new(event, symbol).quantity(quantity);
        if let Some(fill) = result.filled_avg_price {
            entry = entry.price(fill);
        }
        self.audit.record(entry.detail(format!("order_id={}", result.order_id)));

        if let RiskParams::Trailing(params) = risk {
            self.setup_trailing(symbol, side, params).await;
        }
        Ok(())
    }

    /// Initialize trailing state from the broker-confirmed entry price.
    /// The triggering tick price is deliberately not used: real fills slip,
    /// and stop levels must track the fill.
    async fn setup_trailing(&self, symbol: &str, side: OrderSide, params: &TrailingParams) {
        if self.trailing.contains_key(symbol) {
            warn!("Trailing stop already active for {}, overwriting", symbol);
        }

        tokio::time::sleep(self.settings.fill_confirm_delay).await;
        let entry_price = match self.broker.get_position(symbol).await {
            Ok(p) => p.avg_entry_price,
            Err(e) => {
                warn!(
                    "Could not confirm entry price for {}, trailing stop not armed: {}",
                    symbol, e
                );
                return;
            }
        };

        let position_side = match side {
            OrderSide::Buy => PositionSide::Long,
            OrderSide::Sell => PositionSide::Short,
        };
        info!(
            "Trailing stop armed for {} ({}): entry={} activation={} trail={}",
            symbol, position_side, entry_price, params.activation_pct, params.trail_pct
        );
        self.trailing.insert(
            symbol.to_string(),
            TrailingStop::new(position_side, entry_price, params.clone()),
        );
    }

    async fn close(&self, symbol: &str, quantity: Decimal, reason: &str) -> Result<()> {
        info!("Closing {} x{}: {}", symbol, quantity, reason);
        match self.broker.close_position(symbol).await {
            Ok(result) => {
                self.last_order_at.insert(symbol.to_string(), Instant::now());
                self.audit.record(
                    AuditEntry::new(AuditEvent::ClosePlaced, symbol)
                        .quantity(quantity)
                        .detail(format!("order_id={}", result.order_id)),
                );
            }
            Err(BrokerError::PositionNotFound) => {
                // Nothing left to close, treat as done
                debug!("Close for {} found no position", symbol);
            }
            Err(e) => {
                warn!("Close failed for {}: {}", symbol, e);
                self.audit.record(
                    AuditEntry::new(AuditEvent::ClosePlaced, symbol)
                        .outcome(AuditOutcome::Failed)
                        .quantity(quantity)
                        .detail(e.to_string()),
                );
                return Ok(());
            }
        }

        self.trailing.remove(symbol);
        Ok(())
    }
}
