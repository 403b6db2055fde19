//! Bar-driven backtest engine.
//!
//! Drives a batch strategy over a candle series, fills its simulated-broker
//! orders, applies the entry-offset overlay to market intents, and
//! normalizes every matched trade into the audit vocabulary so simulation
//! and live runs produce comparable trails.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::audit::{AuditEntry, AuditEvent, AuditLog};
use crate::config::BacktestConfig;
use crate::domain::{Candle, OrderIntent, OrderSide, PositionSide};
use crate::error::{GambitError, Result};
use crate::risk::{EntryOffset, OffsetConfig};
use crate::strategy::{BatchStrategy, SimAction, SimBroker, SimOrder};

// ============================================================================
// Results
// ============================================================================

/// One round trip through a position.
#[derive(Debug, Clone, Serialize)]
pub struct TradeRecord {
    pub side: PositionSide,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub quantity: Decimal,
    pub profit_loss: Decimal,
    pub duration_secs: i64,
    pub exit_reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub symbol: String,
    pub initial_capital: Decimal,
    pub final_equity: Decimal,
    pub total_return_pct: Decimal,
    pub total_commission: Decimal,
    pub max_drawdown_pct: Decimal,
    pub wins: usize,
    pub losses: usize,
    pub trades: Vec<TradeRecord>,
}

impl BacktestReport {
    pub fn win_rate(&self) -> Option<Decimal> {
        let total = self.wins + self.losses;
        if total == 0 {
            return None;
        }
        Some(Decimal::from(self.wins as u64) / Decimal::from(total as u64) * Decimal::ONE_HUNDRED)
    }

    /// Gross profit divided by gross loss. `None` when there are no losing
    /// trades to divide by.
    pub fn profit_factor(&self) -> Option<Decimal> {
        let gross_profit: Decimal = self
            .trades
            .iter()
            .filter(|t| t.profit_loss > Decimal::ZERO)
            .map(|t| t.profit_loss)
            .sum();
        let gross_loss: Decimal = self
            .trades
            .iter()
            .filter(|t| t.profit_loss < Decimal::ZERO)
            .map(|t| -t.profit_loss)
            .sum();
        if gross_loss.is_zero() {
            return None;
        }
        Some(gross_profit / gross_loss)
    }
}

// ============================================================================
// Engine
// ============================================================================

struct OpenPosition {
    side: PositionSide,
    entry_time: DateTime<Utc>,
    entry_price: Decimal,
    quantity: Decimal,
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
}

/// Limit entry resting in the book until a bar trades through its price.
struct PendingEntry {
    side: OrderSide,
    limit: Decimal,
    quantity: Decimal,
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
}

fn entry_crossed(pending: &PendingEntry, bar: &Candle) -> bool {
    match pending.side {
        OrderSide::Buy => bar.low <= pending.limit,
        OrderSide::Sell => bar.high >= pending.limit,
    }
}

pub struct BacktestEngine {
    config: BacktestConfig,
    offset: EntryOffset,
    audit: Arc<AuditLog>,
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig, offset: OffsetConfig, audit: Arc<AuditLog>) -> Self {
        Self {
            config,
            offset: EntryOffset::new(offset),
            audit,
        }
    }

    /// Run `strategy` over `candles`, trading `quantity` units per entry.
    /// Any position still open after the last bar is liquidated at its close.
    pub fn run(
        &self,
        symbol: &str,
        strategy: &mut dyn BatchStrategy,
        candles: &[Candle],
        quantity: Decimal,
    ) -> Result<BacktestReport> {
        if candles.is_empty() {
            return Err(GambitError::Validation(
                "backtest requires at least one candle".to_string(),
            ));
        }
        if quantity <= Decimal::ZERO {
            return Err(GambitError::Validation(format!(
                "trade quantity must be positive, got {}",
                quantity
            )));
        }

        let mut sim = SimBroker::new();
        let mut cash = self.config.initial_capital;
        let mut commission_paid = Decimal::ZERO;
        let mut open: Option<OpenPosition> = None;
        let mut pending: Option<PendingEntry> = None;
        let mut trades: Vec<TradeRecord> = Vec::new();
        let mut peak_equity = self.config.initial_capital;
        let mut max_drawdown = Decimal::ZERO;

        for i in 0..candles.len() {
            let bar = &candles[i];

            // Protective exits are checked against each bar before the
            // strategy sees it
            if let Some(position) = &open {
                if let Some((exit_price, reason)) = protective_exit(position, bar) {
                    let trade = self.close_position(
                        symbol,
                        open.take().ok_or_else(|| {
                            GambitError::Internal("position vanished mid-bar".to_string())
                        })?,
                        exit_price,
                        bar.timestamp,
                        reason,
                        &mut cash,
                        &mut commission_paid,
                    );
                    trades.push(trade);
                }
            }

            // A resting limit entry fills only once a bar trades through it
            if open.is_none() {
                if let Some(entry) = &pending {
                    if entry_crossed(entry, bar) {
                        let entry = pending.take().ok_or_else(|| {
                            GambitError::Internal("pending entry vanished mid-bar".to_string())
                        })?;
                        debug!("Limit entry filled at {} on bar {}", entry.limit, i);
                        open = Some(self.fill_entry(
                            entry.side,
                            entry.limit,
                            bar.timestamp,
                            entry.quantity,
                            entry.stop_loss,
                            entry.take_profit,
                            &mut cash,
                            &mut commission_paid,
                        ));
                    }
                }
            }

            let before = sim.order_count();
            let side_before = sim.side();
            strategy.on_bar(&candles[..=i], &mut sim)?;

            for order in sim.orders()[before..].to_vec() {
                match classify(&order, side_before) {
                    SimulatedAction::Open(side) => {
                        if open.is_some() || pending.is_some() {
                            debug!("Ignoring entry while one is working at bar {}", i);
                            continue;
                        }
                        match self.place_entry(
                            symbol,
                            side,
                            &order,
                            bar,
                            quantity,
                            &mut cash,
                            &mut commission_paid,
                        ) {
                            PlacedEntry::Filled(position) => open = Some(position),
                            PlacedEntry::Resting(entry) => pending = Some(entry),
                        }
                    }
                    SimulatedAction::Close => {
                        if let Some(position) = open.take() {
                            let trade = self.close_position(
                                symbol,
                                position,
                                bar.close,
                                bar.timestamp,
                                "signal",
                                &mut cash,
                                &mut commission_paid,
                            );
                            trades.push(trade);
                        } else if pending.take().is_some() {
                            debug!("Cancelled unfilled limit entry at bar {}", i);
                        }
                    }
                    SimulatedAction::Ignore => {}
                }
            }

            let equity = cash + unrealized(&open, bar.close);
            if equity > peak_equity {
                peak_equity = equity;
            } else if peak_equity > Decimal::ZERO {
                let dd = (peak_equity - equity) / peak_equity * Decimal::ONE_HUNDRED;
                if dd > max_drawdown {
                    max_drawdown = dd;
                }
            }
        }

        // Last call liquidation; an unfilled limit entry simply expires
        if pending.take().is_some() {
            debug!("Discarding unfilled limit entry at end of data");
        }
        if let Some(position) = open.take() {
            let last = &candles[candles.len() - 1];
            let trade = self.close_position(
                symbol,
                position,
                last.close,
                last.timestamp,
                "end_of_data",
                &mut cash,
                &mut commission_paid,
            );
            trades.push(trade);
        }

        let final_equity = cash;
        let total_return_pct = if self.config.initial_capital > Decimal::ZERO {
            (final_equity - self.config.initial_capital) / self.config.initial_capital
                * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };
        let wins = trades.iter().filter(|t| t.profit_loss > Decimal::ZERO).count();
        let losses = trades.iter().filter(|t| t.profit_loss <= Decimal::ZERO).count();

        info!(
            "Backtest complete for {}: {} trades, return {:.2}%",
            symbol,
            trades.len(),
            total_return_pct
        );

        Ok(BacktestReport {
            symbol: symbol.to_string(),
            initial_capital: self.config.initial_capital,
            final_equity,
            total_return_pct,
            total_commission: commission_paid,
            max_drawdown_pct: max_drawdown,
            wins,
            losses,
            trades,
        })
    }

    /// Places the entry order. Market intents fill at the bar close; intents
    /// carrying a limit (explicit or from the offset overlay) rest until a
    /// later bar trades through the price.
    #[allow(clippy::too_many_arguments)]
    fn place_entry(
        &self,
        symbol: &str,
        side: OrderSide,
        order: &SimOrder,
        bar: &Candle,
        quantity: Decimal,
        cash: &mut Decimal,
        commission_paid: &mut Decimal,
    ) -> PlacedEntry {
        let mut intent = OrderIntent::market(symbol, side, quantity);
        intent.sl = order.stop_loss;
        intent.tp = order.take_profit;
        intent.limit = order.limit;
        self.offset.apply(&mut intent, bar.close, None);

        let event = match side {
            OrderSide::Buy => AuditEvent::BuyPlaced,
            OrderSide::Sell => AuditEvent::SellPlaced,
        };
        self.audit.record(
            AuditEntry::new(event, symbol)
                .quantity(quantity)
                .price(bar.close)
                .limit_price(intent.limit)
                .stop_loss(order.stop_loss)
                .take_profit(order.take_profit),
        );

        match intent.limit {
            Some(limit) => PlacedEntry::Resting(PendingEntry {
                side,
                limit,
                quantity,
                stop_loss: order.stop_loss,
                take_profit: order.take_profit,
            }),
            None => PlacedEntry::Filled(self.fill_entry(
                side,
                bar.close,
                bar.timestamp,
                quantity,
                order.stop_loss,
                order.take_profit,
                cash,
                commission_paid,
            )),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn fill_entry(
        &self,
        side: OrderSide,
        entry_price: Decimal,
        entry_time: DateTime<Utc>,
        quantity: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
        cash: &mut Decimal,
        commission_paid: &mut Decimal,
    ) -> OpenPosition {
        let commission = entry_price * quantity * self.config.commission_rate;
        *commission_paid += commission;
        *cash -= commission;

        OpenPosition {
            side: match side {
                OrderSide::Buy => PositionSide::Long,
                OrderSide::Sell => PositionSide::Short,
            },
            entry_time,
            entry_price,
            quantity,
            stop_loss,
            take_profit,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn close_position(
        &self,
        symbol: &str,
        position: OpenPosition,
        exit_price: Decimal,
        exit_time: DateTime<Utc>,
        reason: &str,
        cash: &mut Decimal,
        commission_paid: &mut Decimal,
    ) -> TradeRecord {
        let direction = match position.side {
            PositionSide::Short => -Decimal::ONE,
            _ => Decimal::ONE,
        };
        let gross = (exit_price - position.entry_price) * position.quantity * direction;
        let commission = exit_price * position.quantity * self.config.commission_rate;
        *commission_paid += commission;
        let net = gross - commission;
        *cash += net;

        self.audit.record(
            AuditEntry::new(AuditEvent::ClosePlaced, symbol)
                .quantity(position.quantity)
                .price(exit_price)
                .detail(reason),
        );
        self.audit.record(
            AuditEntry::new(AuditEvent::TradeExecuted, symbol)
                .quantity(position.quantity)
                .price(exit_price)
                .profit_loss(net)
                .detail(format!("entry={} exit={}", position.entry_price, exit_price)),
        );

        TradeRecord {
            side: position.side,
            entry_time: position.entry_time,
            exit_time,
            entry_price: position.entry_price,
            exit_price,
            quantity: position.quantity,
            profit_loss: net,
            duration_secs: (exit_time - position.entry_time).num_seconds(),
            exit_reason: reason.to_string(),
        }
    }
}

enum PlacedEntry {
    Filled(OpenPosition),
    Resting(PendingEntry),
}

enum SimulatedAction {
    Open(OrderSide),
    Close,
    Ignore,
}

fn classify(order: &SimOrder, side_before: PositionSide) -> SimulatedAction {
    match order.action {
        SimAction::Buy => match side_before {
            PositionSide::Short => SimulatedAction::Close,
            PositionSide::Flat => SimulatedAction::Open(OrderSide::Buy),
            PositionSide::Long => SimulatedAction::Ignore,
        },
        SimAction::Sell => match side_before {
            PositionSide::Long => SimulatedAction::Close,
            PositionSide::Flat => SimulatedAction::Open(OrderSide::Sell),
            PositionSide::Short => SimulatedAction::Ignore,
        },
        SimAction::Close => match side_before {
            PositionSide::Flat => SimulatedAction::Ignore,
            _ => SimulatedAction::Close,
        },
    }
}

/// Stop-loss/take-profit check using the bar's range.
fn protective_exit(position: &OpenPosition, bar: &Candle) -> Option<(Decimal, &'static str)> {
    match position.side {
        PositionSide::Long => {
            if let Some(sl) = position.stop_loss {
                if bar.low <= sl {
                    return Some((sl, "stop_loss"));
                }
            }
            if let Some(tp) = position.take_profit {
                if bar.high >= tp {
                    return Some((tp, "take_profit"));
                }
            }
            None
        }
        PositionSide::Short => {
            if let Some(sl) = position.stop_loss {
                if bar.high >= sl {
                    return Some((sl, "stop_loss"));
                }
            }
            if let Some(tp) = position.take_profit {
                if bar.low <= tp {
                    return Some((tp, "take_profit"));
                }
            }
            None
        }
        PositionSide::Flat => None,
    }
}

fn unrealized(open: &Option<OpenPosition>, price: Decimal) -> Decimal {
    match open {
        Some(p) => {
            let direction = match p.side {
                PositionSide::Short => -Decimal::ONE,
                _ => Decimal::ONE,
            };
            (price - p.entry_price) * p.quantity * direction
        }
        None => Decimal::ZERO,
    }
}
