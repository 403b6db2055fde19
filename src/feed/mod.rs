//! Market data sources.
//!
//! A feed produces a stream of ticks for one symbol. The live trader runs
//! exactly one feed task per symbol, which is the single writer for that
//! symbol's strategy state.

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use std::time::Duration;

use crate::domain::Tick;
use crate::error::{GambitError, Result};

/// Source of price ticks for a single symbol.
#[async_trait]
pub trait PriceFeed: Send {
    /// Next tick, or `None` once the feed is exhausted.
    async fn next_tick(&mut self) -> Result<Option<Tick>>;

    /// Release the underlying subscription. Called exactly once when the
    /// trader stops; in-memory feeds have nothing to release.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Simulated Feed
// ============================================================================

/// Random-walk price feed for paper trading.
pub struct SimulatedFeed {
    price: f64,
    step_pct: f64,
    interval: Duration,
}

impl SimulatedFeed {
    pub fn new(start_price: Decimal, interval: Duration) -> Self {
        Self {
            price: start_price.to_f64().unwrap_or(100.0),
            step_pct: 0.002,
            interval,
        }
    }
}

#[async_trait]
impl PriceFeed for SimulatedFeed {
    async fn next_tick(&mut self) -> Result<Option<Tick>> {
        tokio::time::sleep(self.interval).await;

        let drift: f64 = rand::thread_rng().gen_range(-self.step_pct..self.step_pct);
        self.price *= 1.0 + drift;

        let price = Decimal::from_f64(self.price)
            .ok_or_else(|| GambitError::Feed(format!("non-finite price {}", self.price)))?
            .round_dp(4);

        Ok(Some(Tick {
            price,
            timestamp: Utc::now(),
        }))
    }
}

// ============================================================================
// Replay Feed
// ============================================================================

/// Replays a fixed series of ticks, then ends. Used by backtests and tests.
pub struct ReplayFeed {
    ticks: std::vec::IntoIter<Tick>,
}

impl ReplayFeed {
    pub fn new(ticks: Vec<Tick>) -> Self {
        Self {
            ticks: ticks.into_iter(),
        }
    }

    /// Build a feed from bare prices, timestamped one second apart.
    pub fn from_prices(prices: &[Decimal]) -> Self {
        let start = Utc::now();
        let ticks = prices
            .iter()
            .enumerate()
            .map(|(i, p)| Tick {
                price: *p,
                timestamp: start + chrono::Duration::seconds(i as i64),
            })
            .collect();
        Self::new(ticks)
    }
}

#[async_trait]
impl PriceFeed for ReplayFeed {
    async fn next_tick(&mut self) -> Result<Option<Tick>> {
        Ok(self.ticks.next())
    }
}
