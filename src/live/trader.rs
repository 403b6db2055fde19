//! Live trader: wires feed, strategy, engine and broker together.
//!
//! Two background tasks run per traded symbol. The data task is the single
//! writer for that symbol's strategy and trailing state: it pulls ticks and
//! runs the full pipeline to completion before taking the next one. The
//! status task periodically publishes account snapshots to observers.
//! A shared `running` flag is checked between cycles, never preemptively.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditEntry, AuditLog};
use crate::broker::BrokerClient;
use crate::config::ExecutionConfig;
use crate::domain::AccountSnapshot;
use crate::error::{GambitError, Result};
use crate::execution::{EngineSettings, ExecutionEngine};
use crate::feed::PriceFeed;
use crate::strategy::StrategyAdapter;

use rust_decimal::Decimal;

pub struct LiveTrader {
    broker: Arc<dyn BrokerClient>,
    engine: Arc<ExecutionEngine>,
    audit: Arc<AuditLog>,
    status_interval: Duration,
    join_timeout: Duration,
    running: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
    snapshot_tx: broadcast::Sender<AccountSnapshot>,
}

impl LiveTrader {
    /// Construction verifies the broker is reachable; an unreachable broker
    /// is a fatal initialization error and the loops are never started.
    pub async fn new(
        broker: Arc<dyn BrokerClient>,
        audit: Arc<AuditLog>,
        config: &ExecutionConfig,
    ) -> Result<Self> {
        broker.account_snapshot().await.map_err(|e| {
            GambitError::Validation(format!("broker {} unreachable: {}", broker.name(), e))
        })?;

        let engine = Arc::new(ExecutionEngine::new(
            broker.clone(),
            audit.clone(),
            EngineSettings::from(config),
        ));
        let (snapshot_tx, _) = broadcast::channel(64);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            broker,
            engine,
            audit,
            status_interval: Duration::from_secs(config.status_interval_secs),
            join_timeout: Duration::from_secs(config.join_timeout_secs),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            workers: Vec::new(),
            snapshot_tx,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn engine(&self) -> &Arc<ExecutionEngine> {
        &self.engine
    }

    /// Account snapshots published by the status loop.
    pub fn subscribe_snapshots(&self) -> broadcast::Receiver<AccountSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Audit entries as they are recorded.
    pub fn subscribe_audit(&self) -> broadcast::Receiver<AuditEntry> {
        self.audit.subscribe()
    }

    /// Spawn the data-feed and status loops for one symbol.
    pub fn start(
        &mut self,
        symbol: &str,
        mut adapter: StrategyAdapter,
        mut feed: Box<dyn PriceFeed>,
        trade_quantity: Decimal,
    ) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(GambitError::Validation("trader already running".to_string()));
        }
        if trade_quantity <= Decimal::ZERO {
            self.running.store(false, Ordering::SeqCst);
            return Err(GambitError::Validation(format!(
                "trade quantity must be positive, got {}",
                trade_quantity
            )));
        }

        info!(
            "Starting live trader for {} (strategy '{}', qty {})",
            symbol,
            adapter.name(),
            trade_quantity
        );

        self.shutdown_tx.send_replace(false);

        // Data-feed loop: the single writer for this symbol. Shutdown is
        // selected against the tick wait so a quiet market cannot pin the
        // loop inside `next_tick`.
        let engine = self.engine.clone();
        let running = self.running.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let data_symbol = symbol.to_string();
        self.workers.push(tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                let tick = tokio::select! {
                    result = feed.next_tick() => match result {
                        Ok(Some(tick)) => tick,
                        Ok(None) => {
                            info!("Feed for {} ended", data_symbol);
                            break;
                        }
                        Err(e) => {
                            warn!("Feed error for {}, retrying: {}", data_symbol, e);
                            continue;
                        }
                    },
                    _ = shutdown_rx.changed() => break,
                };
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(e) = engine
                    .process_tick(&data_symbol, &tick, &mut adapter, trade_quantity)
                    .await
                {
                    error!("Tick processing failed for {}: {}", data_symbol, e);
                }
            }
            // Every exit path releases the subscription explicitly
            if let Err(e) = feed.close().await {
                warn!("Feed close for {} failed: {}", data_symbol, e);
            }
            debug!("Data loop for {} exited", data_symbol);
        }));

        // Status loop: reads broker truth, writes nothing shared
        let broker = self.broker.clone();
        let running = self.running.clone();
        let mut status_shutdown_rx = self.shutdown_tx.subscribe();
        let tx = self.snapshot_tx.clone();
        let interval = self.status_interval;
        let status_symbol = symbol.to_string();
        self.workers.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            while running.load(Ordering::SeqCst) {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = status_shutdown_rx.changed() => break,
                }
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                match broker.account_snapshot().await {
                    // No receivers is not a delivery failure
                    Ok(snapshot) => {
                        let _ = tx.send(snapshot);
                    }
                    Err(e) => warn!("Status query failed: {}", e),
                }
            }
            debug!("Status loop for {} exited", status_symbol);
        }));

        Ok(())
    }

    /// Signal the loops to stop and join them with a bounded timeout. The
    /// data loop closes its feed subscription on the way out, even if it was
    /// mid-wait on a quiet market. Trailing-stop state is cleared whether or
    /// not the join succeeds.
    pub async fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Stopping live trader");
        self.shutdown_tx.send_replace(true);

        for worker in self.workers.drain(..) {
            match tokio::time::timeout(self.join_timeout, worker).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Worker ended abnormally: {}", e),
                Err(_) => warn!(
                    "Worker did not stop within {:?}, detaching",
                    self.join_timeout
                ),
            }
        }

        self.engine.clear_trailing();
        info!("Live trader stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::PaperBroker;
    use crate::config::ExecutionConfig;
    use crate::domain::{RiskParams, Signal};
    use crate::feed::ReplayFeed;
    use crate::strategy::IncrementalStrategy;
    use chrono::{DateTime, Utc};
    use rust_decimal_macros::dec;

    struct BuyOnce {
        fired: bool,
    }

    impl IncrementalStrategy for BuyOnce {
        fn name(&self) -> &str {
            "buy_once"
        }

        fn advance(&mut self, _price: Decimal, _ts: DateTime<Utc>) -> crate::error::Result<Signal> {
            if self.fired {
                return Ok(Signal::Hold);
            }
            self.fired = true;
            Ok(Signal::Buy)
        }
    }

    /// Never yields a tick, like a subscription on a quiet market.
    struct SilentFeed {
        closed: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl crate::feed::PriceFeed for SilentFeed {
        async fn next_tick(&mut self) -> crate::error::Result<Option<crate::domain::Tick>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> crate::error::Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn test_config() -> ExecutionConfig {
        ExecutionConfig {
            min_order_interval_secs: 0,
            fill_confirm_delay_ms: 0,
            status_interval_secs: 1,
            join_timeout_secs: 2,
            allow_short: false,
        }
    }

    #[tokio::test]
    async fn trader_runs_feed_to_completion_and_trades() {
        let broker = Arc::new(PaperBroker::new(dec!(10000)));
        broker.set_mark("TEST", dec!(100));
        let audit = Arc::new(AuditLog::new());

        let mut trader = LiveTrader::new(broker.clone(), audit.clone(), &test_config())
            .await
            .unwrap();

        let adapter = StrategyAdapter::incremental(Box::new(BuyOnce { fired: false }));
        let feed = Box::new(ReplayFeed::from_prices(&[dec!(100), dec!(101), dec!(102)]));
        trader.start("TEST", adapter, feed, dec!(1)).unwrap();
        assert!(trader.is_running());

        tokio::time::sleep(Duration::from_millis(100)).await;
        trader.stop().await;
        assert!(!trader.is_running());

        assert_eq!(broker.submitted_orders().len(), 1);
        assert_eq!(audit.len(), 1);
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let broker = Arc::new(PaperBroker::new(dec!(1000)));
        broker.set_mark("TEST", dec!(10));
        let mut trader =
            LiveTrader::new(broker, Arc::new(AuditLog::new()), &test_config())
                .await
                .unwrap();

        let feed = Box::new(ReplayFeed::from_prices(&[]));
        trader
            .start(
                "TEST",
                StrategyAdapter::incremental(Box::new(BuyOnce { fired: true })),
                feed,
                dec!(1),
            )
            .unwrap();

        let again = trader.start(
            "TEST",
            StrategyAdapter::incremental(Box::new(BuyOnce { fired: true })),
            Box::new(ReplayFeed::from_prices(&[])),
            dec!(1),
        );
        assert!(again.is_err());
        trader.stop().await;
    }

    #[tokio::test]
    async fn status_loop_publishes_snapshots() {
        let broker = Arc::new(PaperBroker::new(dec!(5000)));
        broker.set_mark("TEST", dec!(10));
        let mut trader =
            LiveTrader::new(broker, Arc::new(AuditLog::new()), &test_config())
                .await
                .unwrap();
        let mut rx = trader.subscribe_snapshots();

        trader
            .start(
                "TEST",
                StrategyAdapter::incremental(Box::new(BuyOnce { fired: true })),
                Box::new(ReplayFeed::from_prices(&[dec!(10)])),
                dec!(1),
            )
            .unwrap();

        // The interval's first tick fires immediately
        let snapshot = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no snapshot within 2s")
            .unwrap();
        assert_eq!(snapshot.cash, dec!(5000));
        assert_eq!(snapshot.equity, dec!(5000));

        trader.stop().await;
    }

    #[tokio::test]
    async fn stop_closes_a_feed_stuck_waiting_for_ticks() {
        let broker = Arc::new(PaperBroker::new(dec!(1000)));
        broker.set_mark("TEST", dec!(10));
        let mut trader =
            LiveTrader::new(broker, Arc::new(AuditLog::new()), &test_config())
                .await
                .unwrap();

        let closed = Arc::new(AtomicBool::new(false));
        trader
            .start(
                "TEST",
                StrategyAdapter::incremental(Box::new(BuyOnce { fired: true })),
                Box::new(SilentFeed {
                    closed: closed.clone(),
                }),
                dec!(1),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        trader.stop().await;
        assert!(closed.load(Ordering::SeqCst));
        assert!(!trader.is_running());
    }

    #[tokio::test]
    async fn stop_clears_trailing_state() {
        let broker = Arc::new(PaperBroker::new(dec!(10000)));
        broker.set_mark("TEST", dec!(100));
        let mut trader =
            LiveTrader::new(broker, Arc::new(AuditLog::new()), &test_config())
                .await
                .unwrap();

        trader
            .engine()
            .handle_signal(
                "TEST",
                Signal::Buy,
                &RiskParams::Trailing(Default::default()),
                dec!(1),
                dec!(100),
            )
            .await
            .unwrap();
        assert!(trader.engine().has_trailing("TEST"));

        trader
            .start(
                "TEST",
                StrategyAdapter::incremental(Box::new(BuyOnce { fired: true })),
                Box::new(ReplayFeed::from_prices(&[])),
                dec!(1),
            )
            .unwrap();
        trader.stop().await;
        assert!(!trader.engine().has_trailing("TEST"));
    }
}
