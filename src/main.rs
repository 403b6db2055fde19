use clap::Parser;
use gambit::audit::AuditLog;
use gambit::broker::PaperBroker;
use gambit::cli::{self, Cli, Commands, StrategyKind};
use gambit::config::AppConfig;
use gambit::domain::{Candle, RiskParams};
use gambit::error::{GambitError, Result};
use gambit::feed::SimulatedFeed;
use gambit::live::LiveTrader;
use gambit::risk::{OffsetConfig, OffsetMode};
use gambit::strategy::{
    BatchStrategy, CoinFlipStrategy, StrategyAdapter, TickMomentumConfig, TickMomentumStrategy,
};
use gambit::BacktestEngine;

use chrono::Utc;
use rand::Rng;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    init_logging(&config.logging);
    if let Err(problems) = config.validate() {
        for p in &problems {
            error!("Config: {}", p);
        }
        return Err(GambitError::Validation(format!(
            "{} config problem(s)",
            problems.len()
        )));
    }

    match cli.command {
        Commands::Run {
            symbol,
            quantity,
            strategy,
            start_price,
            tick_interval_ms,
            trailing,
        } => {
            let symbol = symbol.unwrap_or_else(|| config.trading.symbol.clone());
            let quantity = quantity.unwrap_or(config.trading.trade_quantity);
            let risk = if trailing {
                RiskParams::Trailing(config.trailing.clone())
            } else {
                RiskParams::None
            };
            run_live(
                &config,
                &symbol,
                quantity,
                strategy,
                risk,
                start_price,
                Duration::from_millis(tick_interval_ms),
            )
            .await
        }
        Commands::Backtest {
            symbol,
            quantity,
            strategy,
            data,
            bars,
            offset_pct,
        } => {
            let symbol = symbol.unwrap_or_else(|| config.trading.symbol.clone());
            let quantity = quantity.unwrap_or(config.trading.trade_quantity);
            run_backtest(&config, &symbol, quantity, strategy, data.as_deref(), bars, offset_pct)
        }
    }
}

async fn run_live(
    config: &AppConfig,
    symbol: &str,
    quantity: Decimal,
    kind: StrategyKind,
    risk: RiskParams,
    start_price: Decimal,
    tick_interval: Duration,
) -> Result<()> {
    let broker = Arc::new(PaperBroker::new(config.backtest.initial_capital));
    broker.set_mark(symbol, start_price);

    let audit = match &config.audit.file {
        Some(path) => Arc::new(AuditLog::with_file(path)?),
        None => Arc::new(AuditLog::new()),
    };

    let adapter = match kind {
        StrategyKind::Momentum => {
            let strategy = TickMomentumStrategy::new(TickMomentumConfig {
                risk,
                ..TickMomentumConfig::default()
            })?;
            StrategyAdapter::incremental(Box::new(strategy))
        }
        StrategyKind::CoinFlip => {
            StrategyAdapter::batch(Box::new(CoinFlipStrategy::new(20, risk)))
        }
    };

    let mut trader = LiveTrader::new(broker.clone(), audit.clone(), &config.execution).await?;

    // Observer: print entries as they happen, fire-and-forget
    let mut audit_rx = trader.subscribe_audit();
    tokio::spawn(async move {
        while let Ok(entry) = audit_rx.recv().await {
            info!(
                "[audit] {} {} {:?} qty={:?} price={:?}",
                entry.event, entry.symbol, entry.outcome, entry.quantity, entry.price
            );
        }
    });
    let mut snapshot_rx = trader.subscribe_snapshots();
    tokio::spawn(async move {
        while let Ok(snapshot) = snapshot_rx.recv().await {
            info!(
                "[status] equity={} cash={} positions={}",
                snapshot.equity,
                snapshot.cash,
                snapshot.positions.len()
            );
        }
    });

    let feed = Box::new(SimulatedFeed::new(start_price, tick_interval));
    trader.start(symbol, adapter, feed, quantity)?;
    info!("Live paper trading on {}. Ctrl+C to stop.", symbol);

    shutdown_signal().await;
    trader.stop().await;
    Ok(())
}

fn run_backtest(
    config: &AppConfig,
    symbol: &str,
    quantity: Decimal,
    kind: StrategyKind,
    data: Option<&str>,
    bars: usize,
    offset_pct: Option<Decimal>,
) -> Result<()> {
    let candles = match data {
        Some(path) => load_candles(Path::new(path))?,
        None => random_walk(bars),
    };
    info!("Backtesting {} over {} bars", symbol, candles.len());

    let offset = match offset_pct {
        Some(value) => OffsetConfig {
            enabled: true,
            mode: OffsetMode::Percent,
            value,
            ..OffsetConfig::default()
        },
        None => config.offset.clone(),
    };

    let audit = match &config.audit.file {
        Some(path) => Arc::new(AuditLog::with_file(path)?),
        None => Arc::new(AuditLog::new()),
    };
    let engine = BacktestEngine::new(config.backtest.clone(), offset, audit);

    let mut strategy: Box<dyn BatchStrategy> = match kind {
        StrategyKind::CoinFlip => {
            Box::new(CoinFlipStrategy::new(20, RiskParams::None))
        }
        StrategyKind::Momentum => {
            return Err(GambitError::Validation(
                "momentum is an incremental strategy; backtest expects a batch one".to_string(),
            ))
        }
    };

    let report = engine.run(symbol, strategy.as_mut(), &candles, quantity)?;
    cli::print_report(&report);
    Ok(())
}

/// One close per line, oldest first.
fn load_candles(path: &Path) -> Result<Vec<Candle>> {
    let contents = std::fs::read_to_string(path).map_err(GambitError::Io)?;
    let start = Utc::now();
    let mut candles = Vec::new();
    for (i, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let price = Decimal::from_str(line).map_err(|e| {
            GambitError::Validation(format!("{}:{}: bad price '{}': {}", path.display(), i + 1, line, e))
        })?;
        candles.push(Candle::from_tick(
            price,
            start + chrono::Duration::minutes(i as i64),
        ));
    }
    Ok(candles)
}

fn random_walk(bars: usize) -> Vec<Candle> {
    let mut rng = rand::thread_rng();
    let mut price = 100.0f64;
    let start = Utc::now();
    (0..bars)
        .map(|i| {
            price *= 1.0 + rng.gen_range(-0.01..0.01);
            let close = Decimal::from_f64(price).unwrap_or(Decimal::ONE_HUNDRED).round_dp(4);
            Candle::from_tick(close, start + chrono::Duration::minutes(i as i64))
        })
        .collect()
}

fn init_logging(logging: &gambit::config::LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},gambit=debug", logging.level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
