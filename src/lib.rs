pub mod audit;
pub mod backtest;
pub mod broker;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod execution;
pub mod feed;
pub mod live;
pub mod risk;
pub mod strategy;

pub use audit::{AuditEntry, AuditEvent, AuditLog, AuditOutcome};
pub use backtest::{BacktestEngine, BacktestReport, TradeRecord};
pub use broker::{BrokerClient, PaperBroker};
pub use config::AppConfig;
pub use domain::{
    AccountSnapshot, Candle, OrderIntent, OrderResult, OrderSide, Position, PositionSide,
    RiskParams, Signal, Tick, TrailingParams,
};
pub use error::{BrokerError, GambitError, Result};
pub use execution::{EngineSettings, ExecutionEngine};
pub use feed::{PriceFeed, ReplayFeed, SimulatedFeed};
pub use live::LiveTrader;
pub use risk::{EntryOffset, OffsetConfig, TrailingStop};
pub use strategy::{
    BatchStrategy, CoinFlipStrategy, IncrementalStrategy, StrategyAdapter, TickMomentumConfig,
    TickMomentumStrategy,
};
