//! Historical simulation.

pub mod engine;

pub use engine::{BacktestEngine, BacktestReport, TradeRecord};
