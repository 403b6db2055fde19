//! Trading strategies and the adapter that unifies their calling shapes.

pub mod adapter;
pub mod coin_flip;
pub mod momentum;
pub mod traits;

pub use adapter::StrategyAdapter;
pub use coin_flip::CoinFlipStrategy;
pub use momentum::{TickMomentumConfig, TickMomentumStrategy};
pub use traits::{BatchStrategy, IncrementalStrategy, SimAction, SimBroker, SimOrder};
