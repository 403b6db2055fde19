//! Live trading runtime.

pub mod trader;

pub use trader::LiveTrader;
