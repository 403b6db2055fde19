use async_trait::async_trait;

use crate::domain::{AccountSnapshot, OrderIntent, OrderResult, Position};
use crate::error::BrokerError;

/// The broker contract this engine requires.
///
/// The broker is the authoritative source of position truth: fills can
/// happen outside the engine's control, so implementations must answer
/// `get_position` from live state, not a cache. Timeout handling is the
/// client's responsibility; the engine never cancels a call mid-flight.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Broker name for logging
    fn name(&self) -> &str;

    /// Query the open position for a symbol.
    ///
    /// Returns `BrokerError::PositionNotFound` when the broker has no
    /// position for the symbol; callers normalize that to flat.
    async fn get_position(&self, symbol: &str) -> Result<Position, BrokerError>;

    /// Submit an order. Market intents carry neither limit nor stop.
    async fn submit_order(&self, intent: &OrderIntent) -> Result<OrderResult, BrokerError>;

    /// Close the full open position for a symbol with a market order.
    async fn close_position(&self, symbol: &str) -> Result<OrderResult, BrokerError>;

    /// Query equity, cash, open positions and open orders.
    async fn account_snapshot(&self) -> Result<AccountSnapshot, BrokerError>;
}
