use thiserror::Error;

/// Main error type for the trading engine
#[derive(Error, Debug)]
pub enum GambitError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    Validation(String),

    // Broker errors
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    // Market data errors
    #[error("Market feed error: {0}")]
    Feed(String),

    // Strategy errors
    #[error("Strategy error: {0}")]
    Strategy(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for GambitError
pub type Result<T> = std::result::Result<T, GambitError>;

/// Error taxonomy for broker interactions.
///
/// `PositionNotFound` is an expected condition, not a failure: callers
/// normalize it to a flat position. `Transient` covers network and
/// 5xx-class failures that should be logged and skipped, never crash a
/// loop.
#[derive(Error, Debug, Clone)]
pub enum BrokerError {
    #[error("Transient broker failure: {0}")]
    Transient(String),

    #[error("No open position for symbol")]
    PositionNotFound,

    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("Authentication failed: {0}")]
    Auth(String),
}

impl BrokerError {
    /// Whether the failure is expected to clear on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Transient(_))
    }
}
