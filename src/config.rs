use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::domain::TrailingParams;
use crate::risk::OffsetConfig;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub trading: TradingConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Entry-offset overlay (simulation only)
    #[serde(default)]
    pub offset: OffsetConfig,
    /// Default trailing-stop parameters for strategies that request the
    /// overlay without supplying their own
    #[serde(default)]
    pub trailing: TrailingParams,
    #[serde(default)]
    pub backtest: BacktestConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Symbol to trade (e.g., "AAPL", "BTC/USD")
    pub symbol: String,
    /// Quantity per signal, in units of the symbol
    pub trade_quantity: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Minimum interval between successive order submissions (rate limiter)
    #[serde(default = "default_min_order_interval")]
    pub min_order_interval_secs: u64,
    /// Delay before re-querying the confirmed entry price after an open
    #[serde(default = "default_fill_confirm_delay")]
    pub fill_confirm_delay_ms: u64,
    /// Period of the account status loop
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,
    /// Bounded timeout when joining background workers on stop
    #[serde(default = "default_join_timeout")]
    pub join_timeout_secs: u64,
    /// When false, a Sell signal with no open position is a no-op instead
    /// of opening a short
    #[serde(default)]
    pub allow_short: bool,
}

fn default_min_order_interval() -> u64 {
    5
}

fn default_fill_confirm_delay() -> u64 {
    500
}

fn default_status_interval() -> u64 {
    5
}

fn default_join_timeout() -> u64 {
    10
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            min_order_interval_secs: default_min_order_interval(),
            fill_confirm_delay_ms: default_fill_confirm_delay(),
            status_interval_secs: default_status_interval(),
            join_timeout_secs: default_join_timeout(),
            allow_short: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BacktestConfig {
    #[serde(default = "default_initial_capital")]
    pub initial_capital: Decimal,
    /// Commission per side, as a fraction of notional (e.g., 0.002)
    #[serde(default = "default_commission_rate")]
    pub commission_rate: Decimal,
}

fn default_initial_capital() -> Decimal {
    Decimal::from(100_000)
}

fn default_commission_rate() -> Decimal {
    Decimal::new(2, 3) // 0.002
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: default_initial_capital(),
            commission_rate: default_commission_rate(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuditConfig {
    /// Optional JSONL file the audit log appends to
    #[serde(default)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("GAMBIT_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (GAMBIT_TRADING__SYMBOL, etc.)
            .add_source(
                Environment::with_prefix("GAMBIT")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Create a default configuration for CLI usage
    pub fn default_config(symbol: &str, trade_quantity: Decimal) -> Self {
        Self {
            trading: TradingConfig {
                symbol: symbol.to_string(),
                trade_quantity,
            },
            execution: ExecutionConfig::default(),
            offset: OffsetConfig::default(),
            trailing: TrailingParams::default(),
            backtest: BacktestConfig::default(),
            audit: AuditConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validate configuration values.
    ///
    /// Failures here are construction-time fatal errors; runtime risk
    /// parameters are normalized instead (see `TrailingParams::normalized`).
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.trading.symbol.trim().is_empty() {
            errors.push("trading.symbol must not be empty".to_string());
        }

        if self.trading.trade_quantity <= Decimal::ZERO {
            errors.push("trading.trade_quantity must be positive".to_string());
        }

        if self.execution.min_order_interval_secs == 0 {
            errors.push("execution.min_order_interval_secs must be at least 1".to_string());
        }

        // A zero period is rejected by tokio's interval timer
        if self.execution.status_interval_secs == 0 {
            errors.push("execution.status_interval_secs must be at least 1".to_string());
        }

        if self.execution.join_timeout_secs == 0 {
            errors.push("execution.join_timeout_secs must be at least 1".to_string());
        }

        if self.backtest.initial_capital <= Decimal::ZERO {
            errors.push("backtest.initial_capital must be positive".to_string());
        }

        if self.backtest.commission_rate < Decimal::ZERO
            || self.backtest.commission_rate >= Decimal::ONE
        {
            errors.push("backtest.commission_rate must be in [0, 1)".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default_config("BTC/USD", dec!(0.001));
        assert!(config.validate().is_ok());
        assert_eq!(config.execution.min_order_interval_secs, 5);
        assert_eq!(config.execution.status_interval_secs, 5);
    }

    #[test]
    fn validate_rejects_bad_quantity() {
        let config = AppConfig::default_config("BTC/USD", Decimal::ZERO);
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("trade_quantity")));
    }

    #[test]
    fn validate_rejects_empty_symbol() {
        let config = AppConfig::default_config("  ", dec!(1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_loop_intervals() {
        let mut config = AppConfig::default_config("BTC/USD", dec!(1));
        config.execution.status_interval_secs = 0;
        config.execution.join_timeout_secs = 0;
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("status_interval_secs")));
        assert!(errors.iter().any(|e| e.contains("join_timeout_secs")));
    }
}
