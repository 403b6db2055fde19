use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;

use crate::backtest::BacktestReport;

#[derive(Parser)]
#[command(name = "gambit")]
#[command(version = "0.1.0")]
#[command(about = "Signal-driven trade execution engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long)]
    pub config: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyKind {
    /// Fast/slow moving-average crossover (incremental shape)
    Momentum,
    /// Random entries with fixed holding period (batch shape)
    CoinFlip,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run live paper trading against a simulated feed
    Run {
        /// Symbol to trade
        #[arg(short, long)]
        symbol: Option<String>,
        /// Units per entry
        #[arg(short, long)]
        quantity: Option<Decimal>,
        /// Strategy to run
        #[arg(long, value_enum, default_value_t = StrategyKind::Momentum)]
        strategy: StrategyKind,
        /// Starting price of the simulated feed
        #[arg(long, default_value = "100")]
        start_price: Decimal,
        /// Milliseconds between simulated ticks
        #[arg(long, default_value = "250")]
        tick_interval_ms: u64,
        /// Attach a trailing stop to every entry
        #[arg(long)]
        trailing: bool,
    },
    /// Run a historical backtest
    Backtest {
        /// Symbol label for the report
        #[arg(short, long)]
        symbol: Option<String>,
        /// Units per entry
        #[arg(short, long)]
        quantity: Option<Decimal>,
        /// Strategy to run
        #[arg(long, value_enum, default_value_t = StrategyKind::CoinFlip)]
        strategy: StrategyKind,
        /// File with one close price per line; random walk when omitted
        #[arg(long)]
        data: Option<String>,
        /// Number of generated bars when no data file is given
        #[arg(long, default_value = "500")]
        bars: usize,
        /// Entry offset percentage applied to market intents
        #[arg(long)]
        offset_pct: Option<Decimal>,
    },
}

/// Print a finished backtest report to stdout.
pub fn print_report(report: &BacktestReport) {
    println!();
    println!("Backtest: {}", report.symbol);
    println!("  Initial capital:  {}", report.initial_capital);
    println!("  Final equity:     {}", report.final_equity);
    println!("  Return:           {:.2}%", report.total_return_pct);
    println!("  Max drawdown:     {:.2}%", report.max_drawdown_pct);
    println!("  Commission paid:  {}", report.total_commission);
    println!("  Trades:           {}", report.trades.len());
    match report.win_rate() {
        Some(rate) => println!("  Win rate:         {:.1}% ({}W/{}L)", rate, report.wins, report.losses),
        None => println!("  Win rate:         n/a"),
    }
    match report.profit_factor() {
        Some(pf) => println!("  Profit factor:    {:.2}", pf),
        None => println!("  Profit factor:    n/a"),
    }
}
