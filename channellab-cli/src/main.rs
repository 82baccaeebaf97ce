//! ChannelLab CLI — run weekly options backtests from CSV market data.
//!
//! Commands:
//! - `run` — execute a backtest from a TOML config, an underlying CSV, and
//!   a directory of per-contract premium CSVs
//! - `check` — validate a config file and report the derived run id

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use channellab_core::domain::Timeframe;
use channellab_runner::config::BacktestConfig;
use channellab_runner::data_loader::load_market_data;
use channellab_runner::runner::{run_backtest, BacktestResult};

#[derive(Parser)]
#[command(
    name = "channellab",
    about = "ChannelLab CLI — channel breakout options backtesting engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a backtest and print the performance summary.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// CSV file with underlying index candles.
        #[arg(long)]
        underlying: PathBuf,

        /// Directory of premium CSVs named like `23500CE_2024-05-30.csv`.
        #[arg(long)]
        premium_dir: PathBuf,

        /// Width of the input candles in minutes.
        #[arg(long, default_value_t = 5)]
        base_minutes: u32,

        /// Write the full result (trades, snapshots, metrics) as JSON.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Validate a config file and print its run id.
    Check {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            underlying,
            premium_dir,
            base_minutes,
            output,
        } => run_cmd(&config, &underlying, &premium_dir, base_minutes, output),
        Commands::Check { config } => check_cmd(&config),
    }
}

fn run_cmd(
    config_path: &Path,
    underlying: &Path,
    premium_dir: &Path,
    base_minutes: u32,
    output: Option<PathBuf>,
) -> Result<()> {
    let config = BacktestConfig::from_toml_file(config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;

    let data = load_market_data(underlying, premium_dir, Timeframe(base_minutes))
        .with_context(|| format!("loading market data from {}", premium_dir.display()))?;

    let result = run_backtest(&config, &data).context("running backtest")?;

    print_summary(&result);

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&result)?;
        std::fs::write(&path, json)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Result written to: {}", path.display());
    }

    Ok(())
}

fn check_cmd(config_path: &Path) -> Result<()> {
    let config = BacktestConfig::from_toml_file(config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    config.validate()?;
    println!("Config OK: {}", config_path.display());
    println!("Run id:    {}", config.run_id());
    Ok(())
}

fn print_summary(result: &BacktestResult) {
    let config = &result.config;
    println!();
    println!("=== Backtest Result ===");
    println!("Underlying:     {}", config.underlying);
    println!(
        "Period:         {} to {}",
        config.start_date, config.end_date
    );
    println!(
        "Cycles:         {} evaluated ({} skipped)",
        result.cycles_evaluated, result.cycles_skipped
    );
    println!("Trades:         {}", result.metrics.trade_count);
    println!("Run id:         {}", result.run_id);
    println!();
    println!("--- Performance ---");
    println!("Final Balance:  {:.2}", result.final_balance());
    println!("Total Return:   {:.2}%", result.metrics.total_return_pct);
    println!("Sharpe:         {:.3}", result.metrics.sharpe);
    println!(
        "Max Drawdown:   {:.2}%",
        result.metrics.max_drawdown * 100.0
    );
    println!("Win Rate:       {:.1}%", result.metrics.win_rate * 100.0);
    println!("Profit Factor:  {:.2}", result.metrics.profit_factor);
    println!("Avg Win:        {:.2}", result.metrics.avg_win);
    println!("Avg Loss:       {:.2}", result.metrics.avg_loss);
    if !result.monthly_pnl.is_empty() {
        println!();
        println!("--- Monthly PnL ---");
        for (month, pnl) in &result.monthly_pnl {
            println!("{month}:        {pnl:>10.2}");
        }
    }
    if result.cancelled {
        println!();
        println!("WARNING: run was cancelled before all cycles completed");
    }
    println!();
}
