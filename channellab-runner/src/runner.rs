//! Backtest orchestration: validate, fan cycles out across rayon workers,
//! then merge outcomes chronologically into one result.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

use channellab_core::domain::Trade;
use channellab_core::signal::PairSnapshot;

use crate::calendar::build_cycles;
use crate::config::{BacktestConfig, ConfigError, RunId};
use crate::cycle::{evaluate_cycle, CycleOutcome};
use crate::data::MarketData;
use crate::metrics::{monthly_pnl, PerformanceMetrics};

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Everything a run produced, merged in chronological order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub run_id: RunId,
    pub config: BacktestConfig,
    pub trades: Vec<Trade>,
    /// Starting balance followed by one point per trade close.
    pub equity_curve: Vec<f64>,
    pub monthly_pnl: BTreeMap<String, f64>,
    pub metrics: PerformanceMetrics,
    /// Per-bar monitoring snapshots across all evaluated cycles.
    pub snapshots: Vec<PairSnapshot>,
    pub cycles_evaluated: usize,
    pub cycles_skipped: usize,
    /// True when cancellation stopped further cycles from being scheduled;
    /// cycles already evaluated are retained.
    pub cancelled: bool,
}

impl BacktestResult {
    pub fn final_balance(&self) -> f64 {
        self.equity_curve
            .last()
            .copied()
            .unwrap_or(self.config.starting_balance)
    }
}

/// Run the full backtest. Fails only on configuration validation; every
/// data problem degrades to a skipped cycle.
pub fn run_backtest(config: &BacktestConfig, data: &MarketData) -> Result<BacktestResult, RunError> {
    run_backtest_cancelled(config, data, &AtomicBool::new(false))
}

/// As [`run_backtest`], but checks `cancel` before evaluating each cycle.
/// Already-evaluated cycles are kept in the (partial) result.
pub fn run_backtest_cancelled(
    config: &BacktestConfig,
    data: &MarketData,
    cancel: &AtomicBool,
) -> Result<BacktestResult, RunError> {
    config.validate()?;

    let cycles = build_cycles(config.start_date, config.end_date);

    // Workers return immutable outcomes; rayon preserves cycle order, so
    // the merge below is chronological without a sort.
    let outcomes: Vec<CycleOutcome> = cycles
        .par_iter()
        .filter_map(|cycle| {
            if cancel.load(Ordering::Relaxed) {
                None
            } else {
                Some(evaluate_cycle(config, data, cycle))
            }
        })
        .collect();

    let cancelled = cancel.load(Ordering::Relaxed);
    Ok(merge_outcomes(config, outcomes, cancelled))
}

/// Single-aggregator merge: trade list, equity curve, monthly buckets,
/// metrics. The equity curve appends one point per trade close.
fn merge_outcomes(
    config: &BacktestConfig,
    outcomes: Vec<CycleOutcome>,
    cancelled: bool,
) -> BacktestResult {
    let cycles_evaluated = outcomes.len();
    let mut trades = Vec::new();
    let mut snapshots = Vec::new();
    let mut cycles_skipped = 0;
    let mut equity_curve = vec![config.starting_balance];
    let mut balance = config.starting_balance;

    for outcome in outcomes {
        if outcome.skipped.is_some() {
            cycles_skipped += 1;
        }
        snapshots.extend(outcome.snapshots);
        if let Some(trade) = outcome.trade {
            balance += trade.pnl;
            equity_curve.push(balance);
            trades.push(trade);
        }
    }

    let metrics = PerformanceMetrics::compute(&equity_curve, &trades, config.starting_balance);
    let monthly = monthly_pnl(&trades);

    BacktestResult {
        run_id: config.run_id(),
        config: config.clone(),
        trades,
        equity_curve,
        monthly_pnl: monthly,
        metrics,
        snapshots,
        cycles_evaluated,
        cycles_skipped,
        cancelled,
    }
}
