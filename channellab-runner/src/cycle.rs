//! Deterministic replay of one expiry cycle.
//!
//! Each trading day selects the strike nearest the underlying's open, then
//! drives the call/put pair engine bar by bar over the short timeframe.
//! Channel detection sees only the premium history up to the current bar;
//! momentum comes from the long-timeframe series the same way. The first
//! materialized trade ends the cycle's signal search.
//!
//! Every data problem inside a cycle degrades to a skipped outcome; the
//! orchestrator never aborts the run for one bad week.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use channellab_core::channel::detect_channel;
use channellab_core::domain::{Candle, ContractSpec, OptionType, Timeframe, Trade};
use channellab_core::lifecycle::{plan_trade, simulate};
use channellab_core::momentum::{compute_kst, MomentumSignal};
use channellab_core::resample::resample;
use channellab_core::signal::{PairEngine, PairSnapshot, SideInputs};

use crate::calendar::ExpiryCycle;
use crate::config::BacktestConfig;
use crate::data::{nearest_strike, ContractKey, MarketData};

/// Why a cycle produced no signal evaluation at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// The date range clipped away every trading day.
    NoTradingDays,
    /// No underlying candles on any trading day, so no strike selection.
    NoUnderlyingData,
    /// No day had premium series for both legs of the selected strike.
    NoPremiumData,
}

/// Immutable result of one cycle's replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleOutcome {
    pub expiry: NaiveDate,
    pub trade: Option<Trade>,
    pub skipped: Option<SkipReason>,
    /// Per-bar monitoring snapshots, in replay order.
    pub snapshots: Vec<PairSnapshot>,
}

impl CycleOutcome {
    fn skipped(expiry: NaiveDate, reason: SkipReason) -> Self {
        Self {
            expiry,
            trade: None,
            skipped: Some(reason),
            snapshots: Vec::new(),
        }
    }
}

/// Pre-resampled views of one premium series.
struct SideSeries {
    short: Vec<Candle>,
    momentum: Vec<MomentumSignal>,
    long_minutes: i64,
}

impl SideSeries {
    fn build(base: &[Candle], config: &BacktestConfig) -> Self {
        let short: Vec<Candle> =
            resample(base, Timeframe(config.short_timeframe_minutes)).collect();
        let long: Vec<Candle> = resample(base, Timeframe(config.long_timeframe_minutes)).collect();
        let momentum = compute_kst(&long, &config.momentum);
        Self {
            short,
            momentum,
            long_minutes: config.long_timeframe_minutes as i64,
        }
    }

    /// Latest long-timeframe signal whose bar has fully closed by `ts`.
    fn momentum_at(&self, ts: chrono::NaiveDateTime) -> Option<&MomentumSignal> {
        self.momentum
            .iter()
            .rev()
            .find(|m| m.timestamp + Duration::minutes(self.long_minutes) <= ts)
    }
}

/// Replay one expiry cycle against the loaded market data.
pub fn evaluate_cycle(
    config: &BacktestConfig,
    data: &MarketData,
    cycle: &ExpiryCycle,
) -> CycleOutcome {
    if cycle.trading_days.is_empty() {
        return CycleOutcome::skipped(cycle.expiry, SkipReason::NoTradingDays);
    }

    let overlap = Duration::hours(config.overlap_window_hours);
    let expiry_close = cycle.expiry_close();

    let mut engines: HashMap<u32, PairEngine> = HashMap::new();
    let mut snapshots = Vec::new();
    let mut saw_underlying = false;
    let mut saw_premiums = false;

    for &day in &cycle.trading_days {
        let Some(open) = data.day_open(day) else {
            continue;
        };
        saw_underlying = true;
        let strike = nearest_strike(open, config.strike_step, config.strike_offset);

        let call_key = ContractKey {
            strike,
            option_type: OptionType::Call,
            expiry: cycle.expiry,
        };
        let put_key = ContractKey {
            option_type: OptionType::Put,
            ..call_key.clone()
        };
        let (Some(call_base), Some(put_base)) = (
            data.premium_series(&call_key),
            data.premium_series(&put_key),
        ) else {
            continue;
        };
        saw_premiums = true;

        let call = SideSeries::build(call_base, config);
        let put = SideSeries::build(put_base, config);

        let engine = engines.entry(strike).or_insert_with(|| {
            PairEngine::new(
                contract_spec(config, strike, OptionType::Call, cycle.expiry),
                contract_spec(config, strike, OptionType::Put, cycle.expiry),
                overlap,
            )
        });

        for (i, call_bar) in call
            .short
            .iter()
            .enumerate()
            .filter(|(_, c)| c.timestamp.date() == day)
        {
            // The pair advances only on bars both legs have.
            let Some((j, put_bar)) = put
                .short
                .iter()
                .enumerate()
                .find(|(_, c)| c.timestamp == call_bar.timestamp)
            else {
                continue;
            };

            let close_ts =
                call_bar.timestamp + Duration::minutes(config.short_timeframe_minutes as i64);
            let call_channel = detect_channel(&call.short[..=i], &config.channel);
            let put_channel = detect_channel(&put.short[..=j], &config.channel);

            let (event, snapshot) = engine.on_bar(
                SideInputs {
                    candle: call_bar,
                    channel: call_channel.as_ref(),
                    momentum: call.momentum_at(close_ts),
                },
                SideInputs {
                    candle: put_bar,
                    channel: put_channel.as_ref(),
                    momentum: put.momentum_at(close_ts),
                },
            );
            snapshots.push(snapshot);

            let Some(event) = event else {
                continue;
            };
            let side = event.spec.option_type;
            let Some(plan) = plan_trade(&event, &config.trade) else {
                // Premium economics rejected the signal; the cycle stays
                // trade-free but is not skipped.
                continue;
            };
            engine.record_plan(side, plan.entry_price, plan.target_price, plan.stop_price);

            let remaining: Vec<Candle> = match side {
                OptionType::Call => &call.short,
                OptionType::Put => &put.short,
            }
            .iter()
            .filter(|c| c.timestamp >= plan.entry_time && c.timestamp < expiry_close)
            .cloned()
            .collect();
            let trade = simulate(&plan, &remaining, expiry_close);
            engine.record_outcome(side, trade.exit_reason);

            return CycleOutcome {
                expiry: cycle.expiry,
                trade: Some(trade),
                skipped: None,
                snapshots,
            };
        }
    }

    let skipped = if !saw_underlying {
        Some(SkipReason::NoUnderlyingData)
    } else if !saw_premiums {
        Some(SkipReason::NoPremiumData)
    } else {
        None
    };
    CycleOutcome {
        expiry: cycle.expiry,
        trade: None,
        skipped,
        snapshots,
    }
}

fn contract_spec(
    config: &BacktestConfig,
    strike: u32,
    option_type: OptionType,
    expiry: NaiveDate,
) -> ContractSpec {
    ContractSpec {
        underlying: config.underlying.clone(),
        strike,
        option_type,
        expiry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::build_cycles;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    #[test]
    fn empty_trading_days_skip() {
        let config = BacktestConfig::default();
        let data = MarketData::default();
        let cycle = ExpiryCycle {
            expiry: d(30),
            trading_days: vec![],
        };
        let out = evaluate_cycle(&config, &data, &cycle);
        assert_eq!(out.skipped, Some(SkipReason::NoTradingDays));
        assert!(out.trade.is_none());
    }

    #[test]
    fn missing_underlying_skips_without_error() {
        let config = BacktestConfig::default();
        let data = MarketData::default();
        let cycles = build_cycles(d(27), d(30));
        let out = evaluate_cycle(&config, &data, &cycles[0]);
        assert_eq!(out.skipped, Some(SkipReason::NoUnderlyingData));
    }

    #[test]
    fn missing_premiums_skip_without_error() {
        let config = BacktestConfig::default();
        let mut data = MarketData::default();
        data.underlying.push(Candle {
            timestamp: d(27).and_hms_opt(9, 15, 0).unwrap(),
            open: 23_460.0,
            high: 23_470.0,
            low: 23_450.0,
            close: 23_465.0,
            volume: 100,
            timeframe: Timeframe::MIN_20,
        });
        let cycles = build_cycles(d(27), d(30));
        let out = evaluate_cycle(&config, &data, &cycles[0]);
        assert_eq!(out.skipped, Some(SkipReason::NoPremiumData));
    }
}
