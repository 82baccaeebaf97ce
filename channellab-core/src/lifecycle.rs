//! Trade lifecycle: turn a confirmed breakout into a sized position with a
//! Fibonacci target and a channel re-entry stop, then replay candles until
//! target, stop, or expiry closes it.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::channel::TrendLine;
use crate::domain::{Candle, ContractSpec, ExitReason, Trade};
use crate::signal::{BreakoutDirection, BreakoutEvent};

/// Sizing and target-selection knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeParams {
    /// Near Fibonacci fraction of channel height beyond the breakout price.
    pub near_fraction: f64,
    /// Far Fibonacci fraction, used when the near target pays too little.
    pub far_fraction: f64,
    /// Near target is selected iff its projected profit % meets this.
    pub profit_threshold_pct: f64,
    /// Contract multiplier; quantity is always a whole number of lots.
    pub lot_size: u32,
    pub min_investment: f64,
    pub max_investment: f64,
}

impl Default for TradeParams {
    fn default() -> Self {
        Self {
            near_fraction: 0.236,
            far_fraction: 0.5,
            profit_threshold_pct: 50.0,
            lot_size: 50,
            min_investment: 2_000.0,
            max_investment: 5_000.0,
        }
    }
}

/// Rejected `TradeParams` values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TradeParamsError {
    #[error("{name} {value} outside [0, 1]")]
    FractionRange { name: &'static str, value: f64 },
    #[error("near_fraction must not exceed far_fraction")]
    InvertedFractions,
    #[error("profit_threshold_pct {0} is negative")]
    NegativeThreshold(f64),
    #[error("lot_size must be positive")]
    ZeroLotSize,
    #[error("investment bounds must be positive")]
    NonPositiveInvestment,
    #[error("min_investment {min} exceeds max_investment {max}")]
    InvertedInvestmentBand { min: f64, max: f64 },
}

impl TradeParams {
    pub fn validate(&self) -> Result<(), TradeParamsError> {
        if !(0.0..=1.0).contains(&self.near_fraction) {
            return Err(TradeParamsError::FractionRange {
                name: "near_fraction",
                value: self.near_fraction,
            });
        }
        if !(0.0..=1.0).contains(&self.far_fraction) {
            return Err(TradeParamsError::FractionRange {
                name: "far_fraction",
                value: self.far_fraction,
            });
        }
        if self.near_fraction > self.far_fraction {
            return Err(TradeParamsError::InvertedFractions);
        }
        if self.profit_threshold_pct < 0.0 {
            return Err(TradeParamsError::NegativeThreshold(
                self.profit_threshold_pct,
            ));
        }
        if self.lot_size == 0 {
            return Err(TradeParamsError::ZeroLotSize);
        }
        if self.min_investment <= 0.0 || self.max_investment <= 0.0 {
            return Err(TradeParamsError::NonPositiveInvestment);
        }
        if self.min_investment > self.max_investment {
            return Err(TradeParamsError::InvertedInvestmentBand {
                min: self.min_investment,
                max: self.max_investment,
            });
        }
        Ok(())
    }
}

/// A sized, not-yet-resolved position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradePlan {
    pub spec: ContractSpec,
    pub direction: BreakoutDirection,
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,
    pub quantity: u32,
    pub investment: f64,
    pub target_price: f64,
    /// Breached boundary at entry time; display only, the live stop follows
    /// the extrapolated line.
    pub stop_price: f64,
    /// The breached boundary. A later candle closing back across this line
    /// is the re-entry stop.
    pub stop_line: TrendLine,
    pub entry_reason: String,
}

impl TradePlan {
    fn sign(&self) -> f64 {
        match self.direction {
            BreakoutDirection::Up => 1.0,
            BreakoutDirection::Down => -1.0,
        }
    }

    fn pnl_at(&self, exit_price: f64) -> f64 {
        self.sign() * (exit_price - self.entry_price) * f64::from(self.quantity)
    }
}

/// Size a breakout into a plan, or skip it when the premium does not fit
/// the investment band.
pub fn plan_trade(event: &BreakoutEvent, params: &TradeParams) -> Option<TradePlan> {
    let entry = event.price;
    if !entry.is_finite() || entry <= 0.0 {
        return None;
    }
    let height = event.channel.height_at(event.time).abs();
    if !height.is_finite() || height <= 0.0 {
        return None;
    }

    let per_lot = entry * f64::from(params.lot_size);
    if per_lot > params.max_investment {
        return None;
    }
    let lots = (params.max_investment / per_lot).floor() as u32;
    let investment = f64::from(lots) * per_lot;
    if investment < params.min_investment {
        return None;
    }
    let quantity = lots * params.lot_size;

    let sign = match event.direction {
        BreakoutDirection::Up => 1.0,
        BreakoutDirection::Down => -1.0,
    };
    let near = entry + sign * params.near_fraction * height;
    let far = entry + sign * params.far_fraction * height;
    let near_pct = (near - entry).abs() / entry * 100.0;
    let target_price = if near_pct >= params.profit_threshold_pct {
        near
    } else {
        far
    };

    let stop_line = match event.direction {
        BreakoutDirection::Up => event.channel.upper.clone(),
        BreakoutDirection::Down => event.channel.lower.clone(),
    };
    let stop_price = stop_line.price_at(event.time);

    Some(TradePlan {
        spec: event.spec.clone(),
        direction: event.direction,
        entry_time: event.time,
        entry_price: entry,
        quantity,
        investment,
        target_price,
        stop_price,
        stop_line,
        entry_reason: format!(
            "{:?} breakout, {} upper / {} lower touches",
            event.channel.bias, event.channel.touches_upper, event.channel.touches_lower
        ),
    })
}

/// Replay candles after entry until the plan resolves.
///
/// The first candle whose range reaches the target closes the trade at the
/// target price; a candle *closing* back across the extrapolated stop line
/// closes it at that close. Within one bar the target is checked before the
/// stop. With neither hit the trade expires at the last available close (or
/// the entry price when no candle follows entry).
pub fn simulate(plan: &TradePlan, candles: &[Candle], expiry_close: NaiveDateTime) -> Trade {
    let mut last_close = plan.entry_price;
    let mut last_time = expiry_close;

    for candle in candles.iter().filter(|c| c.timestamp >= plan.entry_time) {
        let close_time = candle.timestamp + Duration::minutes(candle.timeframe.minutes() as i64);

        let target_reached = match plan.direction {
            BreakoutDirection::Up => candle.high >= plan.target_price,
            BreakoutDirection::Down => candle.low <= plan.target_price,
        };
        if target_reached {
            return close_trade(plan, close_time, plan.target_price, ExitReason::TargetHit);
        }

        let stop_level = plan.stop_line.price_at(close_time);
        let stopped = match plan.direction {
            BreakoutDirection::Up => candle.close < stop_level,
            BreakoutDirection::Down => candle.close > stop_level,
        };
        if stopped {
            return close_trade(plan, close_time, candle.close, ExitReason::StopHit);
        }

        last_close = candle.close;
        last_time = close_time.min(expiry_close);
    }

    close_trade(plan, last_time, last_close, ExitReason::Expired)
}

fn close_trade(
    plan: &TradePlan,
    exit_time: NaiveDateTime,
    exit_price: f64,
    exit_reason: ExitReason,
) -> Trade {
    let pnl = plan.pnl_at(exit_price);
    Trade {
        strike: plan.spec.strike,
        option_type: plan.spec.option_type,
        expiry: plan.spec.expiry,
        entry_time: plan.entry_time,
        entry_price: plan.entry_price,
        exit_time,
        exit_price,
        quantity: plan.quantity,
        investment: plan.investment,
        target_price: plan.target_price,
        stop_price: plan.stop_price,
        pnl,
        return_pct: if plan.investment > 0.0 {
            pnl / plan.investment * 100.0
        } else {
            0.0
        },
        entry_reason: plan.entry_reason.clone(),
        exit_reason,
    }
}
