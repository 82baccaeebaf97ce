//! Parallel channel detection on the short timeframe.
//!
//! A channel is a pair of roughly parallel trend boundaries bounding recent
//! price action: the upper boundary fit through local pivot highs, the lower
//! through pivot lows. Boundary fit is least-squares over all pivot touches
//! (not first-and-last), with x measured in hours since the window start so
//! a line can be extrapolated to any later timestamp.
//!
//! A candidate is rejected — yielding "no channel", never an error — when
//! either boundary has fewer than the minimum touches, the touches span less
//! than the minimum calendar duration, the slopes diverge beyond the
//! parallel tolerance, or the fit is degenerate (zero x-span, non-finite
//! slope). When several trailing windows produce valid channels, the winner
//! has the most touches, then the longest span, then the most recent
//! formation.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::domain::Candle;

/// Slope/intercept boundary line, anchored so it can be extrapolated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrendLine {
    /// Price change per hour.
    pub slope: f64,
    /// Price at the anchor timestamp.
    pub intercept: f64,
    /// Timestamp where x = 0.
    pub anchor: NaiveDateTime,
}

impl TrendLine {
    /// Boundary price extrapolated to `ts` (slope * hours + intercept).
    pub fn price_at(&self, ts: NaiveDateTime) -> f64 {
        self.slope * hours_between(self.anchor, ts) + self.intercept
    }
}

/// Direction of the channel, derived from the average boundary slope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelBias {
    Rising,
    Falling,
    /// Near-zero average slope. Flat channels never arm the state machine.
    Flat,
}

/// A validated parallel channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub upper: TrendLine,
    pub lower: TrendLine,
    /// Earliest boundary touch.
    pub start: NaiveDateTime,
    /// Latest boundary touch.
    pub end: NaiveDateTime,
    pub touches_upper: usize,
    pub touches_lower: usize,
    pub bias: ChannelBias,
}

impl Channel {
    pub fn upper_at(&self, ts: NaiveDateTime) -> f64 {
        self.upper.price_at(ts)
    }

    pub fn lower_at(&self, ts: NaiveDateTime) -> f64 {
        self.lower.price_at(ts)
    }

    /// Vertical distance between the boundaries at `ts`.
    pub fn height_at(&self, ts: NaiveDateTime) -> f64 {
        (self.upper_at(ts) - self.lower_at(ts)).abs()
    }

    pub fn touches_total(&self) -> usize {
        self.touches_upper + self.touches_lower
    }

    /// Formation span in whole calendar days.
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// True when `price` sits between the boundaries at `ts`.
    pub fn contains(&self, ts: NaiveDateTime, price: f64) -> bool {
        price <= self.upper_at(ts) && price >= self.lower_at(ts)
    }
}

/// Channel detection parameters. Defaults follow the production strategy:
/// 5-candle pivot look-around, 2 touches per boundary, 7 calendar days,
/// 1% touch tolerance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelParams {
    /// A candle is a pivot high when its high is the maximum within this
    /// many candles on each side (symmetric for pivot lows).
    pub pivot_lookaround: usize,
    /// Minimum touches per boundary.
    pub min_touches: usize,
    /// Minimum calendar days between a boundary's first and last touch.
    pub min_span_days: i64,
    /// Relative distance from a boundary within which a high/low counts as
    /// a touch.
    pub touch_tolerance: f64,
    /// Maximum allowed |upper slope - lower slope| (price per hour).
    pub parallel_tolerance: f64,
    /// Average slopes within this magnitude make the channel Flat.
    pub flat_slope_epsilon: f64,
}

impl Default for ChannelParams {
    fn default() -> Self {
        Self {
            pivot_lookaround: 5,
            min_touches: 2,
            min_span_days: 7,
            touch_tolerance: 0.01,
            parallel_tolerance: 1.0,
            flat_slope_epsilon: 0.05,
        }
    }
}

/// Rejected `ChannelParams` values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChannelParamsError {
    #[error("pivot_lookaround must be >= 1")]
    ZeroLookaround,
    #[error("min_touches must be >= 2")]
    TooFewTouches,
    #[error("min_span_days must be >= 1")]
    ShortSpan,
    #[error("touch_tolerance {0} outside (0, 1)")]
    TouchTolerance(f64),
    #[error("parallel_tolerance must be positive")]
    ParallelTolerance,
    #[error("flat_slope_epsilon must be non-negative")]
    FlatEpsilon,
}

impl ChannelParams {
    /// Reject nonsense parameter values. This is the only fatal error class
    /// in channel detection; everything downstream degrades to "no channel".
    pub fn validate(&self) -> Result<(), ChannelParamsError> {
        if self.pivot_lookaround == 0 {
            return Err(ChannelParamsError::ZeroLookaround);
        }
        if self.min_touches < 2 {
            return Err(ChannelParamsError::TooFewTouches);
        }
        if self.min_span_days < 1 {
            return Err(ChannelParamsError::ShortSpan);
        }
        if !(self.touch_tolerance > 0.0 && self.touch_tolerance < 1.0) {
            return Err(ChannelParamsError::TouchTolerance(self.touch_tolerance));
        }
        if self.parallel_tolerance <= 0.0 {
            return Err(ChannelParamsError::ParallelTolerance);
        }
        if self.flat_slope_epsilon < 0.0 {
            return Err(ChannelParamsError::FlatEpsilon);
        }
        Ok(())
    }
}

/// Detect the best valid channel in a lookback window of short-timeframe
/// candles, or `None` when no hypothesis survives validation.
pub fn detect_channel(candles: &[Candle], params: &ChannelParams) -> Option<Channel> {
    let step = params.pivot_lookaround.max(1);
    let mut best: Option<Channel> = None;

    // Trailing sub-windows form the hypothesis set: the full window plus
    // progressively more recent suffixes.
    let mut start = 0;
    while start + 2 * params.pivot_lookaround + 1 <= candles.len() {
        if let Some(candidate) = fit_window(&candles[start..], params) {
            best = match best {
                Some(current) if !prefer(&candidate, &current) => Some(current),
                _ => Some(candidate),
            };
        }
        start += step;
    }
    best
}

/// Tie-break order between valid hypotheses: most touches, then longest
/// span, then most recently formed.
fn prefer(a: &Channel, b: &Channel) -> bool {
    (a.touches_total(), a.end - a.start, a.end) > (b.touches_total(), b.end - b.start, b.end)
}

fn fit_window(window: &[Candle], params: &ChannelParams) -> Option<Channel> {
    let (pivot_highs, pivot_lows) = find_pivots(window, params.pivot_lookaround);
    if pivot_highs.len() < params.min_touches || pivot_lows.len() < params.min_touches {
        return None;
    }

    let anchor = window[0].timestamp;
    let upper = fit_line(anchor, &pivot_highs)?;
    let lower = fit_line(anchor, &pivot_lows)?;

    if (upper.slope - lower.slope).abs() > params.parallel_tolerance {
        return None;
    }

    let upper_touches = count_touches(window, &upper, params.touch_tolerance, |c| c.high);
    let lower_touches = count_touches(window, &lower, params.touch_tolerance, |c| c.low);
    if upper_touches.len() < params.min_touches || lower_touches.len() < params.min_touches {
        return None;
    }

    let upper_span = span(&upper_touches);
    let lower_span = span(&lower_touches);
    if upper_span.num_days() < params.min_span_days || lower_span.num_days() < params.min_span_days
    {
        return None;
    }

    let avg_slope = (upper.slope + lower.slope) / 2.0;
    let bias = if avg_slope > params.flat_slope_epsilon {
        ChannelBias::Rising
    } else if avg_slope < -params.flat_slope_epsilon {
        ChannelBias::Falling
    } else {
        ChannelBias::Flat
    };

    let (start, end) = match (
        upper_touches.first(),
        lower_touches.first(),
        upper_touches.last(),
        lower_touches.last(),
    ) {
        (Some(uf), Some(lf), Some(ul), Some(ll)) => (*uf.min(lf), *ul.max(ll)),
        _ => return None,
    };

    Some(Channel {
        upper,
        lower,
        start,
        end,
        touches_upper: upper_touches.len(),
        touches_lower: lower_touches.len(),
        bias,
    })
}

/// Local pivot highs and lows: (timestamp, price) pairs where the candle's
/// high (low) is the extreme within `lookaround` candles on each side.
fn find_pivots(
    window: &[Candle],
    lookaround: usize,
) -> (Vec<(NaiveDateTime, f64)>, Vec<(NaiveDateTime, f64)>) {
    let mut highs = Vec::new();
    let mut lows = Vec::new();
    if window.len() < 2 * lookaround + 1 {
        return (highs, lows);
    }
    for i in lookaround..window.len() - lookaround {
        let neighbors = &window[i - lookaround..=i + lookaround];
        let c = &window[i];
        if neighbors.iter().all(|n| c.high >= n.high) {
            highs.push((c.timestamp, c.high));
        }
        if neighbors.iter().all(|n| c.low <= n.low) {
            lows.push((c.timestamp, c.low));
        }
    }
    (highs, lows)
}

/// Least-squares line through the points, x in hours since `anchor`.
/// Degenerate inputs (all points at one x, non-finite result) yield `None`.
fn fit_line(anchor: NaiveDateTime, points: &[(NaiveDateTime, f64)]) -> Option<TrendLine> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let xs: Vec<f64> = points
        .iter()
        .map(|(ts, _)| hours_between(anchor, *ts))
        .collect();
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (x, (_, y)) in xs.iter().zip(points) {
        sxx += (x - mean_x) * (x - mean_x);
        sxy += (x - mean_x) * (y - mean_y);
    }
    if sxx <= f64::EPSILON {
        return None;
    }
    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    if !slope.is_finite() || !intercept.is_finite() {
        return None;
    }
    Some(TrendLine {
        slope,
        intercept,
        anchor,
    })
}

/// Timestamps of candles whose `price_of` value lies within the relative
/// tolerance of the line.
fn count_touches(
    window: &[Candle],
    line: &TrendLine,
    tolerance: f64,
    price_of: impl Fn(&Candle) -> f64,
) -> Vec<NaiveDateTime> {
    window
        .iter()
        .filter(|c| {
            let expected = line.price_at(c.timestamp);
            expected > 0.0 && ((price_of(c) - expected) / expected).abs() <= tolerance
        })
        .map(|c| c.timestamp)
        .collect()
}

fn span(touches: &[NaiveDateTime]) -> Duration {
    match (touches.first(), touches.last()) {
        (Some(first), Some(last)) => *last - *first,
        _ => Duration::zero(),
    }
}

fn hours_between(anchor: NaiveDateTime, ts: NaiveDateTime) -> f64 {
    (ts - anchor).num_seconds() as f64 / 3600.0
}
