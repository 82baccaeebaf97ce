//! Candle — the fundamental market data unit.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Width of a candle in minutes.
///
/// The strategy works on three frames: the base resolution the feed
/// delivers, a short frame (20 min) for channel detection, and a long
/// frame (2 h) for momentum confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timeframe(pub u32);

impl Timeframe {
    /// Short frame used by the channel detector.
    pub const MIN_20: Timeframe = Timeframe(20);
    /// Long frame used by the momentum calculator.
    pub const HOUR_2: Timeframe = Timeframe(120);

    pub fn minutes(self) -> u32 {
        self.0
    }
}

/// Exchange session window, expressed as minutes since midnight.
/// All resampling buckets align to session open (09:15).
pub const SESSION_OPEN_MINUTES: u32 = 9 * 60 + 15;
pub const SESSION_CLOSE_MINUTES: u32 = 15 * 60 + 30;

/// Minutes since midnight for a timestamp, for session-relative arithmetic.
pub fn minutes_of_day(ts: NaiveDateTime) -> u32 {
    use chrono::Timelike;
    ts.hour() * 60 + ts.minute()
}

/// OHLCV candle for a single instrument at one timeframe.
///
/// `timestamp` is the bar's open time. Candles are immutable once produced
/// and ordered by timestamp within a series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub timeframe: Timeframe,
}

impl Candle {
    /// Basic OHLC sanity check: high >= low, high/low bracket open and close,
    /// prices positive.
    pub fn is_sane(&self) -> bool {
        if self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
    }
}
