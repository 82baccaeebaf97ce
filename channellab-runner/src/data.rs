//! In-memory market data: the underlying series plus option premium series
//! keyed by contract. This is read-only input to the orchestrator; the core
//! crate never sees anything but candle slices.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use channellab_core::domain::{Candle, OptionType};

/// Identifies one premium series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractKey {
    pub strike: u32,
    pub option_type: OptionType,
    pub expiry: NaiveDate,
}

/// All candles for a run, at base (short-timeframe) resolution,
/// chronologically sorted per series.
#[derive(Debug, Clone, Default)]
pub struct MarketData {
    pub underlying: Vec<Candle>,
    pub premiums: HashMap<ContractKey, Vec<Candle>>,
}

impl MarketData {
    pub fn premium_series(&self, key: &ContractKey) -> Option<&[Candle]> {
        self.premiums.get(key).map(Vec::as_slice)
    }

    /// The underlying's first candle on `day`, used for strike selection.
    pub fn day_open(&self, day: NaiveDate) -> Option<f64> {
        self.underlying
            .iter()
            .find(|c| c.timestamp.date() == day)
            .map(|c| c.open)
    }
}

/// Round `price` to the nearest strike on a `step` ladder, then shift by
/// `offset` whole steps.
pub fn nearest_strike(price: f64, step: u32, offset: i32) -> u32 {
    let step_f = f64::from(step);
    let rounded = (price / step_f).round() * step_f;
    let shifted = rounded + f64::from(offset) * step_f;
    if shifted <= 0.0 {
        step
    } else {
        shifted as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use channellab_core::domain::Timeframe;
    use chrono::NaiveDateTime;

    fn candle(t: NaiveDateTime, open: f64) -> Candle {
        Candle {
            timestamp: t,
            open,
            high: open + 1.0,
            low: open - 1.0,
            close: open,
            volume: 100,
            timeframe: Timeframe::MIN_20,
        }
    }

    #[test]
    fn rounds_to_nearest_step() {
        assert_eq!(nearest_strike(23_449.0, 100, 0), 23_400);
        assert_eq!(nearest_strike(23_450.0, 100, 0), 23_500);
        assert_eq!(nearest_strike(23_551.0, 100, 0), 23_600);
    }

    #[test]
    fn applies_step_offset() {
        assert_eq!(nearest_strike(23_500.0, 100, 1), 23_600);
        assert_eq!(nearest_strike(23_500.0, 100, -2), 23_300);
    }

    #[test]
    fn never_returns_a_zero_strike() {
        assert_eq!(nearest_strike(40.0, 100, -3), 100);
    }

    #[test]
    fn day_open_uses_first_candle_of_the_day() {
        let d = NaiveDate::from_ymd_opt(2024, 5, 27).unwrap();
        let data = MarketData {
            underlying: vec![
                candle(d.and_hms_opt(9, 15, 0).unwrap(), 23_460.0),
                candle(d.and_hms_opt(9, 35, 0).unwrap(), 23_480.0),
            ],
            premiums: HashMap::new(),
        };
        assert_eq!(data.day_open(d), Some(23_460.0));
        assert_eq!(data.day_open(d + chrono::Duration::days(1)), None);
    }
}
