//! Candle resampling — base-resolution series into coarser session-aligned bars.
//!
//! Resampling rule per output bar: open = first input open, high = max of
//! highs, low = min of lows, close = last input close, volume = sum.
//! Buckets align to session open (09:15), so a 20-minute frame produces
//! 09:15, 09:35, 09:55, ... regardless of where the input series starts.
//!
//! The iterator is lazy and restartable: calling [`resample`] again on the
//! same input yields the identical sequence. There is no clock dependence.

use chrono::{Duration, NaiveTime};

use crate::domain::{
    minutes_of_day, Candle, Timeframe, SESSION_CLOSE_MINUTES, SESSION_OPEN_MINUTES,
};

/// Resample a base-resolution series into `target`-width bars.
///
/// Input must be ordered by timestamp. A trailing partial bar is emitted
/// only when its nominal bucket extends past session close — such a bar can
/// never be completed by later data. A mid-session trailing partial is
/// deferred (not emitted), pending more data.
pub fn resample(candles: &[Candle], target: Timeframe) -> Resampler<'_> {
    assert!(target.minutes() >= 1, "timeframe width must be >= 1 minute");
    Resampler {
        candles,
        target,
        pos: 0,
    }
}

/// Lazy iterator over resampled bars. See [`resample`].
#[derive(Debug, Clone)]
pub struct Resampler<'a> {
    candles: &'a [Candle],
    target: Timeframe,
    pos: usize,
}

impl Resampler<'_> {
    /// Session bucket index of a candle: 0 for the bar opening at 09:15.
    fn bucket_index(&self, candle: &Candle) -> u32 {
        let offset = minutes_of_day(candle.timestamp).saturating_sub(SESSION_OPEN_MINUTES);
        offset / self.target.minutes()
    }
}

impl Iterator for Resampler<'_> {
    type Item = Candle;

    fn next(&mut self) -> Option<Candle> {
        let first = self.candles.get(self.pos)?;
        let date = first.timestamp.date();
        let bucket = self.bucket_index(first);

        let mut end = self.pos + 1;
        while let Some(c) = self.candles.get(end) {
            if c.timestamp.date() != date || self.bucket_index(c) != bucket {
                break;
            }
            end += 1;
        }

        // Trailing group at end of input: only emit if the bucket runs past
        // session close, because no later data can ever complete it.
        if end == self.candles.len() {
            let bucket_end = SESSION_OPEN_MINUTES + (bucket + 1) * self.target.minutes();
            if bucket_end <= SESSION_CLOSE_MINUTES {
                self.pos = end;
                return None;
            }
        }

        let group = &self.candles[self.pos..end];
        self.pos = end;

        // The bar is stamped at its bucket start, derived from the bucket
        // index rather than the first candle's clock: a pre-open candle
        // (before 09:15) folds into bucket 0 and stamps at session open.
        let bucket_start = SESSION_OPEN_MINUTES + bucket * self.target.minutes();
        let timestamp = date.and_time(NaiveTime::MIN) + Duration::minutes(i64::from(bucket_start));

        let mut high = f64::MIN;
        let mut low = f64::MAX;
        let mut volume = 0u64;
        for c in group {
            high = high.max(c.high);
            low = low.min(c.low);
            volume += c.volume;
        }

        Some(Candle {
            timestamp,
            open: first.open,
            high,
            low,
            close: group[group.len() - 1].close,
            volume,
            timeframe: self.target,
        })
    }
}
