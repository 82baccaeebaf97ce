//! KST-style momentum oscillator on the long timeframe.
//!
//! Four rate-of-change series over distinct lookbacks, each smoothed by its
//! own moving average, combined as a weighted sum:
//! KST = w1*SMA(ROC1) + w2*SMA(ROC2) + w3*SMA(ROC3) + w4*SMA(ROC4).
//! The signal line is a further moving average of the oscillator. Warmup
//! positions carry NaN; a crossover is strictly at-bar (the relation to the
//! signal line flips between the previous bar and this one).

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::Candle;

/// Oscillator parameters. Defaults are the canonical KST periods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KstParams {
    pub roc_periods: [usize; 4],
    pub sma_widths: [usize; 4],
    pub weights: [f64; 4],
    pub signal_width: usize,
}

impl Default for KstParams {
    fn default() -> Self {
        Self {
            roc_periods: [10, 15, 20, 30],
            sma_widths: [10, 10, 10, 15],
            weights: [1.0, 2.0, 3.0, 4.0],
            signal_width: 9,
        }
    }
}

/// Rejected `KstParams` values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KstParamsError {
    #[error("ROC periods must be >= 1")]
    ZeroRocPeriod,
    #[error("SMA widths must be >= 1")]
    ZeroSmaWidth,
    #[error("signal width must be >= 1")]
    ZeroSignalWidth,
    #[error("weights must be finite")]
    NonFiniteWeight,
}

impl KstParams {
    pub fn validate(&self) -> Result<(), KstParamsError> {
        if self.roc_periods.iter().any(|&p| p == 0) {
            return Err(KstParamsError::ZeroRocPeriod);
        }
        if self.sma_widths.iter().any(|&w| w == 0) {
            return Err(KstParamsError::ZeroSmaWidth);
        }
        if self.signal_width == 0 {
            return Err(KstParamsError::ZeroSignalWidth);
        }
        if self.weights.iter().any(|&w| !w.is_finite()) {
            return Err(KstParamsError::NonFiniteWeight);
        }
        Ok(())
    }

    /// Bars needed before the oscillator and its signal line are both valid.
    pub fn lookback(&self) -> usize {
        let osc = self
            .roc_periods
            .iter()
            .zip(&self.sma_widths)
            .map(|(r, s)| r + s - 1)
            .max()
            .unwrap_or(0);
        osc + self.signal_width - 1
    }
}

/// Oscillator-vs-signal-line relation change at one bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Crossover {
    None,
    Bullish,
    Bearish,
}

/// Per-long-timeframe-bar momentum state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumSignal {
    pub timestamp: NaiveDateTime,
    pub kst: f64,
    pub signal: f64,
    pub crossover: Crossover,
}

impl MomentumSignal {
    /// |oscillator - signal line|, used as the dual-confirmation tie-break.
    pub fn magnitude(&self) -> f64 {
        (self.kst - self.signal).abs()
    }
}

/// Compute the oscillator, signal line, and crossover for every bar.
pub fn compute_kst(candles: &[Candle], params: &KstParams) -> Vec<MomentumSignal> {
    let n = candles.len();
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

    let mut kst = vec![0.0; n];
    let mut any = vec![false; n];
    for k in 0..4 {
        let smoothed = sma(&roc(&closes, params.roc_periods[k]), params.sma_widths[k]);
        for i in 0..n {
            if smoothed[i].is_nan() {
                kst[i] = f64::NAN;
            } else if !kst[i].is_nan() {
                kst[i] += params.weights[k] * smoothed[i];
                any[i] = true;
            }
        }
    }
    // A bar where no component was valid stays NaN rather than 0.
    for i in 0..n {
        if !any[i] {
            kst[i] = f64::NAN;
        }
    }

    let signal = sma(&kst, params.signal_width);

    (0..n)
        .map(|i| {
            let crossover = if i == 0 {
                Crossover::None
            } else {
                crossover_at(kst[i - 1], signal[i - 1], kst[i], signal[i])
            };
            MomentumSignal {
                timestamp: candles[i].timestamp,
                kst: kst[i],
                signal: signal[i],
                crossover,
            }
        })
        .collect()
}

fn crossover_at(prev_kst: f64, prev_sig: f64, kst: f64, sig: f64) -> Crossover {
    if prev_kst.is_nan() || prev_sig.is_nan() || kst.is_nan() || sig.is_nan() {
        return Crossover::None;
    }
    if kst > sig && prev_kst <= prev_sig {
        Crossover::Bullish
    } else if kst < sig && prev_kst >= prev_sig {
        Crossover::Bearish
    } else {
        Crossover::None
    }
}

/// Percentage change over `period` bars, NaN for the warmup prefix.
fn roc(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    for i in period..n {
        let prev = values[i - period];
        if prev != 0.0 && prev.is_finite() && values[i].is_finite() {
            out[i] = (values[i] - prev) / prev * 100.0;
        }
    }
    out
}

/// Simple moving average; a window containing any NaN yields NaN.
fn sma(values: &[f64], width: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if width == 0 || width > n {
        return out;
    }
    for i in (width - 1)..n {
        let window = &values[i + 1 - width..=i];
        if window.iter().all(|v| v.is_finite()) {
            out[i] = window.iter().sum::<f64>() / width as f64;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Timeframe;
    use chrono::{Duration, NaiveDate};

    fn make_candles(closes: &[f64]) -> Vec<Candle> {
        let base = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(9, 15, 0)
            .unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: base + Duration::hours(2 * i as i64),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1000,
                timeframe: Timeframe::HOUR_2,
            })
            .collect()
    }

    /// Minimal params: each component is the 1-bar ROC itself.
    fn fast_params() -> KstParams {
        KstParams {
            roc_periods: [1, 1, 1, 1],
            sma_widths: [1, 1, 1, 1],
            weights: [1.0, 0.0, 0.0, 0.0],
            signal_width: 2,
        }
    }

    #[test]
    fn oscillator_weighted_sum() {
        // 10% moves; weights 1+2+3+4 = 10 on identical components.
        let params = KstParams {
            roc_periods: [1, 1, 1, 1],
            sma_widths: [1, 1, 1, 1],
            weights: [1.0, 2.0, 3.0, 4.0],
            signal_width: 1,
        };
        let signals = compute_kst(&make_candles(&[100.0, 110.0, 121.0]), &params);
        assert!(signals[0].kst.is_nan());
        assert!((signals[1].kst - 100.0).abs() < 1e-9);
        assert!((signals[2].kst - 100.0).abs() < 1e-9);
    }

    #[test]
    fn warmup_is_nan() {
        let params = KstParams::default();
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let signals = compute_kst(&make_candles(&closes), &params);
        let lb = params.lookback();
        assert!(signals[lb - 1].signal.is_nan());
        assert!(signals[lb].signal.is_finite());
        assert!(signals[lb].kst.is_finite());
    }

    #[test]
    fn detects_bullish_and_bearish_crossover() {
        // kst (1-bar ROC): [NaN, 10, 0, 0, 10, 0]
        // signal (sma 2):  [NaN, NaN, 5, 0, 5, 5]
        let signals = compute_kst(
            &make_candles(&[100.0, 110.0, 110.0, 110.0, 121.0, 121.0]),
            &fast_params(),
        );
        assert_eq!(signals[3].crossover, Crossover::None);
        assert_eq!(signals[4].crossover, Crossover::Bullish);
        assert_eq!(signals[5].crossover, Crossover::Bearish);
    }

    #[test]
    fn nan_neighbors_suppress_crossover() {
        let signals = compute_kst(&make_candles(&[100.0, 110.0, 105.0]), &fast_params());
        // Bar 2 is the first with a finite signal line; bar 1's is NaN.
        assert_eq!(signals[2].crossover, Crossover::None);
    }

    #[test]
    fn magnitude_is_gap_to_signal_line() {
        let sig = MomentumSignal {
            timestamp: NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(11, 15, 0)
                .unwrap(),
            kst: 12.0,
            signal: 7.5,
            crossover: Crossover::Bullish,
        };
        assert!((sig.magnitude() - 4.5).abs() < 1e-12);
    }

    #[test]
    fn default_lookback() {
        // max(roc + sma - 1) = 30 + 15 - 1 = 44; plus signal 9 - 1 = 52.
        assert_eq!(KstParams::default().lookback(), 52);
    }

    #[test]
    fn params_validation() {
        assert!(KstParams::default().validate().is_ok());
        let mut p = KstParams::default();
        p.roc_periods[2] = 0;
        assert!(p.validate().is_err());
        let mut p = KstParams::default();
        p.signal_width = 0;
        assert!(p.validate().is_err());
    }
}
