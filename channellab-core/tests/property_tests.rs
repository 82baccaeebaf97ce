//! Property tests for core invariants.
//!
//! Uses proptest to verify:
//! 1. Detected channels always satisfy the touch and span invariants
//! 2. The stage machine never reaches breakout without the full prefix
//! 3. Target selection picks the near level iff it clears the threshold
//! 4. Resampling is deterministic and conserves the OHLCV envelope

use chrono::{NaiveDate, NaiveDateTime};
use proptest::prelude::*;

use channellab_core::channel::{detect_channel, ChannelParams};
use channellab_core::domain::{Candle, ContractSpec, OptionType, Timeframe};
use channellab_core::lifecycle::{plan_trade, TradeParams};
use channellab_core::resample::resample;
use channellab_core::signal::{BreakoutDirection, BreakoutEvent, Stage};

fn ts(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

fn candle_at(t: NaiveDateTime, open: f64, high: f64, low: f64, close: f64) -> Candle {
    Candle {
        timestamp: t,
        open,
        high,
        low,
        close,
        volume: 100,
        timeframe: Timeframe::MIN_20,
    }
}

// ── 1. Channel invariants ────────────────────────────────────────────

/// Random walk over 2h bars, three per trading day.
fn arb_series() -> impl Strategy<Value = Vec<Candle>> {
    (prop::collection::vec(-3.0..3.0_f64, 12..45), 50.0..150.0_f64).prop_map(|(steps, base)| {
        let mut level = base;
        steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                level = (level + step).max(5.0);
                let day = 1 + (i / 3) as u32;
                let t = ts(day, 9 + 2 * (i % 3) as u32, 15);
                candle_at(t, level, level + 1.5, level - 1.5, level + step * 0.3)
            })
            .collect()
    })
}

proptest! {
    /// Whatever the input, a detected channel honors minimum touches per
    /// boundary, minimum calendar span, and ordered formation timestamps.
    #[test]
    fn detected_channels_satisfy_invariants(candles in arb_series()) {
        let params = ChannelParams::default();
        if let Some(channel) = detect_channel(&candles, &params) {
            prop_assert!(channel.touches_upper >= params.min_touches);
            prop_assert!(channel.touches_lower >= params.min_touches);
            prop_assert!(channel.span_days() >= params.min_span_days);
            prop_assert!(channel.start < channel.end);
            // Approximately parallel boundaries.
            prop_assert!(
                (channel.upper.slope - channel.lower.slope).abs()
                    <= params.parallel_tolerance + 1e-9
            );
        }
    }

    /// Detection is a pure function of its input.
    #[test]
    fn detection_is_deterministic(candles in arb_series()) {
        let params = ChannelParams::default();
        let a = detect_channel(&candles, &params);
        let b = detect_channel(&candles, &params);
        prop_assert_eq!(format!("{a:?}"), format!("{b:?}"));
    }
}

// ── 2. Stage ordering ────────────────────────────────────────────────

fn arb_stage() -> impl Strategy<Value = Stage> {
    prop::sample::select(vec![
        Stage::Idle,
        Stage::PatternDetected,
        Stage::MomentumConfirmed,
        Stage::BreakoutConfirmed,
        Stage::TargetHit,
        Stage::StopHit,
        Stage::Expired,
        Stage::Cancelled,
    ])
}

proptest! {
    /// Replay a random sequence of attempted transitions, applying only the
    /// legal ones. Breakout can only ever be entered from MomentumConfirmed,
    /// which itself is only reachable from PatternDetected.
    #[test]
    fn breakout_requires_the_full_prefix(attempts in prop::collection::vec(arb_stage(), 1..40)) {
        let mut stage = Stage::Idle;
        let mut seen_pattern = false;
        let mut seen_momentum = false;
        for next in attempts {
            if Stage::can_transition(stage, next) {
                stage = next;
                match stage {
                    Stage::PatternDetected => seen_pattern = true,
                    Stage::MomentumConfirmed => {
                        prop_assert!(seen_pattern);
                        seen_momentum = true;
                    }
                    Stage::BreakoutConfirmed => {
                        prop_assert!(seen_pattern && seen_momentum);
                    }
                    _ => {}
                }
            }
        }
    }

    /// Terminal stages accept no further transitions.
    #[test]
    fn terminals_are_absorbing(next in arb_stage()) {
        for terminal in [Stage::TargetHit, Stage::StopHit, Stage::Expired, Stage::Cancelled] {
            prop_assert!(!Stage::can_transition(terminal, next));
        }
    }
}

// ── 3. Target selection boundary ─────────────────────────────────────

fn breakout_event(entry: f64, height: f64) -> BreakoutEvent {
    use channellab_core::channel::{Channel, ChannelBias, TrendLine};
    let anchor = ts(20, 9, 15);
    BreakoutEvent {
        spec: ContractSpec {
            underlying: "NIFTY".into(),
            strike: 23_500,
            option_type: OptionType::Call,
            expiry: NaiveDate::from_ymd_opt(2024, 5, 30).unwrap(),
        },
        time: ts(27, 9, 35),
        price: entry,
        direction: BreakoutDirection::Up,
        channel: Channel {
            upper: TrendLine { slope: 0.0, intercept: entry, anchor },
            lower: TrendLine { slope: 0.0, intercept: entry - height, anchor },
            start: ts(20, 9, 15),
            end: ts(27, 9, 15),
            touches_upper: 2,
            touches_lower: 2,
            bias: ChannelBias::Rising,
        },
        momentum_magnitude: 1.0,
    }
}

proptest! {
    /// The near target is chosen exactly when its projected profit percent
    /// meets the threshold; otherwise the far target is chosen.
    #[test]
    fn near_target_iff_threshold_met(
        entry in 10.0..90.0_f64,
        height in 10.0..200.0_f64,
        threshold in 1.0..80.0_f64,
    ) {
        let params = TradeParams {
            profit_threshold_pct: threshold,
            lot_size: 10,
            ..TradeParams::default()
        };
        if let Some(plan) = plan_trade(&breakout_event(entry, height), &params) {
            let near = entry + params.near_fraction * height;
            let far = entry + params.far_fraction * height;
            let near_pct = (near - entry) / entry * 100.0;
            if near_pct >= threshold {
                prop_assert!((plan.target_price - near).abs() < 1e-9);
            } else {
                prop_assert!((plan.target_price - far).abs() < 1e-9);
            }
            // Sizing stays inside the band.
            prop_assert!(plan.investment <= params.max_investment + 1e-9);
            prop_assert!(plan.investment >= params.min_investment - 1e-9);
            prop_assert_eq!(plan.quantity % params.lot_size, 0);
        }
    }
}

// ── 4. Resampling ────────────────────────────────────────────────────

/// A complete 09:15-15:15 session of 20-minute bars, so every bucket (the
/// trailing partial one included) is emitted by the resampler.
fn arb_session() -> impl Strategy<Value = Vec<Candle>> {
    prop::collection::vec((50.0..150.0_f64, 0.1..5.0_f64), 19).prop_map(|points| {
        points
            .iter()
            .enumerate()
            .map(|(i, (mid, spread))| {
                let minute = 9 * 60 + 15 + 20 * i as u32;
                let t = ts(27, minute / 60, minute % 60);
                candle_at(t, *mid, mid + spread, mid - spread, *mid)
            })
            .collect()
    })
}

proptest! {
    /// Resampling the same input twice yields identical bars, and the output
    /// conserves total volume and the high/low envelope.
    #[test]
    fn resample_is_deterministic_and_conservative(candles in arb_session()) {
        let first: Vec<Candle> = resample(&candles, Timeframe::HOUR_2).collect();
        let second: Vec<Candle> = resample(&candles, Timeframe::HOUR_2).collect();
        prop_assert_eq!(format!("{first:?}"), format!("{second:?}"));

        let in_volume: u64 = candles.iter().map(|c| c.volume).sum();
        let out_volume: u64 = first.iter().map(|c| c.volume).sum();
        prop_assert_eq!(in_volume, out_volume);

        let in_high = candles.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let out_high = first.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        prop_assert!((in_high - out_high).abs() < 1e-12);

        let in_low = candles.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        let out_low = first.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        prop_assert!((in_low - out_low).abs() < 1e-12);

        prop_assert!(first.len() <= candles.len());
    }
}
