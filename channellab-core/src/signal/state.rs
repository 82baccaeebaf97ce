//! Per-contract signal state, re-evaluated on every short-timeframe close.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::channel::{Channel, ChannelBias};
use crate::domain::{Candle, ContractSpec};
use crate::momentum::{Crossover, MomentumSignal};

use super::stage::Stage;

/// Which side of the channel the breakout candle closed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakoutDirection {
    Up,
    Down,
}

/// Emitted when a contract closes strictly outside its channel in the bias
/// direction after momentum confirmation. Hands control to the trade
/// lifecycle manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakoutEvent {
    pub spec: ContractSpec,
    pub time: NaiveDateTime,
    /// Close of the breakout candle; becomes the entry price.
    pub price: f64,
    pub direction: BreakoutDirection,
    pub channel: Channel,
    /// |kst - signal| at confirmation, for the dual-confirmation tie-break.
    pub momentum_magnitude: f64,
}

/// Per-bar inputs to one contract's state machine.
#[derive(Debug, Clone, Copy)]
pub struct SignalInputs<'a> {
    /// The short-timeframe candle that just closed.
    pub candle: &'a Candle,
    /// Latest detector output for this contract's premium series.
    pub channel: Option<&'a Channel>,
    /// Latest long-timeframe momentum signal at or before the candle close.
    pub momentum: Option<&'a MomentumSignal>,
    /// Confirmation must arrive within this window of channel formation end.
    pub overlap_window: Duration,
    /// Pairing gate: breakouts only count while call/put biases are opposite.
    pub allow_breakout: bool,
}

/// Mutable state of one tracked contract for one expiry cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractState {
    pub spec: ContractSpec,
    pub stage: Stage,
    pub channel: Option<Channel>,
    pub confirmed_at: Option<NaiveDateTime>,
    pub momentum_magnitude: f64,
    pub entry_price: Option<f64>,
    pub target_price: Option<f64>,
    pub stop_price: Option<f64>,
}

impl ContractState {
    pub fn new(spec: ContractSpec) -> Self {
        Self {
            spec,
            stage: Stage::Idle,
            channel: None,
            confirmed_at: None,
            momentum_magnitude: 0.0,
            entry_price: None,
            target_price: None,
            stop_price: None,
        }
    }

    pub fn bias(&self) -> Option<ChannelBias> {
        self.channel.as_ref().map(|c| c.bias)
    }

    /// Advance the state machine for one closed short-timeframe candle.
    ///
    /// Returns a breakout event exactly when this bar completes the
    /// `MomentumConfirmed -> BreakoutConfirmed` transition.
    pub fn advance(&mut self, inputs: &SignalInputs<'_>) -> Option<BreakoutEvent> {
        match self.stage {
            Stage::Idle => {
                self.try_arm(inputs);
                None
            }
            Stage::PatternDetected => {
                self.refresh_channel(inputs);
                if self.window_expired(inputs) {
                    self.revert();
                    return None;
                }
                if let Some(momentum) = inputs.momentum {
                    if self.crossover_confirms(momentum, inputs) {
                        self.stage = Stage::MomentumConfirmed;
                        self.confirmed_at = Some(momentum.timestamp);
                        self.momentum_magnitude = momentum.magnitude();
                    }
                }
                None
            }
            Stage::MomentumConfirmed => self.try_breakout(inputs),
            // BreakoutConfirmed and terminals are driven from outside.
            _ => None,
        }
    }

    /// Force this contract out of the running for the cycle (the paired
    /// contract broke out first, or the cycle produced its one trade).
    pub fn cancel(&mut self) {
        if !self.stage.is_terminal() {
            self.stage = Stage::Cancelled;
        }
    }

    /// Record the planned trade levels so monitoring snapshots expose them.
    pub fn record_levels(&mut self, entry: f64, target: f64, stop: f64) {
        self.entry_price = Some(entry);
        self.target_price = Some(target);
        self.stop_price = Some(stop);
    }

    /// Terminal transition applied when the trade lifecycle resolves.
    pub fn settle(&mut self, outcome: Stage) {
        if Stage::can_transition(self.stage, outcome) {
            self.stage = outcome;
        }
    }

    fn try_arm(&mut self, inputs: &SignalInputs<'_>) {
        // Flat channels never arm the state machine.
        if let Some(channel) = inputs.channel {
            if channel.bias != ChannelBias::Flat {
                self.channel = Some(channel.clone());
                self.stage = Stage::PatternDetected;
            }
        }
    }

    /// A fresher valid channel replaces the armed one; re-detection on each
    /// bar keeps boundary extrapolation short.
    fn refresh_channel(&mut self, inputs: &SignalInputs<'_>) {
        if let Some(channel) = inputs.channel {
            if channel.bias != ChannelBias::Flat {
                self.channel = Some(channel.clone());
            }
        }
    }

    fn window_expired(&self, inputs: &SignalInputs<'_>) -> bool {
        match &self.channel {
            Some(channel) => inputs.candle.timestamp > channel.end + inputs.overlap_window,
            None => true,
        }
    }

    /// A crossover confirms when its direction matches the channel bias and
    /// it falls inside the overlap window: between formation start and
    /// formation end plus the window.
    fn crossover_confirms(&self, momentum: &MomentumSignal, inputs: &SignalInputs<'_>) -> bool {
        let Some(channel) = &self.channel else {
            return false;
        };
        let matches_bias = matches!(
            (channel.bias, momentum.crossover),
            (ChannelBias::Rising, Crossover::Bullish) | (ChannelBias::Falling, Crossover::Bearish)
        );
        matches_bias
            && momentum.timestamp >= channel.start
            && momentum.timestamp <= channel.end + inputs.overlap_window
    }

    fn try_breakout(&mut self, inputs: &SignalInputs<'_>) -> Option<BreakoutEvent> {
        if !inputs.allow_breakout {
            return None;
        }
        let channel = self.channel.as_ref()?;
        let candle = inputs.candle;
        let close_time =
            candle.timestamp + Duration::minutes(candle.timeframe.minutes() as i64);

        let direction = match channel.bias {
            ChannelBias::Rising if candle.close > channel.upper_at(close_time) => {
                BreakoutDirection::Up
            }
            ChannelBias::Falling if candle.close < channel.lower_at(close_time) => {
                BreakoutDirection::Down
            }
            _ => return None,
        };

        let event = BreakoutEvent {
            spec: self.spec.clone(),
            time: close_time,
            price: candle.close,
            direction,
            channel: channel.clone(),
            momentum_magnitude: self.momentum_magnitude,
        };
        self.stage = Stage::BreakoutConfirmed;
        self.entry_price = Some(candle.close);
        Some(event)
    }

    fn revert(&mut self) {
        self.stage = Stage::Idle;
        self.channel = None;
        self.confirmed_at = None;
        self.momentum_magnitude = 0.0;
    }
}
