//! Pairing rule: the call and put at the selected strike are tracked
//! together, and a breakout only trades while their channel biases are
//! opposite. One trade per expiry cycle.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::channel::{Channel, ChannelBias};
use crate::domain::{Candle, ContractSpec, ExitReason, OptionType};
use crate::momentum::MomentumSignal;

use super::stage::Stage;
use super::state::{BreakoutEvent, ContractState, SignalInputs};

/// Point-in-time view of one contract for monitoring output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractSnapshot {
    pub spec: ContractSpec,
    pub stage: Stage,
    pub bias: Option<ChannelBias>,
    pub last_close: f64,
    pub entry_price: Option<f64>,
    pub target_price: Option<f64>,
    pub stop_price: Option<f64>,
}

/// Point-in-time view of the pair, one row per processed bar pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairSnapshot {
    pub timestamp: chrono::NaiveDateTime,
    pub call: ContractSnapshot,
    pub put: ContractSnapshot,
    pub pairing_valid: bool,
}

/// Per-bar data for one side of the pair.
#[derive(Debug, Clone, Copy)]
pub struct SideInputs<'a> {
    pub candle: &'a Candle,
    pub channel: Option<&'a Channel>,
    pub momentum: Option<&'a MomentumSignal>,
}

/// Drives the call and put state machines in lockstep for one expiry cycle.
#[derive(Debug, Clone)]
pub struct PairEngine {
    call: ContractState,
    put: ContractState,
    overlap_window: Duration,
    traded: bool,
}

impl PairEngine {
    pub fn new(call: ContractSpec, put: ContractSpec, overlap_window: Duration) -> Self {
        debug_assert_eq!(call.option_type, OptionType::Call);
        debug_assert_eq!(put.option_type, OptionType::Put);
        Self {
            call: ContractState::new(call),
            put: ContractState::new(put),
            overlap_window,
            traded: false,
        }
    }

    /// Whether this cycle has already produced its one trade.
    pub fn has_traded(&self) -> bool {
        self.traded
    }

    /// Pairing is valid when both sides carry a channel and the biases are
    /// opposite: one Rising, the other Falling.
    pub fn pairing_valid(&self) -> bool {
        matches!(
            (self.call.bias(), self.put.bias()),
            (Some(ChannelBias::Rising), Some(ChannelBias::Falling))
                | (Some(ChannelBias::Falling), Some(ChannelBias::Rising))
        )
    }

    /// Process one aligned pair of short-timeframe bars.
    ///
    /// Returns the breakout selected for trading, if any. When both sides
    /// break out on the same bar the one with the larger momentum magnitude
    /// wins; on an exact tie the call side wins. The losing side is
    /// cancelled either way.
    pub fn on_bar(
        &mut self,
        call: SideInputs<'_>,
        put: SideInputs<'_>,
    ) -> (Option<BreakoutEvent>, PairSnapshot) {
        // The gate is computed from the channels visible on THIS bar, before
        // either side advances, so a side can never break out against a
        // same-bias pair.
        let gate = self.gate_for(call.channel, put.channel);

        let call_event = self.call.advance(&SignalInputs {
            candle: call.candle,
            channel: call.channel,
            momentum: call.momentum,
            overlap_window: self.overlap_window,
            allow_breakout: gate,
        });
        let put_event = self.put.advance(&SignalInputs {
            candle: put.candle,
            channel: put.channel,
            momentum: put.momentum,
            overlap_window: self.overlap_window,
            allow_breakout: gate,
        });

        let selected = match (call_event, put_event) {
            (Some(c), Some(p)) => {
                if p.momentum_magnitude > c.momentum_magnitude {
                    self.call.cancel();
                    Some(p)
                } else {
                    self.put.cancel();
                    Some(c)
                }
            }
            (Some(c), None) => {
                self.put.cancel();
                Some(c)
            }
            (None, Some(p)) => {
                self.call.cancel();
                Some(p)
            }
            (None, None) => None,
        };
        if selected.is_some() {
            self.traded = true;
        }

        let snapshot = self.snapshot(call.candle, put.candle);
        (selected, snapshot)
    }

    /// Record the planned levels on the side that broke out.
    pub fn record_plan(&mut self, side: OptionType, entry: f64, target: f64, stop: f64) {
        self.side_mut(side).record_levels(entry, target, stop);
    }

    /// Settle the traded side with its terminal stage.
    pub fn record_outcome(&mut self, side: OptionType, reason: ExitReason) {
        let stage = match reason {
            ExitReason::TargetHit => Stage::TargetHit,
            ExitReason::StopHit => Stage::StopHit,
            ExitReason::Expired => Stage::Expired,
        };
        self.side_mut(side).settle(stage);
    }

    /// Cancel both sides; called when the cycle ends without resolution.
    pub fn cancel_all(&mut self) {
        self.call.cancel();
        self.put.cancel();
    }

    /// Arming and momentum confirmation run independently per side; the
    /// opposite-bias requirement bites here, at the breakout decision.
    /// Biases may drift in and out of opposition while a side waits, and
    /// the pair becomes tradable again the moment they oppose.
    fn gate_for(&self, call_channel: Option<&Channel>, put_channel: Option<&Channel>) -> bool {
        if self.traded {
            return false;
        }
        // A side that is already armed keeps its stored channel when the
        // detector returns nothing on this bar.
        let call_bias = call_channel
            .map(|c| c.bias)
            .or_else(|| self.call.bias());
        let put_bias = put_channel.map(|c| c.bias).or_else(|| self.put.bias());
        matches!(
            (call_bias, put_bias),
            (Some(ChannelBias::Rising), Some(ChannelBias::Falling))
                | (Some(ChannelBias::Falling), Some(ChannelBias::Rising))
        )
    }

    fn side_mut(&mut self, side: OptionType) -> &mut ContractState {
        match side {
            OptionType::Call => &mut self.call,
            OptionType::Put => &mut self.put,
        }
    }

    fn snapshot(&self, call_candle: &Candle, put_candle: &Candle) -> PairSnapshot {
        PairSnapshot {
            timestamp: call_candle.timestamp,
            call: Self::contract_snapshot(&self.call, call_candle),
            put: Self::contract_snapshot(&self.put, put_candle),
            pairing_valid: self.pairing_valid(),
        }
    }

    fn contract_snapshot(state: &ContractState, candle: &Candle) -> ContractSnapshot {
        ContractSnapshot {
            spec: state.spec.clone(),
            stage: state.stage,
            bias: state.bias(),
            last_close: candle.close,
            entry_price: state.entry_price,
            target_price: state.target_price,
            stop_price: state.stop_price,
        }
    }
}
