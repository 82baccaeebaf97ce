//! ChannelLab Core — domain types, resampling, channel detection, momentum,
//! signal state machines, and the trade lifecycle.
//!
//! This crate contains the deterministic heart of the backtester:
//! - Domain types (candles, contracts, trades)
//! - Session-aware candle resampling
//! - Parallel-channel detection from pivot highs/lows
//! - KST-style momentum oscillator with signal-line crossovers
//! - Per-contract signal state machine and the call/put pairing engine
//! - Trade planning (Fibonacci targets, re-entry stop, lot sizing) and replay
//!
//! Everything here is pure: no clocks, no files, no threads. The runner
//! crate owns calendars, data loading, and parallel orchestration.

pub mod channel;
pub mod domain;
pub mod lifecycle;
pub mod momentum;
pub mod resample;
pub mod signal;
