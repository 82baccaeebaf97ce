//! Trade — a completed round-trip on one option contract.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::contract::OptionType;

/// Why a trade closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    /// Price reached the selected Fibonacci target.
    TargetHit,
    /// A candle closed back inside the channel (re-entry stop).
    StopHit,
    /// Neither level was hit before contract expiry; closed at last price.
    Expired,
}

/// A closed trade. Created only on a confirmed breakout and immutable once
/// closed; one per expiry cycle at most.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub strike: u32,
    pub option_type: OptionType,
    pub expiry: NaiveDate,

    pub entry_time: NaiveDateTime,
    pub entry_price: f64,
    pub exit_time: NaiveDateTime,
    pub exit_price: f64,

    /// Units bought (lots x lot size).
    pub quantity: u32,
    /// Premium paid at entry: quantity x entry_price.
    pub investment: f64,

    pub target_price: f64,
    pub stop_price: f64,

    pub pnl: f64,
    /// Price return in percent: (exit - entry) / entry * 100.
    pub return_pct: f64,

    pub entry_reason: String,
    pub exit_reason: ExitReason,
}

impl Trade {
    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }
}
