//! Weekly expiry calendar.
//!
//! The strategy trades NIFTY weekly options: contracts expire every
//! Thursday, and a cycle's tradable days run Monday through its expiry
//! Thursday. Only the orchestrator knows this structure; the core stays
//! calendar-free.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use channellab_core::domain::SESSION_CLOSE_MINUTES;

/// One weekly expiry and the trading days leading into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryCycle {
    pub expiry: NaiveDate,
    /// Monday through Thursday of the expiry week, clamped to the run's
    /// date range.
    pub trading_days: Vec<NaiveDate>,
}

impl ExpiryCycle {
    /// Session close on expiry day, when unresolved trades are settled.
    pub fn expiry_close(&self) -> NaiveDateTime {
        self.expiry.and_time(session_close())
    }
}

fn session_close() -> NaiveTime {
    NaiveTime::from_num_seconds_from_midnight_opt(SESSION_CLOSE_MINUTES * 60, 0)
        .unwrap_or_default()
}

/// Every Thursday falling inside `[start, end]`.
pub fn expiry_dates(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let offset = (Weekday::Thu.num_days_from_monday() + 7
        - start.weekday().num_days_from_monday())
        % 7;
    let mut day = start + Duration::days(offset as i64);
    while day <= end {
        out.push(day);
        day += Duration::days(7);
    }
    out
}

/// Build the expiry cycles for a run, clamping each cycle's trading days to
/// the configured date range.
pub fn build_cycles(start: NaiveDate, end: NaiveDate) -> Vec<ExpiryCycle> {
    expiry_dates(start, end)
        .into_iter()
        .map(|expiry| {
            let monday = expiry - Duration::days(3);
            let trading_days = (0..4)
                .map(|i| monday + Duration::days(i))
                .filter(|d| *d >= start && *d <= end)
                .collect();
            ExpiryCycle {
                expiry,
                trading_days,
            }
        })
        .collect()
}
