//! Domain types: candles, contracts, trades.

pub mod candle;
pub mod contract;
pub mod trade;

pub use candle::{
    minutes_of_day, Candle, Timeframe, SESSION_CLOSE_MINUTES, SESSION_OPEN_MINUTES,
};
pub use contract::{ContractSpec, OptionType};
pub use trade::{ExitReason, Trade};
