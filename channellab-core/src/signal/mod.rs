//! Breakout signal machinery: per-contract stage tracking plus the
//! call/put pairing engine that enforces one trade per expiry cycle.

mod pair;
mod stage;
mod state;

pub use pair::{ContractSnapshot, PairEngine, PairSnapshot, SideInputs};
pub use stage::Stage;
pub use state::{BreakoutDirection, BreakoutEvent, ContractState, SignalInputs};
