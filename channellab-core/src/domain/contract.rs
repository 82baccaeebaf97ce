//! Option contract identification.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Call or put side of an option pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    /// The opposite side of the pair.
    pub fn other(self) -> OptionType {
        match self {
            OptionType::Call => OptionType::Put,
            OptionType::Put => OptionType::Call,
        }
    }

    /// Exchange suffix ("CE" / "PE").
    pub fn suffix(self) -> &'static str {
        match self {
            OptionType::Call => "CE",
            OptionType::Put => "PE",
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// A specific strike/expiry/type contract on one underlying.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractSpec {
    pub underlying: String,
    pub strike: u32,
    pub option_type: OptionType,
    pub expiry: NaiveDate,
}

impl fmt::Display for ContractSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}",
            self.underlying,
            self.expiry.format("%d%b%y").to_string().to_uppercase(),
            self.strike,
            self.option_type
        )
    }
}
