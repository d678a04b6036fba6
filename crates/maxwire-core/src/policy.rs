//! Value admission rules applied on both ends of the stream

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which plaintext values a peer accepts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuePolicy {
    /// Every `i32`
    AnyValue,

    /// Zero and above
    #[default]
    NonNegative,
}

impl ValuePolicy {
    /// Return `value` unchanged if admitted
    pub fn check(self, value: i32) -> Result<i32> {
        match self {
            ValuePolicy::NonNegative if value < 0 => Err(Error::NegativeValue(value)),
            _ => Ok(value),
        }
    }
}
