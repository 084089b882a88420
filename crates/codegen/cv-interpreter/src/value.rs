//! Runtime value representation

#![allow(
    clippy::min_ident_chars,
    reason = "fmt::Formatter is conventionally bound as f"
)]

use cv_bound::Constant;
use std::fmt;

/// Runtime value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// No value; also the contents of unassigned fields
    Unit,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// The null reference
    Null,
}

impl Value {
    /// Get the value as a boolean, if possible
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Get the value as an integer, if possible
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<Constant> for Value {
    fn from(constant: Constant) -> Self {
        match constant {
            Constant::Int(value) => Self::Int(value),
            Constant::Bool(value) => Self::Bool(value),
            Constant::Null => Self::Null,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit => write!(f, "()"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Null => write!(f, "null"),
        }
    }
}
