//! The primitive value universe carried by parameters and commit records.
//!
//! [`ScalarValue`] is the runtime value; [`ValueKind`] is the matching tag
//! used in declared function signatures. Keeping the tag separate lets a
//! signature say "any" without a phantom runtime value.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A primitive value stored in a parameter slot or a commit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    Int(i64),
    Real(f64),
    Bool(bool),
    Str(String),
}

impl ScalarValue {
    /// Returns the kind tag for this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            ScalarValue::Int(_) => ValueKind::Int,
            ScalarValue::Real(_) => ValueKind::Real,
            ScalarValue::Bool(_) => ValueKind::Bool,
            ScalarValue::Str(_) => ValueKind::Str,
        }
    }

    /// Returns the integer payload, if this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ScalarValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as a float. Integers widen losslessly enough for
    /// evaluation purposes; other kinds return `None`.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            ScalarValue::Real(v) => Some(*v),
            ScalarValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Returns the boolean payload, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScalarValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string payload, if this is a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Int(v) => write!(f, "{}", v),
            ScalarValue::Real(v) => write!(f, "{}", v),
            ScalarValue::Bool(v) => write!(f, "{}", v),
            ScalarValue::Str(v) => write!(f, "{:?}", v),
        }
    }
}

/// Declared kind of a function argument or result slot.
///
/// `Any` accepts every runtime value including an unset slot; the concrete
/// kinds require a set value of the matching variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    Int,
    Real,
    Bool,
    Str,
    Any,
}

impl ValueKind {
    /// Returns `true` if a slot of this kind admits the given value state.
    ///
    /// `None` models an unset parameter, admitted only by `Any`.
    pub fn admits(&self, value: Option<&ScalarValue>) -> bool {
        match (self, value) {
            (ValueKind::Any, _) => true,
            (_, None) => false,
            (kind, Some(v)) => *kind == v.kind(),
        }
    }
}
