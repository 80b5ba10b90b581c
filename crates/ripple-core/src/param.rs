//! Parameter slots: the data the graph re-evaluates.
//!
//! A [`Parameter`] is a named value slot at a [`NodeRef`]. Besides the value
//! it carries the two flags the scheduler steers by: `valid` (the slot holds
//! a usable value) and `pending` (the value is known stale because its
//! producing heavy function has not been authorized to run yet).

use serde::{Deserialize, Serialize};

use crate::function::ExecOutcome;
use crate::id::NodeRef;
use crate::value::ScalarValue;

/// A named data slot at a node in the host object model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Location of the slot. Doubles as its identity.
    pub node: NodeRef,
    /// Display name.
    pub name: String,
    /// Current value, `None` when the slot was never written.
    pub value: Option<ScalarValue>,
    /// `false` once an upstream failure or a type mismatch invalidated the
    /// slot. Consumers refuse to run on invalid inputs.
    pub valid: bool,
    /// Stale marker. Set when the producing heavy function was skipped;
    /// cleared only by an explicit write or by that function running.
    pub pending: bool,
    /// Monotonic modification tick assigned by the host model.
    pub modified_at: u64,
    /// Bookkeeping from the last evaluation that wrote this slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvalInfo>,
}

impl Parameter {
    /// Creates an unset, valid, non-pending parameter.
    pub fn new(node: NodeRef, name: impl Into<String>) -> Self {
        Parameter {
            node,
            name: name.into(),
            value: None,
            valid: true,
            pending: false,
            modified_at: 0,
            evaluation: None,
        }
    }

    /// Creates a parameter holding an initial value.
    pub fn with_value(node: NodeRef, name: impl Into<String>, value: ScalarValue) -> Self {
        let mut param = Parameter::new(node, name);
        param.value = Some(value);
        param
    }

    /// Writes a value. An explicit write restores validity and resets the
    /// stale marker.
    pub fn set_value(&mut self, value: ScalarValue) {
        self.value = Some(value);
        self.valid = true;
        self.pending = false;
    }

    /// Marks the slot stale without touching the value.
    pub fn mark_pending(&mut self) {
        self.pending = true;
    }

    /// Marks the slot unusable for downstream consumers.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }
}

/// Record of the evaluation that last wrote a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalInfo {
    /// Display name of the driver that produced the value.
    pub driver: String,
    /// Session counter at the time of the write.
    pub session: u64,
    /// Outcome reported by the driver.
    pub outcome: ExecOutcome,
}
