//! The tree-function contract and the driver registry.
//!
//! A [`TreeFunction`] is the polymorphic unit of computation: it validates
//! its parameter slots against a declared [`Signature`], executes, and tells
//! the scheduler how it wants to be treated (light/heavy, priority,
//! propagation opt-out). Implementations are registered once in a
//! [`DriverTable`] and referenced from the object model by [`DriverId`].
//!
//! Execution never unwinds across the trait boundary: `execute` reports an
//! [`ExecOutcome`], and unrecoverable parameter states are detected up front
//! via [`TreeFunction::has_unrecoverable_parameters`] so the body is not
//! invoked at all.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::{DriverId, NodeRef};
use crate::param::Parameter;
use crate::progress::Progress;
use crate::store::ModelStore;
use crate::value::ValueKind;

/// Scheduling class of a tree function.
///
/// Light functions run whenever an input is marked modified or forced.
/// Heavy functions additionally require a session-scoped deployment
/// authorization; without it they only forward their stale marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionKind {
    Light,
    Heavy,
}

/// Status reported by a driver body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

/// Declared argument and result kinds of a driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub args: Vec<ValueKind>,
    pub results: Vec<ValueKind>,
}

impl Signature {
    pub fn new(args: Vec<ValueKind>, results: Vec<ValueKind>) -> Self {
        Signature { args, results }
    }
}

/// Which side of a function a validation issue concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotDirection {
    Argument,
    Result,
}

/// One parameter/signature mismatch found during validation.
///
/// Mismatches mark the function instance invalid; they are collected, not
/// thrown, so the rest of the graph keeps evaluating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub direction: SlotDirection,
    /// Slot position within the declared signature.
    pub port: usize,
    /// Declared kind, `None` for a slot beyond the signature.
    pub expected: Option<ValueKind>,
    /// Runtime kind, `None` for an unset or missing slot.
    pub actual: Option<ValueKind>,
    /// Location of the offending parameter, when one exists.
    pub node: Option<NodeRef>,
}

/// Everything a driver body receives.
pub struct ExecArgs<'a> {
    /// Input parameter snapshots, in declared argument order.
    pub inputs: &'a [Parameter],
    /// Output parameters to fill, in declared result order.
    pub outputs: &'a mut [Parameter],
    /// Shared user data registered for this driver kind, if any.
    pub shared: Option<&'a mut dyn Any>,
    /// Cooperative progress/cancellation channel.
    pub progress: &'a Progress,
}

/// The polymorphic computation bound to parameters in the object model.
pub trait TreeFunction: Send + Sync {
    /// Stable display identifier.
    fn name(&self) -> &str;

    /// Light/heavy scheduling class.
    fn kind(&self) -> FunctionKind;

    /// Tie-break hint among otherwise-unordered vertices. Higher runs first.
    fn priority(&self) -> i32 {
        0
    }

    /// Opt-in: request execution even when no input changed.
    fn must_execute_intact(&self, _inputs: &[Parameter]) -> bool {
        false
    }

    /// Opt-out: suppress automatic impacted-marking of results after a run.
    fn no_propagation(&self) -> bool {
        false
    }

    /// Declared argument/result kinds.
    fn signature(&self) -> Signature;

    /// Checks runtime argument slots against the declared signature.
    fn validate_input(&self, inputs: &[Parameter]) -> Vec<ValidationIssue> {
        check_slots(&self.signature().args, inputs, SlotDirection::Argument)
    }

    /// Checks runtime result slots against the declared signature.
    ///
    /// Only arity and kind-of-set-values are checked: a result that was
    /// never produced yet carries no value and that is not a mismatch.
    fn validate_output(&self, outputs: &[Parameter]) -> Vec<ValidationIssue> {
        let expected = self.signature().results;
        let mut issues = Vec::new();
        for (port, slot) in expected.iter().enumerate() {
            match outputs.get(port) {
                None => issues.push(ValidationIssue {
                    direction: SlotDirection::Result,
                    port,
                    expected: Some(*slot),
                    actual: None,
                    node: None,
                }),
                Some(param) => {
                    if let Some(value) = &param.value {
                        if !slot.admits(Some(value)) {
                            issues.push(ValidationIssue {
                                direction: SlotDirection::Result,
                                port,
                                expected: Some(*slot),
                                actual: Some(value.kind()),
                                node: Some(param.node.clone()),
                            });
                        }
                    }
                }
            }
        }
        for (port, param) in outputs.iter().enumerate().skip(expected.len()) {
            issues.push(ValidationIssue {
                direction: SlotDirection::Result,
                port,
                expected: None,
                actual: param.value.as_ref().map(|v| v.kind()),
                node: Some(param.node.clone()),
            });
        }
        issues
    }

    /// Full validation: arguments then results.
    fn validate(&self, inputs: &[Parameter], outputs: &[Parameter]) -> Vec<ValidationIssue> {
        let mut issues = self.validate_input(inputs);
        issues.extend(self.validate_output(outputs));
        issues
    }

    /// Returns `true` when execution would be pointless: an input is
    /// invalid or unset. Such instances fail without the body running.
    fn has_unrecoverable_parameters(&self, inputs: &[Parameter]) -> bool {
        inputs.iter().any(|p| !p.valid || p.value.is_none())
    }

    /// The computation. Must not panic; report failure via the outcome.
    fn execute(&self, args: ExecArgs<'_>) -> ExecOutcome;

    /// Optional hook: establish this function's own argument/result wiring
    /// when first attached to `owner`, instead of requiring the host to
    /// wire it explicitly.
    fn auto_connect(&self, _owner: &NodeRef, _store: &mut dyn ModelStore) -> Result<(), CoreError> {
        Ok(())
    }
}

/// Strict slot check used for arguments: every declared slot needs a set
/// value of the right kind.
fn check_slots(
    expected: &[ValueKind],
    actual: &[Parameter],
    direction: SlotDirection,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for (port, slot) in expected.iter().enumerate() {
        match actual.get(port) {
            None => issues.push(ValidationIssue {
                direction,
                port,
                expected: Some(*slot),
                actual: None,
                node: None,
            }),
            Some(param) => {
                if !slot.admits(param.value.as_ref()) {
                    issues.push(ValidationIssue {
                        direction,
                        port,
                        expected: Some(*slot),
                        actual: param.value.as_ref().map(|v| v.kind()),
                        node: Some(param.node.clone()),
                    });
                }
            }
        }
    }
    for (port, param) in actual.iter().enumerate().skip(expected.len()) {
        issues.push(ValidationIssue {
            direction,
            port,
            expected: None,
            actual: param.value.as_ref().map(|v| v.kind()),
            node: Some(param.node.clone()),
        });
    }
    issues
}

/// Registry of tree-function drivers, keyed by [`DriverId`].
///
/// One table per document; the object model stores driver ids, never
/// driver references, so a table rebuilt at startup re-binds every node.
#[derive(Default)]
pub struct DriverTable {
    drivers: Vec<Arc<dyn TreeFunction>>,
    by_name: HashMap<String, DriverId>,
}

impl DriverTable {
    pub fn new() -> Self {
        DriverTable::default()
    }

    /// Registers a driver and returns its id. Names must be unique.
    pub fn register(&mut self, driver: Arc<dyn TreeFunction>) -> Result<DriverId, CoreError> {
        let name = driver.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(CoreError::DuplicateDriver { name });
        }
        let id = DriverId(self.drivers.len() as u32);
        self.by_name.insert(name, id);
        self.drivers.push(driver);
        Ok(id)
    }

    /// Looks up a driver by id.
    pub fn get(&self, id: DriverId) -> Option<&Arc<dyn TreeFunction>> {
        self.drivers.get(id.0 as usize)
    }

    /// Looks up a driver id by display name.
    pub fn find(&self, name: &str) -> Option<DriverId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

impl std::fmt::Debug for DriverTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverTable")
            .field("drivers", &self.drivers.len())
            .finish()
    }
}
