//! The host object-model boundary.
//!
//! The engine never owns the document data. [`ModelStore`] is the contract a
//! host implements to expose its label tree, parameter slots, and function
//! bindings; the dependency graph is built by walking it and evaluation
//! results are written back through it. The trait is synchronous and
//! object-safe, matching the single-threaded core.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::{DriverId, NodeRef};
use crate::param::Parameter;

/// A function attachment in the object model: which driver runs at a node,
/// and which parameter slots feed and receive it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionBinding {
    /// Registered driver executing at the anchor node.
    pub driver: DriverId,
    /// Argument parameter locations, in declared order.
    pub args: Vec<NodeRef>,
    /// Result parameter locations, in declared order.
    pub results: Vec<NodeRef>,
}

impl FunctionBinding {
    pub fn new(driver: DriverId) -> Self {
        FunctionBinding {
            driver,
            args: Vec::new(),
            results: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<NodeRef>) -> Self {
        self.args = args;
        self
    }

    pub fn with_results(mut self, results: Vec<NodeRef>) -> Self {
        self.results = results;
        self
    }
}

/// The storage contract the engine consumes.
///
/// Reads return snapshots by value; the engine holds no references into the
/// host between calls. `update_parameter` is the single mutation entry
/// point, so a transactional host can route every write through its delta
/// recording.
pub trait ModelStore {
    // -------------------------------------------------------------------
    // Tree traversal
    // -------------------------------------------------------------------

    /// The document root.
    fn root(&self) -> NodeRef;

    /// Direct children of a node, in stable order.
    fn children(&self, node: &NodeRef) -> Vec<NodeRef>;

    // -------------------------------------------------------------------
    // Resolution
    // -------------------------------------------------------------------

    /// The function binding anchored at `node`, if any.
    fn function_at(&self, node: &NodeRef) -> Option<FunctionBinding>;

    /// Snapshot of the parameter at `node`, if one exists.
    fn parameter(&self, node: &NodeRef) -> Option<Parameter>;

    // -------------------------------------------------------------------
    // Mutation
    // -------------------------------------------------------------------

    /// Replaces the parameter at `param.node`, assigning a fresh
    /// modification tick. Returns the tick.
    fn update_parameter(&mut self, param: Parameter) -> Result<u64, CoreError>;

    /// Attaches or replaces the function binding at `node`.
    fn bind_function(&mut self, node: &NodeRef, binding: FunctionBinding) -> Result<(), CoreError>;
}
