//! In-memory reference implementations of the host-model boundary.
//!
//! [`InMemoryModel`] is the naked object model: a label tree with parameter
//! slots and function bindings, free to mutate while a host sets up its
//! initial state. [`MemoryDocument`] wraps a model and gates every
//! parameter write through the single-open-command discipline, recording
//! per-commit deltas so undo/redo can restore prior storage exactly.

use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};

use ripple_core::store::{FunctionBinding, ModelStore};
use ripple_core::{CoreError, NodeRef, Parameter, ScalarValue};

use crate::error::ModelError;
use crate::traits::{CommitId, Delta, Document};

// ---------------------------------------------------------------------------
// InMemoryModel
// ---------------------------------------------------------------------------

/// A label tree with parameter slots and function bindings.
///
/// Nodes are registered implicitly: inserting a parameter or binding at a
/// path registers the path and all its ancestors. The modification tick is
/// monotonic across all writes.
#[derive(Debug, Clone, Default)]
pub struct InMemoryModel {
    params: IndexMap<NodeRef, Parameter>,
    functions: IndexMap<NodeRef, FunctionBinding>,
    nodes: IndexSet<NodeRef>,
    tick: u64,
}

impl InMemoryModel {
    pub fn new() -> Self {
        let mut model = InMemoryModel::default();
        model.nodes.insert(NodeRef::root());
        model
    }

    fn register_node(&mut self, node: &NodeRef) {
        let mut current = node.clone();
        while self.nodes.insert(current.clone()) {
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }
    }

    /// Inserts a parameter slot, registering its node. Returns the tick.
    pub fn insert_parameter(&mut self, param: Parameter) -> u64 {
        self.tick += 1;
        let mut param = param;
        param.modified_at = self.tick;
        self.register_node(&param.node);
        self.params.insert(param.node.clone(), param);
        self.tick
    }

    /// Removes the parameter slot at `node`, if any.
    pub fn remove_parameter(&mut self, node: &NodeRef) -> Option<Parameter> {
        self.params.shift_remove(node)
    }

    /// Deletes `node` and its entire subtree: parameters, bindings, nodes.
    pub fn remove_node(&mut self, node: &NodeRef) {
        self.params.retain(|n, _| !n.is_within(node));
        self.functions.retain(|n, _| !n.is_within(node));
        self.nodes.retain(|n| !n.is_within(node));
    }

    /// Current modification tick.
    pub fn tick(&self) -> u64 {
        self.tick
    }
}

impl ModelStore for InMemoryModel {
    fn root(&self) -> NodeRef {
        NodeRef::root()
    }

    fn children(&self, node: &NodeRef) -> Vec<NodeRef> {
        let mut out: Vec<NodeRef> = self
            .nodes
            .iter()
            .filter(|n| n.parent().as_ref() == Some(node))
            .cloned()
            .collect();
        out.sort();
        out
    }

    fn function_at(&self, node: &NodeRef) -> Option<FunctionBinding> {
        self.functions.get(node).cloned()
    }

    fn parameter(&self, node: &NodeRef) -> Option<Parameter> {
        self.params.get(node).cloned()
    }

    fn update_parameter(&mut self, param: Parameter) -> Result<u64, CoreError> {
        Ok(self.insert_parameter(param))
    }

    fn bind_function(&mut self, node: &NodeRef, binding: FunctionBinding) -> Result<(), CoreError> {
        self.register_node(node);
        self.functions.insert(node.clone(), binding);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryDocument
// ---------------------------------------------------------------------------

/// One committed command: its storage deltas plus the ordered
/// primitive-value record attached at commit time.
#[derive(Debug, Clone)]
struct Commit {
    id: CommitId,
    deltas: Vec<Delta>,
    record: Vec<ScalarValue>,
}

/// An undo/redo-capable document over an [`InMemoryModel`].
///
/// Reads pass straight through. Parameter writes require an open command
/// and are captured as before/after deltas; undo restores the before
/// states without journaling anything -- re-marking is the transaction
/// engine's job.
#[derive(Debug, Default)]
pub struct MemoryDocument {
    model: InMemoryModel,
    undo_stack: VecDeque<Commit>,
    redo_stack: Vec<Commit>,
    open: Option<Vec<Delta>>,
    undo_limit: usize,
    next_commit: u64,
}

impl MemoryDocument {
    /// Wraps an already-populated model.
    pub fn new(model: InMemoryModel) -> Self {
        MemoryDocument {
            model,
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            open: None,
            undo_limit: 0,
            next_commit: 0,
        }
    }

    /// Read-only access to the wrapped model.
    pub fn model(&self) -> &InMemoryModel {
        &self.model
    }

    /// Unwraps the document, discarding its history.
    pub fn into_model(self) -> InMemoryModel {
        self.model
    }

    /// The primitive-value record attached to a commit, if it is still on
    /// either stack.
    pub fn record_of(&self, id: CommitId) -> Option<&[ScalarValue]> {
        self.undo_stack
            .iter()
            .chain(self.redo_stack.iter())
            .find(|c| c.id == id)
            .map(|c| c.record.as_slice())
    }

    /// Deletes `node` and its subtree. Structural removal is not part of
    /// the delta record; callers clear their journal references
    /// separately.
    pub fn remove_node(&mut self, node: &NodeRef) {
        self.model.remove_node(node);
    }

    fn apply_state(model: &mut InMemoryModel, node: &NodeRef, state: &Option<Parameter>) {
        match state {
            // Restore the captured parameter exactly, tick included.
            Some(param) => {
                model.register_node(node);
                model.params.insert(node.clone(), param.clone());
            }
            None => {
                model.params.shift_remove(node);
            }
        }
    }
}

impl ModelStore for MemoryDocument {
    fn root(&self) -> NodeRef {
        self.model.root()
    }

    fn children(&self, node: &NodeRef) -> Vec<NodeRef> {
        self.model.children(node)
    }

    fn function_at(&self, node: &NodeRef) -> Option<FunctionBinding> {
        self.model.function_at(node)
    }

    fn parameter(&self, node: &NodeRef) -> Option<Parameter> {
        self.model.parameter(node)
    }

    fn update_parameter(&mut self, param: Parameter) -> Result<u64, CoreError> {
        let deltas = self.open.as_mut().ok_or(CoreError::TransactionRequired {
            node: param.node.clone(),
        })?;
        let node = param.node.clone();
        let before = self.model.params.get(&node).cloned();
        let tick = self.model.insert_parameter(param);
        let after = self.model.params.get(&node).cloned();
        deltas.push(Delta {
            node,
            before,
            after,
        });
        Ok(tick)
    }

    fn bind_function(&mut self, node: &NodeRef, binding: FunctionBinding) -> Result<(), CoreError> {
        self.model.bind_function(node, binding)
    }
}

impl Document for MemoryDocument {
    fn open_command(&mut self) -> Result<(), ModelError> {
        if self.open.is_some() {
            return Err(ModelError::CommandAlreadyOpen);
        }
        self.open = Some(Vec::new());
        Ok(())
    }

    fn commit_command(&mut self, record: Vec<ScalarValue>) -> Result<CommitId, ModelError> {
        let deltas = self.open.take().ok_or(ModelError::NoOpenCommand)?;
        let id = CommitId(self.next_commit);
        self.next_commit += 1;

        // New history invalidates anything previously undone.
        self.redo_stack.clear();
        self.undo_stack.push_back(Commit { id, deltas, record });
        if self.undo_limit > 0 {
            while self.undo_stack.len() > self.undo_limit {
                self.undo_stack.pop_front();
            }
        }
        Ok(id)
    }

    fn abort_command(&mut self) -> Result<(), ModelError> {
        let deltas = self.open.take().ok_or(ModelError::NoOpenCommand)?;
        for delta in deltas.iter().rev() {
            Self::apply_state(&mut self.model, &delta.node, &delta.before);
        }
        Ok(())
    }

    fn has_open_command(&self) -> bool {
        self.open.is_some()
    }

    fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    fn undo_deltas(&self, count: usize) -> Vec<Delta> {
        self.undo_stack
            .iter()
            .rev()
            .take(count)
            .flat_map(|c| c.deltas.iter().cloned())
            .collect()
    }

    fn redo_deltas(&self, count: usize) -> Vec<Delta> {
        self.redo_stack
            .iter()
            .rev()
            .take(count)
            .flat_map(|c| c.deltas.iter().cloned())
            .collect()
    }

    fn undo(&mut self, count: usize) -> Result<usize, ModelError> {
        if self.open.is_some() {
            return Err(ModelError::CommandAlreadyOpen);
        }
        let mut undone = 0;
        for _ in 0..count {
            let Some(commit) = self.undo_stack.pop_back() else {
                break;
            };
            for delta in commit.deltas.iter().rev() {
                Self::apply_state(&mut self.model, &delta.node, &delta.before);
            }
            self.redo_stack.push(commit);
            undone += 1;
        }
        Ok(undone)
    }

    fn redo(&mut self, count: usize) -> Result<usize, ModelError> {
        if self.open.is_some() {
            return Err(ModelError::CommandAlreadyOpen);
        }
        let mut redone = 0;
        for _ in 0..count {
            let Some(commit) = self.redo_stack.pop() else {
                break;
            };
            for delta in &commit.deltas {
                Self::apply_state(&mut self.model, &delta.node, &delta.after);
            }
            self.undo_stack.push_back(commit);
            redone += 1;
        }
        Ok(redone)
    }

    fn set_undo_limit(&mut self, limit: usize) {
        self.undo_limit = limit;
        if limit > 0 {
            while self.undo_stack.len() > limit {
                self.undo_stack.pop_front();
            }
        }
    }
}
