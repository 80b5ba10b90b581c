//! The undo/redo-capable document boundary.
//!
//! A [`Document`] is a [`ModelStore`] whose writes are gated through
//! commands (transactions) and recorded as per-commit [`Delta`] lists. The
//! transaction engine consumes those lists to re-mark parameters after time
//! travel, because undo/redo restores storage without going through the
//! setter path that would normally journal the change.

use serde::{Deserialize, Serialize};

use ripple_core::{NodeRef, Parameter, ScalarValue};
use ripple_core::store::ModelStore;

use crate::error::ModelError;

/// Identifier of a committed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitId(pub u64);

/// One storage change within a commit: the full before/after parameter
/// state at a node. `before == None` means the commit created the slot;
/// `after == None` means it removed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub node: NodeRef,
    pub before: Option<Parameter>,
    pub after: Option<Parameter>,
}

/// An undo/redo-capable document over a host model.
///
/// Command discipline is single-open: opening a second command without
/// closing the first is a programming error, reported, never recovered.
pub trait Document: ModelStore {
    // -------------------------------------------------------------------
    // Command lifecycle
    // -------------------------------------------------------------------

    /// Opens a command. All parameter writes must happen inside one.
    fn open_command(&mut self) -> Result<(), ModelError>;

    /// Commits the open command, attaching the ordered primitive-value
    /// record collected during it. Invalidates the redo stack.
    fn commit_command(&mut self, record: Vec<ScalarValue>) -> Result<CommitId, ModelError>;

    /// Discards the open command, rolling back its writes.
    fn abort_command(&mut self) -> Result<(), ModelError>;

    fn has_open_command(&self) -> bool;

    // -------------------------------------------------------------------
    // Time travel
    // -------------------------------------------------------------------

    fn undo_count(&self) -> usize;

    fn redo_count(&self) -> usize;

    /// The deltas of the `count` most recent commits, i.e. exactly the
    /// storage changes an `undo(count)` is about to roll back. Newest
    /// commit first.
    fn undo_deltas(&self, count: usize) -> Vec<Delta>;

    /// The deltas an immediate `redo(count)` would re-apply.
    fn redo_deltas(&self, count: usize) -> Vec<Delta>;

    /// Rolls back up to `count` commits. Returns how many were undone.
    fn undo(&mut self, count: usize) -> Result<usize, ModelError>;

    /// Re-applies up to `count` undone commits. Returns how many.
    fn redo(&mut self, count: usize) -> Result<usize, ModelError>;

    /// Caps the undo stack depth; `0` means unbounded.
    fn set_undo_limit(&mut self, limit: usize);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_roundtrip_delta() {
        let node = NodeRef::root().child(3);
        let delta = Delta {
            node: node.clone(),
            before: None,
            after: Some(Parameter::with_value(node, "p", ScalarValue::Int(1))),
        };
        let json = serde_json::to_string(&delta).unwrap();
        let back: Delta = serde_json::from_str(&json).unwrap();
        assert_eq!(delta, back);

        let id = CommitId(7);
        let json = serde_json::to_string(&id).unwrap();
        let back: CommitId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
