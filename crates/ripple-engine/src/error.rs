//! Engine error types.
//!
//! Configuration errors (transaction misuse, missing document, frozen
//! graph) are fatal and reported immediately; they are programmer errors,
//! not data errors. Data-level failures -- an invalid or failing function
//! instance -- are *not* errors at this level: they are contained in the
//! session report and only invalidate their own downstream.

use thiserror::Error;

use ripple_core::{CoreError, NodeRef};
use ripple_model::ModelError;

/// Errors produced by the execution and transaction engines.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A transaction operation arrived while transaction support is
    /// globally disabled.
    #[error("transaction support is disabled")]
    TransactionsDisabled,

    /// A transaction operation arrived with no document attached.
    #[error("no document is attached")]
    NoDocument,

    /// A graph rebuild was requested while a traversal holds the snapshot
    /// frozen.
    #[error("the dependency graph is frozen")]
    GraphFrozen,

    /// An operation needed a graph snapshot before any was built.
    #[error("no dependency graph has been built")]
    GraphNotBuilt,

    /// Propagation refused to run on a cyclic graph.
    #[error("dependency cycle over {n} parameter(s)", n = parameters.len())]
    CycleDetected { parameters: Vec<NodeRef> },

    /// Underlying data-model failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Underlying document failure.
    #[error(transparent)]
    Model(#[from] ModelError),
}
