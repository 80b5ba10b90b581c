//! Core error types.
//!
//! Uses `thiserror` for structured, matchable variants. These cover
//! integrity failures in the data model; scheduling and transaction errors
//! live with the engine.

use thiserror::Error;

use crate::id::{DriverId, NodeRef, VertexId};

/// Errors produced by the core data model.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A driver name was registered twice.
    #[error("duplicate driver name: '{name}'")]
    DuplicateDriver { name: String },

    /// A driver id did not resolve in the table.
    #[error("unknown driver: DriverId({id})", id = id.0)]
    UnknownDriver { id: DriverId },

    /// No parameter exists at the given node.
    #[error("parameter not found at {node}")]
    ParameterNotFound { node: NodeRef },

    /// No node exists at the given location.
    #[error("node not found: {node}")]
    NodeNotFound { node: NodeRef },

    /// A vertex id did not resolve in the current snapshot.
    #[error("vertex not found: VertexId({id})", id = id.0)]
    VertexNotFound { id: VertexId },

    /// A parameter write arrived while no transaction was open.
    #[error("no open transaction for write at {node}")]
    TransactionRequired { node: NodeRef },
}
