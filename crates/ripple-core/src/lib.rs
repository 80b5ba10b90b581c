//! Core data model for the ripple re-evaluation engine: node identities,
//! parameter slots, the tree-function contract, the change journal, and the
//! per-session dependency-graph snapshot.

pub mod error;
pub mod function;
pub mod graph;
pub mod id;
pub mod logbook;
pub mod param;
pub mod progress;
pub mod store;
pub mod value;

// Re-export commonly used types
pub use error::CoreError;
pub use function::{
    DriverTable, ExecArgs, ExecOutcome, FunctionKind, Signature, SlotDirection, TreeFunction,
    ValidationIssue,
};
pub use graph::{BuildIssue, DepEdge, DependencyGraph, VertexData};
pub use id::{DriverId, NodeRef, VertexId};
pub use logbook::LogBook;
pub use param::{EvalInfo, Parameter};
pub use progress::Progress;
pub use store::{FunctionBinding, ModelStore};
pub use value::{ScalarValue, ValueKind};
