//! Host-model and document error types.

use thiserror::Error;

use ripple_core::CoreError;

/// Errors produced by the model/document layer.
#[derive(Debug, Error)]
pub enum ModelError {
    /// `open_command` while a command is already open. Programming error.
    #[error("a command is already open")]
    CommandAlreadyOpen,

    /// `commit_command`/`abort_command` without an open command.
    #[error("no command is open")]
    NoOpenCommand,

    /// Underlying data-model failure.
    #[error(transparent)]
    Core(#[from] CoreError),
}
