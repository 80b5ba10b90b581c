//! Engine configuration.

/// Tunables shared by the execution context and the transaction engine.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Maximum undo stack depth handed to the document. `0` = unbounded.
    pub undo_limit: usize,
    /// Global transaction switch. When off, every transaction-engine
    /// operation is a configuration error.
    pub transactions_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            undo_limit: 100,
            transactions_enabled: true,
        }
    }
}
