//! The transaction engine: command discipline plus journal repair after
//! time travel.
//!
//! Undo and redo restore prior parameter storage without going through the
//! setter path that would normally mark nodes touched, so a following
//! session would see nothing to do. [`TransactionEngine::undo`] therefore
//! inspects the about-to-be-applied delta lists *before* the rollback,
//! collects the affected parameter set as a plain value, performs the
//! rollback, and then re-marks every member that still resolves in the
//! model. Members that no longer resolve -- their node was itself part of
//! the undone creation -- are skipped, not errored.

use indexmap::IndexSet;

use ripple_core::store::ModelStore;
use ripple_core::{LogBook, NodeRef, ScalarValue};
use ripple_model::traits::{CommitId, Document};

use crate::config::EngineConfig;
use crate::error::EngineError;

/// Gate for all mutation: open/commit/abort commands and depth-limited
/// undo/redo over a [`Document`].
///
/// At most one command is open at a time; violating that is a programming
/// error surfaced immediately. Operating without a document, or while
/// transactions are globally disabled, is a configuration error.
pub struct TransactionEngine<D: Document> {
    doc: Option<D>,
    config: EngineConfig,
}

impl<D: Document> TransactionEngine<D> {
    /// Wraps a document, applying the configured undo depth limit.
    pub fn new(mut doc: D, config: EngineConfig) -> Self {
        doc.set_undo_limit(config.undo_limit);
        TransactionEngine {
            doc: Some(doc),
            config,
        }
    }

    /// Creates an engine with no document attached. Every operation fails
    /// until [`TransactionEngine::attach`].
    pub fn detached(config: EngineConfig) -> Self {
        TransactionEngine { doc: None, config }
    }

    /// Attaches (or replaces) the document.
    pub fn attach(&mut self, mut doc: D) {
        doc.set_undo_limit(self.config.undo_limit);
        self.doc = Some(doc);
    }

    pub fn document(&self) -> Option<&D> {
        self.doc.as_ref()
    }

    pub fn document_mut(&mut self) -> Option<&mut D> {
        self.doc.as_mut()
    }

    /// Unwraps the document.
    pub fn into_document(self) -> Option<D> {
        self.doc
    }

    fn doc_mut(&mut self) -> Result<&mut D, EngineError> {
        if !self.config.transactions_enabled {
            return Err(EngineError::TransactionsDisabled);
        }
        self.doc.as_mut().ok_or(EngineError::NoDocument)
    }

    // -------------------------------------------------------------------
    // Command lifecycle
    // -------------------------------------------------------------------

    pub fn open_command(&mut self) -> Result<(), EngineError> {
        let doc = self.doc_mut()?;
        doc.open_command()?;
        tracing::debug!("command opened");
        Ok(())
    }

    /// Commits the open command, attaching the transaction-scoped
    /// primitive-value record.
    pub fn commit_command(&mut self, record: Vec<ScalarValue>) -> Result<CommitId, EngineError> {
        let doc = self.doc_mut()?;
        let id = doc.commit_command(record)?;
        tracing::debug!(commit = id.0, "command committed");
        Ok(id)
    }

    pub fn abort_command(&mut self) -> Result<(), EngineError> {
        let doc = self.doc_mut()?;
        doc.abort_command()?;
        tracing::debug!("command aborted");
        Ok(())
    }

    pub fn has_open_command(&self) -> bool {
        self.doc.as_ref().map(|d| d.has_open_command()).unwrap_or(false)
    }

    pub fn undo_count(&self) -> usize {
        self.doc.as_ref().map(|d| d.undo_count()).unwrap_or(0)
    }

    pub fn redo_count(&self) -> usize {
        self.doc.as_ref().map(|d| d.redo_count()).unwrap_or(0)
    }

    // -------------------------------------------------------------------
    // Time travel with journal repair
    // -------------------------------------------------------------------

    /// Rolls back up to `count` commits and re-marks the affected
    /// parameters as modified. Returns the number of commits undone.
    pub fn undo(&mut self, count: usize, logbook: &mut LogBook) -> Result<usize, EngineError> {
        let doc = self.doc_mut()?;

        // Collect the affected set before the storage changes underneath.
        let affected: IndexSet<NodeRef> =
            doc.undo_deltas(count).into_iter().map(|d| d.node).collect();

        let undone = doc.undo(count)?;
        retouch(doc, logbook, &affected);
        tracing::info!(undone, affected = affected.len(), "undo applied");
        Ok(undone)
    }

    /// Re-applies up to `count` undone commits and re-marks the affected
    /// parameters as modified. Returns the number of commits redone.
    pub fn redo(&mut self, count: usize, logbook: &mut LogBook) -> Result<usize, EngineError> {
        let doc = self.doc_mut()?;

        let affected: IndexSet<NodeRef> =
            doc.redo_deltas(count).into_iter().map(|d| d.node).collect();

        let redone = doc.redo(count)?;
        retouch(doc, logbook, &affected);
        tracing::info!(redone, affected = affected.len(), "redo applied");
        Ok(redone)
    }
}

/// Marks every still-resolving member of `affected` as directly modified.
/// Nodes whose parameter vanished with the time travel are skipped.
fn retouch<D: Document>(doc: &D, logbook: &mut LogBook, affected: &IndexSet<NodeRef>) {
    for node in affected {
        if doc.parameter(node).is_some() {
            logbook.touch(node);
        }
    }
}

impl<D: Document> std::fmt::Debug for TransactionEngine<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionEngine")
            .field("attached", &self.doc.is_some())
            .field("open", &self.has_open_command())
            .field("undos", &self.undo_count())
            .field("redos", &self.redo_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ripple_core::store::ModelStore;
    use ripple_core::Parameter;
    use ripple_model::{InMemoryModel, MemoryDocument};

    fn engine_with_param(value: i64) -> (TransactionEngine<MemoryDocument>, NodeRef) {
        let mut model = InMemoryModel::new();
        let node = NodeRef::root().child(1);
        model.insert_parameter(Parameter::with_value(
            node.clone(),
            "p",
            ScalarValue::Int(value),
        ));
        (
            TransactionEngine::new(MemoryDocument::new(model), EngineConfig::default()),
            node,
        )
    }

    fn commit_value(engine: &mut TransactionEngine<MemoryDocument>, node: &NodeRef, value: i64) {
        engine.open_command().unwrap();
        let doc = engine.document_mut().unwrap();
        let mut p = doc.parameter(node).unwrap();
        p.set_value(ScalarValue::Int(value));
        doc.update_parameter(p).unwrap();
        engine.commit_command(Vec::new()).unwrap();
    }

    #[test]
    fn disabled_transactions_are_a_configuration_error() {
        let mut model = InMemoryModel::new();
        model.insert_parameter(Parameter::new(NodeRef::root().child(1), "p"));
        let mut engine = TransactionEngine::new(
            MemoryDocument::new(model),
            EngineConfig {
                transactions_enabled: false,
                ..EngineConfig::default()
            },
        );
        assert!(matches!(
            engine.open_command(),
            Err(EngineError::TransactionsDisabled)
        ));
    }

    #[test]
    fn detached_engine_is_a_configuration_error() {
        let mut engine: TransactionEngine<MemoryDocument> =
            TransactionEngine::detached(EngineConfig::default());
        assert!(matches!(
            engine.open_command(),
            Err(EngineError::NoDocument)
        ));
        assert!(!engine.has_open_command());
        assert_eq!(engine.undo_count(), 0);
    }

    #[test]
    fn undo_restores_value_and_retouches() {
        let (mut engine, node) = engine_with_param(0);
        let mut logbook = LogBook::new(NodeRef::root());

        commit_value(&mut engine, &node, 5);
        commit_value(&mut engine, &node, 10);
        assert_eq!(engine.undo_count(), 2);

        assert_eq!(engine.undo(1, &mut logbook).unwrap(), 1);
        let doc = engine.document().unwrap();
        assert_eq!(
            doc.parameter(&node).unwrap().value,
            Some(ScalarValue::Int(5))
        );
        // The rollback bypassed the setters; the journal was repaired by
        // the engine itself.
        assert!(logbook.is_touched(&node));
        assert!(logbook.is_modified(&node));
    }

    #[test]
    fn redo_retouches_too() {
        let (mut engine, node) = engine_with_param(0);
        let mut logbook = LogBook::new(NodeRef::root());

        commit_value(&mut engine, &node, 5);
        engine.undo(1, &mut logbook).unwrap();
        logbook.release_modified();

        assert_eq!(engine.redo(1, &mut logbook).unwrap(), 1);
        assert_eq!(
            engine
                .document()
                .unwrap()
                .parameter(&node)
                .unwrap()
                .value,
            Some(ScalarValue::Int(5))
        );
        assert!(logbook.is_touched(&node));
    }

    #[test]
    fn vanished_parameters_are_skipped_not_errored() {
        let mut model = InMemoryModel::new();
        let existing = NodeRef::root().child(1);
        model.insert_parameter(Parameter::with_value(
            existing.clone(),
            "p",
            ScalarValue::Int(1),
        ));
        let mut engine =
            TransactionEngine::new(MemoryDocument::new(model), EngineConfig::default());
        let mut logbook = LogBook::new(NodeRef::root());

        // One commit creates a fresh parameter; undoing removes it again.
        let created = NodeRef::root().child(2);
        engine.open_command().unwrap();
        engine
            .document_mut()
            .unwrap()
            .update_parameter(Parameter::with_value(
                created.clone(),
                "q",
                ScalarValue::Int(7),
            ))
            .unwrap();
        engine.commit_command(Vec::new()).unwrap();

        assert_eq!(engine.undo(1, &mut logbook).unwrap(), 1);
        assert!(engine.document().unwrap().parameter(&created).is_none());
        // The vanished node is not re-touched and nothing errored.
        assert!(!logbook.is_touched(&created));
    }

    #[test]
    fn double_open_surfaces_as_error() {
        let (mut engine, _) = engine_with_param(0);
        engine.open_command().unwrap();
        assert!(engine.open_command().is_err());
        engine.abort_command().unwrap();
        assert!(!engine.has_open_command());
    }
}
