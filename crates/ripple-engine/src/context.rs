//! The per-session execution coordinator.
//!
//! [`ExecutionContext`] owns the cross-cutting state function instances
//! need but neither the graph nor the journal should carry: the progress
//! channel, per-driver shared user data, the transaction-scoped primitive
//! record, and the graph-frozen guard. One context per open document.
//!
//! The frozen guard exists because rebuilding the snapshot while a
//! traversal is in flight would invalidate the vertex ids the traversal is
//! actively using; freezing is a flag plus a generation counter, not a
//! lock -- the core is single-threaded.

use std::any::Any;
use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use ripple_core::store::ModelStore;
use ripple_core::{
    CoreError, DependencyGraph, DriverId, DriverTable, FunctionKind, LogBook, NodeRef, Progress,
    ScalarValue, VertexId,
};

use crate::error::EngineError;
use crate::session::{self, SessionReport};

/// Integrity verdict of [`ExecutionContext::check_dependency_graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraphStatus {
    /// Acyclic and fully resolved.
    Sound,
    /// At least one dependency cycle; the faulty list holds its members.
    Cyclic,
    /// Bindings were skipped during construction (unknown driver or
    /// missing anchor parameter).
    Unresolved,
}

/// Result of a heavy-deployment propagation pass.
#[derive(Debug, Clone, Default)]
pub struct DeployReport {
    /// Anchors that received a Forced + HeavyDeploy mark.
    pub deployed: Vec<NodeRef>,
    /// Vertices visited by the sweep.
    pub visited: usize,
}

/// Session coordinator: graph lifecycle, shared user data, propagation.
pub struct ExecutionContext {
    drivers: DriverTable,
    graph: Option<DependencyGraph>,
    generation: u64,
    frozen: bool,
    progress: Progress,
    shared: IndexMap<DriverId, Box<dyn Any>>,
    record: Vec<ScalarValue>,
    roots: IndexSet<NodeRef>,
    session: u64,
}

impl ExecutionContext {
    /// Creates a context over a registered driver table.
    pub fn new(drivers: DriverTable) -> Self {
        ExecutionContext {
            drivers,
            graph: None,
            generation: 0,
            frozen: false,
            progress: Progress::new(),
            shared: IndexMap::new(),
            record: Vec::new(),
            roots: IndexSet::new(),
            session: 0,
        }
    }

    pub fn drivers(&self) -> &DriverTable {
        &self.drivers
    }

    /// The progress/cancellation channel. Clone the handle to hand it to a
    /// UI or worker thread.
    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    // -------------------------------------------------------------------
    // Shared user data, keyed by driver kind
    // -------------------------------------------------------------------

    /// Installs shared data for a driver kind; handed to every instance of
    /// that kind at execution time.
    pub fn set_shared_data(&mut self, driver: DriverId, data: Box<dyn Any>) {
        self.shared.insert(driver, data);
    }

    pub fn shared_data<T: 'static>(&self, driver: DriverId) -> Option<&T> {
        self.shared.get(&driver)?.downcast_ref()
    }

    pub fn shared_data_mut<T: 'static>(&mut self, driver: DriverId) -> Option<&mut T> {
        self.shared.get_mut(&driver)?.downcast_mut()
    }

    // -------------------------------------------------------------------
    // Transaction-scoped primitive record
    // -------------------------------------------------------------------

    /// Appends a primitive value to the record of the current transaction.
    pub fn push_record(&mut self, value: ScalarValue) {
        self.record.push(value);
    }

    pub fn record(&self) -> &[ScalarValue] {
        &self.record
    }

    /// Drains the record, typically into a commit.
    pub fn take_record(&mut self) -> Vec<ScalarValue> {
        std::mem::take(&mut self.record)
    }

    // -------------------------------------------------------------------
    // Graph lifecycle
    // -------------------------------------------------------------------

    /// Marks the snapshot frozen: rebuild requests are refused until
    /// [`ExecutionContext::unfreeze_graph`].
    pub fn freeze_graph(&mut self) {
        self.frozen = true;
    }

    pub fn unfreeze_graph(&mut self) {
        self.frozen = false;
    }

    pub fn is_graph_frozen(&self) -> bool {
        self.frozen
    }

    /// Snapshot generation, bumped on every successful rebuild. Vertex ids
    /// are only comparable within one generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The current snapshot, if one was built.
    pub fn graph(&self) -> Option<&DependencyGraph> {
        self.graph.as_ref()
    }

    /// Rebuilds the dependency snapshot from the host model.
    pub fn update_dependencies(&mut self, store: &dyn ModelStore) -> Result<(), EngineError> {
        if self.frozen {
            return Err(EngineError::GraphFrozen);
        }
        let graph = DependencyGraph::build(store, &self.drivers);
        self.generation += 1;
        tracing::debug!(
            generation = self.generation,
            vertices = graph.vertex_count(),
            edges = graph.edge_count(),
            issues = graph.issues().len(),
            "dependencies updated"
        );
        self.graph = Some(graph);
        Ok(())
    }

    /// Integrity check: builds the snapshot if needed, then reports cycles
    /// and unresolved bindings together with the offending parameters.
    pub fn check_dependency_graph(
        &mut self,
        store: &dyn ModelStore,
    ) -> Result<(GraphStatus, Vec<NodeRef>), EngineError> {
        if self.graph.is_none() {
            self.update_dependencies(store)?;
        }
        let graph = self.graph.as_ref().ok_or(EngineError::GraphNotBuilt)?;

        let cycles = graph.find_cycles();
        if !cycles.is_empty() {
            return Ok((GraphStatus::Cyclic, cycles));
        }
        let unresolved: Vec<NodeRef> = graph
            .issues()
            .iter()
            .map(|issue| match issue {
                ripple_core::BuildIssue::UnknownDriver { node, .. } => node.clone(),
                ripple_core::BuildIssue::MissingAnchor { node } => node.clone(),
            })
            .collect();
        if !unresolved.is_empty() {
            return Ok((GraphStatus::Unresolved, unresolved));
        }
        Ok((GraphStatus::Sound, Vec::new()))
    }

    // -------------------------------------------------------------------
    // Forcing and heavy deployment
    // -------------------------------------------------------------------

    /// Marks a function instance Forced and records it as a propagation
    /// root for the next [`ExecutionContext::force_deploy_propagation`].
    pub fn force(&mut self, node: &NodeRef, logbook: &mut LogBook) {
        logbook.force(node);
        self.roots.insert(node.clone());
    }

    /// Directly authorizes a heavy instance to run this session.
    pub fn deploy(&mut self, node: &NodeRef, logbook: &mut LogBook) {
        logbook.heavy_deploy(node);
    }

    /// Sweeps forward from every recorded root, authorizing the heavy
    /// instances whose results are stale.
    ///
    /// At each heavy vertex: no pending result means it and its downstream
    /// are left alone (the stale-marker propagation already carries the
    /// "eventually run" signal); a pending result earns Forced +
    /// HeavyDeploy and the sweep descends. A vertex reached twice in one
    /// pass is not revisited. Cyclic graphs are refused up front.
    pub fn force_deploy_propagation(
        &mut self,
        store: &dyn ModelStore,
        logbook: &mut LogBook,
    ) -> Result<DeployReport, EngineError> {
        let cycles = self
            .graph
            .as_ref()
            .ok_or(EngineError::GraphNotBuilt)?
            .find_cycles();
        if !cycles.is_empty() {
            // The roots stay recorded; the pass can be retried once the
            // model is repaired.
            return Err(EngineError::CycleDetected { parameters: cycles });
        }

        let roots = std::mem::take(&mut self.roots);
        let graph = self.graph.as_ref().ok_or(EngineError::GraphNotBuilt)?;

        let mut stack: Vec<VertexId> = Vec::new();
        for root in &roots {
            logbook.force(root);
            if let Some(vertex) = graph.vertex_by_node(root) {
                stack.push(vertex);
            }
        }

        let mut visited: HashSet<VertexId> = HashSet::new();
        let mut report = DeployReport::default();

        while let Some(vertex) = stack.pop() {
            if !visited.insert(vertex) {
                continue;
            }
            report.visited += 1;

            let data = graph
                .data(vertex)
                .ok_or(CoreError::VertexNotFound { id: vertex })?;
            let driver = self
                .drivers
                .get(data.driver)
                .ok_or(CoreError::UnknownDriver { id: data.driver })?;

            if driver.kind() == FunctionKind::Heavy {
                let stale = data
                    .binding
                    .results
                    .iter()
                    .filter_map(|n| store.parameter(n))
                    .any(|p| p.pending);
                if !stale {
                    // Fresh results: nothing downstream needs this pass.
                    continue;
                }
                logbook.force(&data.anchor);
                logbook.heavy_deploy(&data.anchor);
                report.deployed.push(data.anchor.clone());
                tracing::debug!(driver = driver.name(), anchor = %data.anchor, "deployed");
            }

            stack.extend(graph.consumers(vertex));
        }

        Ok(report)
    }

    // -------------------------------------------------------------------
    // Session driving
    // -------------------------------------------------------------------

    /// Runs one evaluation session over the current snapshot. The snapshot
    /// is frozen for the duration of the walk.
    pub fn run_session(
        &mut self,
        store: &mut dyn ModelStore,
        logbook: &mut LogBook,
    ) -> Result<SessionReport, EngineError> {
        if self.frozen {
            return Err(EngineError::GraphFrozen);
        }
        let graph = self.graph.take().ok_or(EngineError::GraphNotBuilt)?;
        self.frozen = true;
        self.session += 1;

        let result = session::run(
            &self.drivers,
            &graph,
            &mut self.shared,
            &self.progress,
            self.session,
            store,
            logbook,
        );

        self.frozen = false;
        self.graph = Some(graph);
        result
    }

    /// Invokes a binding's auto-connect hook, letting the driver establish
    /// its own argument/result wiring at `node`.
    pub fn auto_connect(
        &self,
        node: &NodeRef,
        store: &mut dyn ModelStore,
    ) -> Result<(), EngineError> {
        let binding = store
            .function_at(node)
            .ok_or_else(|| CoreError::NodeNotFound { node: node.clone() })?;
        let driver = self
            .drivers
            .get(binding.driver)
            .ok_or(CoreError::UnknownDriver { id: binding.driver })?;
        driver.auto_connect(node, store)?;
        Ok(())
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("generation", &self.generation)
            .field("frozen", &self.frozen)
            .field("session", &self.session)
            .field("roots", &self.roots.len())
            .finish()
    }
}
