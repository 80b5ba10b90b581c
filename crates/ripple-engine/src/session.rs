//! One evaluation session: the dependency-ordered walk.
//!
//! The scheduler is Kahn's algorithm over the frozen snapshot with a ready
//! queue ordered by (driver priority, vertex id), so a consumer is never
//! visited before all of its producers completed or were explicitly
//! skipped. Each vertex runs the per-instance state machine:
//!
//! `NotVisited -> Validating -> {Invalid | Ready} -> {Skipped | Executing} ->
//! {Succeeded | Failed}`
//!
//! Light functions execute whenever an input is marked modified or forced.
//! Heavy functions additionally need a deploy authorization; without one
//! they only forward the stale marker to their results ("idle mode"), and
//! any vertex seeing a pending input forwards the marker instead of running
//! on known-stale data. Invalid and failed instances invalidate their
//! result parameters, which cascades failure through their own downstream
//! while unrelated subgraphs keep evaluating.

use std::any::Any;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use ripple_core::{
    CoreError, DependencyGraph, DriverId, DriverTable, ExecArgs, ExecOutcome, EvalInfo,
    FunctionKind, LogBook, NodeRef, Parameter, Progress, VertexId,
};
use ripple_core::store::ModelStore;

use crate::error::EngineError;

/// Session-level outcome handed back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Every considered instance validated and executed (or was skipped).
    Ok,
    /// At least one instance was invalid or failed; see the faulty list.
    HadInvalidFunctions,
    /// The snapshot is cyclic; nothing was executed.
    HadCycle,
}

/// Report of one evaluation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub status: SessionStatus,
    /// Anchor nodes of every invalid or failed instance, in visit order
    /// (cycle members for `HadCycle`).
    pub faulty: Vec<NodeRef>,
    pub executed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Set when cancellation interrupted the walk. The journal is kept
    /// (minus deploy authorizations) so the next session picks up where
    /// this one stopped.
    pub cancelled: bool,
}

/// Terminal evaluation state of one instance within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VertexState {
    Invalid,
    Skipped,
    Succeeded,
    Failed,
}

/// Ready-queue entry: higher priority first, then lower vertex id.
#[derive(PartialEq, Eq)]
struct Ready {
    priority: i32,
    vertex: VertexId,
}

impl Ord for Ready {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.vertex.cmp(&self.vertex))
    }
}

impl PartialOrd for Ready {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Drives one full session over the snapshot.
///
/// On a successful (non-cancelled) walk the journal is released: modified,
/// forced, and deploy marks never accumulate across sessions.
#[allow(clippy::too_many_arguments)]
pub(crate) fn run(
    drivers: &DriverTable,
    graph: &DependencyGraph,
    shared: &mut IndexMap<DriverId, Box<dyn Any>>,
    progress: &Progress,
    session: u64,
    store: &mut dyn ModelStore,
    logbook: &mut LogBook,
) -> Result<SessionReport, EngineError> {
    let cycles = graph.find_cycles();
    if !cycles.is_empty() {
        tracing::warn!(parameters = cycles.len(), "session refused: cyclic graph");
        return Ok(SessionReport {
            status: SessionStatus::HadCycle,
            faulty: cycles,
            executed: 0,
            skipped: 0,
            failed: 0,
            cancelled: false,
        });
    }

    let ids = graph.vertex_ids();
    let total = ids.len();
    tracing::debug!(vertices = total, edges = graph.edge_count(), "session start");

    let mut indegree: HashMap<VertexId, usize> = ids
        .iter()
        .map(|&v| (v, graph.producers(v).len()))
        .collect();

    let mut ready = BinaryHeap::new();
    for &vertex in &ids {
        if indegree[&vertex] == 0 {
            ready.push(Ready {
                priority: vertex_priority(graph, drivers, vertex)?,
                vertex,
            });
        }
    }

    let mut faulty = Vec::new();
    let mut executed = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;
    let mut cancelled = false;
    let mut processed = 0usize;

    while let Some(Ready { vertex, .. }) = ready.pop() {
        if progress.is_cancelled() {
            cancelled = true;
            break;
        }

        let next = evaluate_vertex(
            drivers, graph, shared, progress, session, store, logbook, vertex, &mut faulty,
        )?;
        match next {
            VertexState::Succeeded => executed += 1,
            VertexState::Skipped => skipped += 1,
            VertexState::Failed | VertexState::Invalid => failed += 1,
        }

        processed += 1;
        if total > 0 {
            progress.set_fraction(processed as f32 / total as f32);
        }

        for consumer in graph.consumers(vertex) {
            if let Some(remaining) = indegree.get_mut(&consumer) {
                *remaining -= 1;
                if *remaining == 0 {
                    ready.push(Ready {
                        priority: vertex_priority(graph, drivers, consumer)?,
                        vertex: consumer,
                    });
                }
            }
        }
    }

    if cancelled {
        tracing::info!(processed, total, "session cancelled");
        // Deploy authorizations are strictly session-scoped; everything
        // else stays marked so the next session resumes the work.
        logbook.release_heavy_deployment();
    } else {
        logbook.release_modified();
        logbook.release_forced();
        logbook.release_heavy_deployment();
        tracing::info!(executed, skipped, failed, "session complete");
    }

    Ok(SessionReport {
        status: if faulty.is_empty() {
            SessionStatus::Ok
        } else {
            SessionStatus::HadInvalidFunctions
        },
        faulty,
        executed,
        skipped,
        failed,
        cancelled,
    })
}

fn vertex_priority(
    graph: &DependencyGraph,
    drivers: &DriverTable,
    vertex: VertexId,
) -> Result<i32, EngineError> {
    let data = graph
        .data(vertex)
        .ok_or(CoreError::VertexNotFound { id: vertex })?;
    let driver = drivers
        .get(data.driver)
        .ok_or(CoreError::UnknownDriver { id: data.driver })?;
    Ok(driver.priority())
}

/// Runs the state machine for one vertex. Pushes the anchor onto `faulty`
/// for Invalid and Failed endpoints.
#[allow(clippy::too_many_arguments)]
fn evaluate_vertex(
    drivers: &DriverTable,
    graph: &DependencyGraph,
    shared: &mut IndexMap<DriverId, Box<dyn Any>>,
    progress: &Progress,
    session: u64,
    store: &mut dyn ModelStore,
    logbook: &mut LogBook,
    vertex: VertexId,
    faulty: &mut Vec<NodeRef>,
) -> Result<VertexState, EngineError> {
    let data = graph
        .data(vertex)
        .ok_or(CoreError::VertexNotFound { id: vertex })?;
    let driver = drivers
        .get(data.driver)
        .ok_or(CoreError::UnknownDriver { id: data.driver })?;
    let anchor = data.anchor.clone();

    // Validating: resolve the wired slots and check them against the
    // declared signature. A mismatch marks the instance invalid; the
    // session continues elsewhere.
    let inputs = match resolve(store, &data.binding.args) {
        Some(params) => params,
        None => {
            tracing::warn!(driver = driver.name(), anchor = %anchor, "dangling argument");
            faulty.push(anchor);
            invalidate_results(store, logbook, &data.binding.results)?;
            return Ok(VertexState::Invalid);
        }
    };
    let mut outputs = match resolve(store, &data.binding.results) {
        Some(params) => params,
        None => {
            tracing::warn!(driver = driver.name(), anchor = %anchor, "dangling result");
            faulty.push(anchor);
            invalidate_results(store, logbook, &data.binding.results)?;
            return Ok(VertexState::Invalid);
        }
    };

    let issues = driver.validate(&inputs, &outputs);
    if !issues.is_empty() {
        tracing::warn!(
            driver = driver.name(),
            anchor = %anchor,
            issues = issues.len(),
            "validation failed"
        );
        faulty.push(anchor);
        invalidate_results(store, logbook, &data.binding.results)?;
        return Ok(VertexState::Invalid);
    }

    // Ready: decide between skipping, idling, and executing.
    if inputs.iter().any(|p| p.pending) {
        // Stale inputs: forward the marker, never run on known-stale data.
        mark_results_pending(store, &mut outputs)?;
        return Ok(VertexState::Skipped);
    }

    let needs_run = logbook.is_forced(&anchor)
        || logbook.is_modified(&anchor)
        || data.binding.args.iter().any(|n| logbook.is_modified(n))
        || driver.must_execute_intact(&inputs);
    if !needs_run {
        return Ok(VertexState::Skipped);
    }

    if driver.kind() == FunctionKind::Heavy && !logbook.is_heavy_deployment(&anchor) {
        // Idle mode: the cost is deferred, only the stale marker advances.
        tracing::debug!(driver = driver.name(), anchor = %anchor, "heavy idle");
        mark_results_pending(store, &mut outputs)?;
        return Ok(VertexState::Skipped);
    }

    if driver.has_unrecoverable_parameters(&inputs) {
        tracing::warn!(driver = driver.name(), anchor = %anchor, "unrecoverable inputs");
        faulty.push(anchor);
        invalidate_results(store, logbook, &data.binding.results)?;
        return Ok(VertexState::Failed);
    }

    // Executing.
    let shared_data = shared.get_mut(&data.driver).map(|b| b.as_mut());
    let outcome = driver.execute(ExecArgs {
        inputs: &inputs,
        outputs: &mut outputs,
        shared: shared_data,
        progress,
    });

    match outcome {
        ExecOutcome::Succeeded => {
            for mut param in outputs {
                param.valid = true;
                param.pending = false;
                param.evaluation = Some(EvalInfo {
                    driver: driver.name().to_string(),
                    session,
                    outcome,
                });
                let node = param.node.clone();
                store.update_parameter(param)?;
                if !driver.no_propagation() {
                    logbook.impact(&node);
                }
            }
            Ok(VertexState::Succeeded)
        }
        ExecOutcome::Failed => {
            tracing::warn!(driver = driver.name(), anchor = %anchor, "execution failed");
            faulty.push(anchor);
            invalidate_results(store, logbook, &data.binding.results)?;
            Ok(VertexState::Failed)
        }
        ExecOutcome::Cancelled => {
            tracing::debug!(driver = driver.name(), anchor = %anchor, "execution cancelled");
            Ok(VertexState::Skipped)
        }
    }
}

fn resolve(store: &dyn ModelStore, nodes: &[NodeRef]) -> Option<Vec<Parameter>> {
    nodes.iter().map(|n| store.parameter(n)).collect()
}

/// Forwards the stale marker onto result slots.
fn mark_results_pending(
    store: &mut dyn ModelStore,
    outputs: &mut [Parameter],
) -> Result<(), EngineError> {
    for param in outputs.iter_mut() {
        if !param.pending {
            param.mark_pending();
            store.update_parameter(param.clone())?;
        }
    }
    Ok(())
}

/// Marks result slots invalid and impacted so the failure cascades through
/// this instance's downstream only.
fn invalidate_results(
    store: &mut dyn ModelStore,
    logbook: &mut LogBook,
    results: &[NodeRef],
) -> Result<(), EngineError> {
    for node in results {
        if let Some(mut param) = store.parameter(node) {
            param.invalidate();
            store.update_parameter(param)?;
            logbook.impact(node);
        }
    }
    Ok(())
}
