//! The dependency-graph snapshot.
//!
//! [`DependencyGraph`] materializes, once per execution session, a navigable
//! picture of every function instance in the host model and the
//! producer->consumer edges between them. The snapshot is a flat vertex
//! arena (petgraph `StableGraph` over `u32` indices) plus a node-identity
//! index for O(1) lookups; it is never mutated in place -- a new session
//! builds a new snapshot.
//!
//! Disconnected components are expected: this is a graph of function
//! *instances*, not function *types*, so unrelated chains coexist. Cycle
//! analysis is delegated to petgraph's strongly-connected-components pass
//! and surfaced through [`DependencyGraph::find_cycles`].

use std::collections::{HashMap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::stable_graph::StableGraph;
use petgraph::Directed;
use petgraph::Direction;

use crate::function::DriverTable;
use crate::id::{DriverId, NodeRef, VertexId};
use crate::store::{FunctionBinding, ModelStore};

/// One function instance: a registered driver anchored at a node.
#[derive(Debug, Clone)]
pub struct VertexData {
    /// The driver executing at this vertex.
    pub driver: DriverId,
    /// The node whose parameter hosts the binding.
    pub anchor: NodeRef,
    /// Argument/result wiring, as declared in the object model.
    pub binding: FunctionBinding,
}

/// A producer->consumer dependency. The edge remembers which parameter
/// mediates it: the producer writes `via`, the consumer reads it.
#[derive(Debug, Clone)]
pub struct DepEdge {
    pub via: NodeRef,
}

/// A binding that could not become a vertex.
///
/// Collected during construction instead of failing the build; a partial
/// model must never produce a dangling edge, so the binding is skipped
/// entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildIssue {
    /// The stored driver id has no registration in the table.
    UnknownDriver { node: NodeRef, driver: DriverId },
    /// The anchor node carries no parameter.
    MissingAnchor { node: NodeRef },
}

/// Per-session snapshot of function instances and their dependencies.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: StableGraph<VertexData, DepEdge, Directed, u32>,
    by_node: HashMap<NodeRef, VertexId>,
    issues: Vec<BuildIssue>,
}

impl DependencyGraph {
    /// Builds a snapshot by recursively walking the host label tree.
    ///
    /// Every resolvable function binding becomes a vertex; every parameter
    /// produced by one binding and consumed by another becomes an edge,
    /// deduplicated by (producer, consumer). Bindings that do not resolve
    /// are recorded in [`DependencyGraph::issues`] and skipped.
    pub fn build(store: &dyn ModelStore, drivers: &DriverTable) -> Self {
        let mut graph = StableGraph::<VertexData, DepEdge, Directed, u32>::default();
        let mut by_node = HashMap::new();
        let mut issues = Vec::new();

        // Vertex pass: depth-first walk of the label tree.
        let mut stack = vec![store.root()];
        while let Some(node) = stack.pop() {
            if let Some(binding) = store.function_at(&node) {
                if drivers.get(binding.driver).is_none() {
                    issues.push(BuildIssue::UnknownDriver {
                        node: node.clone(),
                        driver: binding.driver,
                    });
                } else if store.parameter(&node).is_none() {
                    issues.push(BuildIssue::MissingAnchor { node: node.clone() });
                } else {
                    let idx = graph.add_node(VertexData {
                        driver: binding.driver,
                        anchor: node.clone(),
                        binding,
                    });
                    by_node.insert(node.clone(), VertexId::from(idx));
                }
            }
            stack.extend(store.children(&node));
        }

        // Edge pass: index result parameters by producer, then connect
        // every consumer argument. Duplicate (producer, consumer) pairs
        // collapse to the first edge.
        let mut producer_of: HashMap<NodeRef, VertexId> = HashMap::new();
        for idx in graph.node_indices() {
            let vertex = VertexId::from(idx);
            for result in &graph[idx].binding.results {
                producer_of.insert(result.clone(), vertex);
            }
        }

        let mut seen: HashSet<(VertexId, VertexId)> = HashSet::new();
        let consumers: Vec<_> = graph.node_indices().collect();
        for idx in consumers {
            let consumer = VertexId::from(idx);
            let args = graph[idx].binding.args.clone();
            for arg in args {
                if let Some(&producer) = producer_of.get(&arg) {
                    if seen.insert((producer, consumer)) {
                        graph.add_edge(producer.into(), consumer.into(), DepEdge { via: arg });
                    }
                }
            }
        }

        DependencyGraph {
            graph,
            by_node,
            issues,
        }
    }

    // -------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------

    /// O(1) vertex lookup by anchor node identity.
    pub fn vertex_by_node(&self, node: &NodeRef) -> Option<VertexId> {
        self.by_node.get(node).copied()
    }

    /// Convenience overload resolving a parameter to its node.
    pub fn vertex_by_param(&self, param: &crate::param::Parameter) -> Option<VertexId> {
        self.vertex_by_node(&param.node)
    }

    /// The (driver, anchor, binding) record behind a vertex.
    pub fn data(&self, vertex: VertexId) -> Option<&VertexData> {
        self.graph.node_weight(vertex.into())
    }

    /// Vertices whose arguments this vertex's results feed.
    pub fn consumers(&self, vertex: VertexId) -> Vec<VertexId> {
        self.graph
            .neighbors_directed(vertex.into(), Direction::Outgoing)
            .map(VertexId::from)
            .collect()
    }

    /// Vertices whose results feed this vertex's arguments.
    pub fn producers(&self, vertex: VertexId) -> Vec<VertexId> {
        self.graph
            .neighbors_directed(vertex.into(), Direction::Incoming)
            .map(VertexId::from)
            .collect()
    }

    /// All vertex ids in the snapshot.
    pub fn vertex_ids(&self) -> Vec<VertexId> {
        self.graph.node_indices().map(VertexId::from).collect()
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Bindings skipped during construction.
    pub fn issues(&self) -> &[BuildIssue] {
        &self.issues
    }

    // -------------------------------------------------------------------
    // Integrity analysis
    // -------------------------------------------------------------------

    /// Returns the anchor nodes of every vertex participating in a cycle,
    /// including self-loops. Empty for a well-formed snapshot.
    ///
    /// Delegates the actual analysis to petgraph's strongly-connected
    /// components; this runs before propagation, which refuses cyclic
    /// graphs.
    pub fn find_cycles(&self) -> Vec<NodeRef> {
        let mut faulty = Vec::new();
        for component in tarjan_scc(&self.graph) {
            let cyclic = component.len() > 1
                || component
                    .first()
                    .map(|&idx| self.graph.find_edge(idx, idx).is_some())
                    .unwrap_or(false);
            if cyclic {
                for idx in component {
                    faulty.push(self.graph[idx].anchor.clone());
                }
            }
        }
        faulty.sort();
        faulty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use indexmap::IndexMap;

    use crate::error::CoreError;
    use crate::function::{
        ExecArgs, ExecOutcome, FunctionKind, Signature, TreeFunction,
    };
    use crate::param::Parameter;
    use crate::value::{ScalarValue, ValueKind};

    /// Minimal tree-backed store for graph construction tests.
    #[derive(Default)]
    struct TestStore {
        params: IndexMap<NodeRef, Parameter>,
        functions: IndexMap<NodeRef, FunctionBinding>,
        tick: u64,
    }

    impl TestStore {
        fn add_param(&mut self, node: &NodeRef) {
            self.params
                .insert(node.clone(), Parameter::with_value(node.clone(), "p", ScalarValue::Int(0)));
        }
    }

    impl ModelStore for TestStore {
        fn root(&self) -> NodeRef {
            NodeRef::root()
        }

        fn children(&self, node: &NodeRef) -> Vec<NodeRef> {
            let mut out: Vec<NodeRef> = self
                .params
                .keys()
                .chain(self.functions.keys())
                .filter(|n| n.parent().as_ref() == Some(node))
                .cloned()
                .collect();
            out.sort();
            out.dedup();
            out
        }

        fn function_at(&self, node: &NodeRef) -> Option<FunctionBinding> {
            self.functions.get(node).cloned()
        }

        fn parameter(&self, node: &NodeRef) -> Option<Parameter> {
            self.params.get(node).cloned()
        }

        fn update_parameter(&mut self, param: Parameter) -> Result<u64, CoreError> {
            self.tick += 1;
            let mut param = param;
            param.modified_at = self.tick;
            self.params.insert(param.node.clone(), param);
            Ok(self.tick)
        }

        fn bind_function(
            &mut self,
            node: &NodeRef,
            binding: FunctionBinding,
        ) -> Result<(), CoreError> {
            self.functions.insert(node.clone(), binding);
            Ok(())
        }
    }

    struct Noop;

    impl TreeFunction for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        fn kind(&self) -> FunctionKind {
            FunctionKind::Light
        }

        fn signature(&self) -> Signature {
            Signature::new(vec![ValueKind::Any], vec![ValueKind::Any])
        }

        fn execute(&self, _args: ExecArgs<'_>) -> ExecOutcome {
            ExecOutcome::Succeeded
        }
    }

    /// Builds a chain: f1 reads a, writes b; f2 reads b, writes c.
    fn chain_store(driver: DriverId, base: u32) -> (TestStore, NodeRef, NodeRef) {
        let mut store = TestStore::default();
        let root = NodeRef::root();
        let a = root.child(base);
        let b = root.child(base + 1);
        let c = root.child(base + 2);
        let f1 = root.child(base + 10);
        let f2 = root.child(base + 11);

        for n in [&a, &b, &c, &f1, &f2] {
            store.add_param(n);
        }
        store
            .bind_function(
                &f1,
                FunctionBinding::new(driver)
                    .with_args(vec![a])
                    .with_results(vec![b.clone()]),
            )
            .unwrap();
        store
            .bind_function(
                &f2,
                FunctionBinding::new(driver)
                    .with_args(vec![b])
                    .with_results(vec![c]),
            )
            .unwrap();
        (store, f1, f2)
    }

    fn table() -> (DriverTable, DriverId) {
        let mut table = DriverTable::new();
        let id = table.register(Arc::new(Noop)).unwrap();
        (table, id)
    }

    #[test]
    fn build_connects_producer_to_consumer() {
        let (table, driver) = table();
        let (store, f1, f2) = chain_store(driver, 1);

        let graph = DependencyGraph::build(&store, &table);
        assert_eq!(graph.vertex_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.issues().is_empty());

        let v1 = graph.vertex_by_node(&f1).unwrap();
        let v2 = graph.vertex_by_node(&f2).unwrap();
        assert_eq!(graph.consumers(v1), vec![v2]);
        assert_eq!(graph.producers(v2), vec![v1]);
        assert!(graph.consumers(v2).is_empty());
    }

    #[test]
    fn duplicate_edges_are_rejected() {
        let (table, driver) = table();
        let mut store = TestStore::default();
        let root = NodeRef::root();
        let a = root.child(1);
        let b = root.child(2);
        let f1 = root.child(10);
        let f2 = root.child(11);
        for n in [&a, &b, &f1, &f2] {
            store.add_param(n);
        }
        // f1 produces a and b; f2 consumes both: still one edge.
        store
            .bind_function(
                &f1,
                FunctionBinding::new(driver).with_results(vec![a.clone(), b.clone()]),
            )
            .unwrap();
        store
            .bind_function(&f2, FunctionBinding::new(driver).with_args(vec![a, b]))
            .unwrap();

        let graph = DependencyGraph::build(&store, &table);
        assert_eq!(graph.vertex_count(), 2);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn disconnected_chains_build_two_components() {
        let (table, driver) = table();
        let (mut store, f1, _) = chain_store(driver, 1);
        let (other, g1, g2) = chain_store(driver, 100);
        store.params.extend(other.params);
        store.functions.extend(other.functions);

        let graph = DependencyGraph::build(&store, &table);
        assert_eq!(graph.vertex_count(), 4);
        assert_eq!(graph.edge_count(), 2);

        // Both chains remain discoverable by label.
        let v1 = graph.vertex_by_node(&f1).unwrap();
        let w1 = graph.vertex_by_node(&g1).unwrap();
        let w2 = graph.vertex_by_node(&g2).unwrap();
        assert_eq!(graph.consumers(w1), vec![w2]);
        assert!(!graph.consumers(v1).contains(&w2));
    }

    #[test]
    fn unresolvable_driver_is_skipped_and_reported() {
        let (table, driver) = table();
        let (mut store, _, f2) = chain_store(driver, 1);
        // Corrupt f2's binding to an unregistered driver.
        let mut binding = store.functions.get(&f2).cloned().unwrap();
        binding.driver = DriverId(99);
        store.functions.insert(f2.clone(), binding);

        let graph = DependencyGraph::build(&store, &table);
        assert_eq!(graph.vertex_count(), 1);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(
            graph.issues(),
            &[BuildIssue::UnknownDriver {
                node: f2,
                driver: DriverId(99),
            }]
        );
    }

    #[test]
    fn missing_anchor_parameter_is_reported() {
        let (table, driver) = table();
        let mut store = TestStore::default();
        let f = NodeRef::root().child(10);
        store.bind_function(&f, FunctionBinding::new(driver)).unwrap();

        let graph = DependencyGraph::build(&store, &table);
        assert_eq!(graph.vertex_count(), 0);
        assert_eq!(graph.issues(), &[BuildIssue::MissingAnchor { node: f }]);
    }

    #[test]
    fn find_cycles_reports_two_vertex_loop() {
        let (table, driver) = table();
        let mut store = TestStore::default();
        let root = NodeRef::root();
        let a = root.child(1);
        let b = root.child(2);
        let f1 = root.child(10);
        let f2 = root.child(11);
        for n in [&a, &b, &f1, &f2] {
            store.add_param(n);
        }
        // f1: a -> b, f2: b -> a.
        store
            .bind_function(
                &f1,
                FunctionBinding::new(driver)
                    .with_args(vec![a.clone()])
                    .with_results(vec![b.clone()]),
            )
            .unwrap();
        store
            .bind_function(
                &f2,
                FunctionBinding::new(driver)
                    .with_args(vec![b])
                    .with_results(vec![a]),
            )
            .unwrap();

        let graph = DependencyGraph::build(&store, &table);
        let mut expected = vec![f1, f2];
        expected.sort();
        assert_eq!(graph.find_cycles(), expected);
    }

    #[test]
    fn find_cycles_reports_self_loop() {
        let (table, driver) = table();
        let mut store = TestStore::default();
        let a = NodeRef::root().child(1);
        let f = NodeRef::root().child(10);
        store.add_param(&a);
        store.add_param(&f);
        // f consumes and produces the same parameter.
        store
            .bind_function(
                &f,
                FunctionBinding::new(driver)
                    .with_args(vec![a.clone()])
                    .with_results(vec![a]),
            )
            .unwrap();

        let graph = DependencyGraph::build(&store, &table);
        assert_eq!(graph.find_cycles(), vec![f]);
    }

    #[test]
    fn acyclic_graph_has_no_cycles() {
        let (table, driver) = table();
        let (store, _, _) = chain_store(driver, 1);
        let graph = DependencyGraph::build(&store, &table);
        assert!(graph.find_cycles().is_empty());
    }
}
