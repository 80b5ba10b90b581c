//! The change journal: the single source of truth for "what changed" and
//! "what must run regardless".
//!
//! [`LogBook`] tracks four disjoint-purpose mark sets over node identities:
//! touched (direct user modification), impacted (modification caused by an
//! upstream function's result write), forced (execute even if inputs are
//! unchanged), and heavy-deploy (a deferred-cost function is authorized to
//! actually run this session). Membership is a set, not a counter: marking
//! twice is the same as marking once.
//!
//! No execution logic lives here. Queries on absent entries return `false`.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::id::NodeRef;
use crate::param::Parameter;

/// Append/query store of modification marks, scoped to one document root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogBook {
    root: NodeRef,
    touched: IndexSet<NodeRef>,
    impacted: IndexSet<NodeRef>,
    forced: IndexSet<NodeRef>,
    heavy_deploy: IndexSet<NodeRef>,
}

impl LogBook {
    /// Creates an empty journal over a document root.
    pub fn new(root: NodeRef) -> Self {
        LogBook {
            root,
            touched: IndexSet::new(),
            impacted: IndexSet::new(),
            forced: IndexSet::new(),
            heavy_deploy: IndexSet::new(),
        }
    }

    /// The root identity this journal was constructed over.
    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    // -------------------------------------------------------------------
    // Touched: direct user-level modification
    // -------------------------------------------------------------------

    pub fn touch(&mut self, node: &NodeRef) {
        self.touched.insert(node.clone());
    }

    pub fn touch_param(&mut self, param: &Parameter) {
        self.touch(&param.node);
    }

    pub fn is_touched(&self, node: &NodeRef) -> bool {
        self.touched.contains(node)
    }

    // -------------------------------------------------------------------
    // Impacted: modification caused by an upstream result write
    // -------------------------------------------------------------------

    pub fn impact(&mut self, node: &NodeRef) {
        self.impacted.insert(node.clone());
    }

    pub fn impact_param(&mut self, param: &Parameter) {
        self.impact(&param.node);
    }

    pub fn is_impacted(&self, node: &NodeRef) -> bool {
        self.impacted.contains(node)
    }

    /// Touched or impacted.
    pub fn is_modified(&self, node: &NodeRef) -> bool {
        self.is_touched(node) || self.is_impacted(node)
    }

    // -------------------------------------------------------------------
    // Forced: execute even if inputs are unchanged
    // -------------------------------------------------------------------

    pub fn force(&mut self, node: &NodeRef) {
        self.forced.insert(node.clone());
    }

    pub fn force_param(&mut self, param: &Parameter) {
        self.force(&param.node);
    }

    pub fn is_forced(&self, node: &NodeRef) -> bool {
        self.forced.contains(node)
    }

    // -------------------------------------------------------------------
    // HeavyDeploy: session-scoped authorization to actually run
    // -------------------------------------------------------------------

    pub fn heavy_deploy(&mut self, node: &NodeRef) {
        self.heavy_deploy.insert(node.clone());
    }

    pub fn heavy_deploy_param(&mut self, param: &Parameter) {
        self.heavy_deploy(&param.node);
    }

    pub fn is_heavy_deployment(&self, node: &NodeRef) -> bool {
        self.heavy_deploy.contains(node)
    }

    // -------------------------------------------------------------------
    // Bulk release, called once per completed session
    // -------------------------------------------------------------------

    /// Clears both modification categories.
    pub fn release_modified(&mut self) {
        self.touched.clear();
        self.impacted.clear();
    }

    pub fn release_forced(&mut self) {
        self.forced.clear();
    }

    /// Deploy authorizations must never survive a session; uncontrolled
    /// re-triggering would follow.
    pub fn release_heavy_deployment(&mut self) {
        self.heavy_deploy.clear();
    }

    // -------------------------------------------------------------------
    // Node-deletion cleanup
    // -------------------------------------------------------------------

    /// Removes `node` and its entire subtree from all four categories.
    /// Required when a node is deleted, so no dangling references remain.
    pub fn clear_references_for(&mut self, node: &NodeRef) {
        self.touched.retain(|n| !n.is_within(node));
        self.impacted.retain(|n| !n.is_within(node));
        self.forced.retain(|n| !n.is_within(node));
        self.heavy_deploy.retain(|n| !n.is_within(node));
    }

    // -------------------------------------------------------------------
    // Read-only iteration
    // -------------------------------------------------------------------

    pub fn touched(&self) -> impl Iterator<Item = &NodeRef> {
        self.touched.iter()
    }

    pub fn impacted(&self) -> impl Iterator<Item = &NodeRef> {
        self.impacted.iter()
    }

    pub fn forced(&self) -> impl Iterator<Item = &NodeRef> {
        self.forced.iter()
    }

    pub fn heavy_deployments(&self) -> impl Iterator<Item = &NodeRef> {
        self.heavy_deploy.iter()
    }

    /// `true` when every category is empty.
    pub fn is_empty(&self) -> bool {
        self.touched.is_empty()
            && self.impacted.is_empty()
            && self.forced.is_empty()
            && self.heavy_deploy.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> LogBook {
        LogBook::new(NodeRef::root())
    }

    #[test]
    fn touch_is_idempotent() {
        let mut book = book();
        let n = NodeRef::root().child(1);

        book.touch(&n);
        book.touch(&n);
        assert!(book.is_touched(&n));
        assert_eq!(book.touched().count(), 1);

        book.release_modified();
        assert!(!book.is_touched(&n));
    }

    #[test]
    fn modified_is_touched_or_impacted() {
        let mut book = book();
        let touched = NodeRef::root().child(1);
        let impacted = NodeRef::root().child(2);
        let untouched = NodeRef::root().child(3);

        book.touch(&touched);
        book.impact(&impacted);

        assert!(book.is_modified(&touched));
        assert!(book.is_modified(&impacted));
        assert!(!book.is_modified(&untouched));
        assert!(!book.is_touched(&impacted));
        assert!(!book.is_impacted(&touched));
    }

    #[test]
    fn release_clears_only_its_category() {
        let mut book = book();
        let n = NodeRef::root().child(1);

        book.touch(&n);
        book.force(&n);
        book.heavy_deploy(&n);

        book.release_forced();
        assert!(!book.is_forced(&n));
        assert!(book.is_touched(&n));
        assert!(book.is_heavy_deployment(&n));

        book.release_heavy_deployment();
        assert!(!book.is_heavy_deployment(&n));
        assert!(book.is_touched(&n));

        book.release_modified();
        assert!(book.is_empty());
    }

    #[test]
    fn queries_on_absent_entries_are_false() {
        let book = book();
        let n = NodeRef::root().child(9);
        assert!(!book.is_touched(&n));
        assert!(!book.is_impacted(&n));
        assert!(!book.is_modified(&n));
        assert!(!book.is_forced(&n));
        assert!(!book.is_heavy_deployment(&n));
    }

    #[test]
    fn clear_references_drops_whole_subtree() {
        let mut book = book();
        let doomed = NodeRef::root().child(1);
        let child = doomed.child(4);
        let grandchild = child.child(2);
        let survivor = NodeRef::root().child(2);

        book.touch(&doomed);
        book.impact(&child);
        book.force(&grandchild);
        book.heavy_deploy(&grandchild);
        book.touch(&survivor);

        book.clear_references_for(&doomed);

        for n in [&doomed, &child, &grandchild] {
            assert!(!book.is_touched(n));
            assert!(!book.is_impacted(n));
            assert!(!book.is_forced(n));
            assert!(!book.is_heavy_deployment(n));
        }
        assert!(book.is_touched(&survivor));
    }

    #[test]
    fn parameter_overloads_resolve_to_node() {
        let mut book = book();
        let param = Parameter::new(NodeRef::root().child(5), "width");

        book.touch_param(&param);
        book.force_param(&param);
        assert!(book.is_touched(&param.node));
        assert!(book.is_forced(&param.node));
    }

    #[test]
    fn serde_roundtrip() {
        let mut book = book();
        book.touch(&NodeRef::root().child(1));
        book.heavy_deploy(&NodeRef::root().child(2));

        let json = serde_json::to_string(&book).unwrap();
        let back: LogBook = serde_json::from_str(&json).unwrap();
        assert!(back.is_touched(&NodeRef::root().child(1)));
        assert!(back.is_heavy_deployment(&NodeRef::root().child(2)));
    }
}
