//! Property tests for the change journal's set semantics.

use proptest::prelude::*;

use ripple_core::{LogBook, NodeRef};

fn node_strategy() -> impl Strategy<Value = NodeRef> {
    prop::collection::vec(0u32..4, 0..4)
        .prop_map(|tags| tags.into_iter().fold(NodeRef::root(), |n, t| n.child(t)))
}

#[derive(Debug, Clone)]
enum Op {
    Touch(NodeRef),
    Impact(NodeRef),
    Force(NodeRef),
    Deploy(NodeRef),
}

impl Op {
    fn apply(&self, book: &mut LogBook) {
        match self {
            Op::Touch(n) => book.touch(n),
            Op::Impact(n) => book.impact(n),
            Op::Force(n) => book.force(n),
            Op::Deploy(n) => book.heavy_deploy(n),
        }
    }

    fn node(&self) -> &NodeRef {
        match self {
            Op::Touch(n) | Op::Impact(n) | Op::Force(n) | Op::Deploy(n) => n,
        }
    }
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        node_strategy().prop_map(Op::Touch),
        node_strategy().prop_map(Op::Impact),
        node_strategy().prop_map(Op::Force),
        node_strategy().prop_map(Op::Deploy),
    ]
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op_strategy(), 0..32)
}

proptest! {
    /// Applying every mark twice is observationally identical to once.
    #[test]
    fn marks_are_idempotent(ops in ops_strategy()) {
        let mut once = LogBook::new(NodeRef::root());
        let mut twice = LogBook::new(NodeRef::root());
        for op in &ops {
            op.apply(&mut once);
            op.apply(&mut twice);
            op.apply(&mut twice);
        }

        for op in &ops {
            let n = op.node();
            prop_assert_eq!(once.is_touched(n), twice.is_touched(n));
            prop_assert_eq!(once.is_impacted(n), twice.is_impacted(n));
            prop_assert_eq!(once.is_forced(n), twice.is_forced(n));
            prop_assert_eq!(once.is_heavy_deployment(n), twice.is_heavy_deployment(n));
        }
        prop_assert_eq!(once.touched().count(), twice.touched().count());
        prop_assert_eq!(once.impacted().count(), twice.impacted().count());
        prop_assert_eq!(once.forced().count(), twice.forced().count());
        prop_assert_eq!(once.heavy_deployments().count(), twice.heavy_deployments().count());
    }

    /// After the three release calls, every query answers false.
    #[test]
    fn releases_empty_the_journal(ops in ops_strategy()) {
        let mut book = LogBook::new(NodeRef::root());
        for op in &ops {
            op.apply(&mut book);
        }

        book.release_modified();
        book.release_forced();
        book.release_heavy_deployment();

        prop_assert!(book.is_empty());
        for op in &ops {
            let n = op.node();
            prop_assert!(!book.is_modified(n));
            prop_assert!(!book.is_forced(n));
            prop_assert!(!book.is_heavy_deployment(n));
        }
    }

    /// Subtree clearing removes exactly the nodes at or below the target.
    #[test]
    fn clear_references_is_exact(ops in ops_strategy(), target in node_strategy()) {
        let mut book = LogBook::new(NodeRef::root());
        let mut reference = LogBook::new(NodeRef::root());
        for op in &ops {
            op.apply(&mut book);
            op.apply(&mut reference);
        }

        book.clear_references_for(&target);

        for op in &ops {
            let n = op.node();
            if n.is_within(&target) {
                prop_assert!(!book.is_modified(n));
                prop_assert!(!book.is_forced(n));
                prop_assert!(!book.is_heavy_deployment(n));
            } else {
                prop_assert_eq!(book.is_touched(n), reference.is_touched(n));
                prop_assert_eq!(book.is_impacted(n), reference.is_impacted(n));
                prop_assert_eq!(book.is_forced(n), reference.is_forced(n));
                prop_assert_eq!(
                    book.is_heavy_deployment(n),
                    reference.is_heavy_deployment(n)
                );
            }
        }
    }
}
