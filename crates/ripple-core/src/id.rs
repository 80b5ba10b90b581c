//! Stable identity types for the re-evaluation engine.
//!
//! [`NodeRef`] is the tree-shaped handle addressing a location in the host
//! object model: a path of `u32` tags from the document root. Equality and
//! hashing are by path identity, never by the value stored at the location.
//!
//! [`VertexId`] and [`DriverId`] are distinct newtype wrappers over `u32`,
//! providing type safety so a graph vertex cannot be accidentally used where
//! a driver registration is expected.

use std::fmt;

use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A stable handle to a location in the host object model.
///
/// The handle is a path of tags from the document root. Paths form a tree:
/// `0:3:1` is a child of `0:3`. The inline capacity covers the depths seen
/// in practice without heap allocation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeRef(SmallVec<[u32; 8]>);

impl NodeRef {
    /// Returns the document root handle.
    pub fn root() -> Self {
        NodeRef(SmallVec::new())
    }

    /// Returns the child handle under this node with the given tag.
    pub fn child(&self, tag: u32) -> Self {
        let mut path = self.0.clone();
        path.push(tag);
        NodeRef(path)
    }

    /// Returns the parent handle, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        let mut path = self.0.clone();
        path.pop();
        Some(NodeRef(path))
    }

    /// Returns the last path tag, or `None` for the root.
    pub fn tag(&self) -> Option<u32> {
        self.0.last().copied()
    }

    /// Returns the number of tags between this node and the root.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if this node is the document root.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if this node lies strictly below `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &NodeRef) -> bool {
        self.0.len() > ancestor.0.len() && self.0[..ancestor.0.len()] == ancestor.0[..]
    }

    /// Returns `true` if this node is `other` or lies below it.
    ///
    /// This is the subtree test used when a node is deleted and every
    /// reference under it must be dropped.
    pub fn is_within(&self, other: &NodeRef) -> bool {
        self == other || self.is_descendant_of(other)
    }
}

impl Default for NodeRef {
    fn default() -> Self {
        NodeRef::root()
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0")?;
        for tag in &self.0 {
            write!(f, ":{}", tag)?;
        }
        Ok(())
    }
}

/// Vertex identifier within one dependency-graph snapshot.
///
/// Maps to a petgraph `NodeIndex<u32>`. Only stable until the next rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VertexId(pub u32);

/// Identifier of a registered tree-function driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DriverId(pub u32);

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Bridge between VertexId and petgraph's NodeIndex<u32>.

impl From<NodeIndex<u32>> for VertexId {
    fn from(idx: NodeIndex<u32>) -> Self {
        VertexId(idx.index() as u32)
    }
}

impl From<VertexId> for NodeIndex<u32> {
    fn from(id: VertexId) -> Self {
        NodeIndex::new(id.0 as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_and_parent_roundtrip() {
        let root = NodeRef::root();
        let a = root.child(3);
        let b = a.child(1);

        assert_eq!(b.parent(), Some(a.clone()));
        assert_eq!(a.parent(), Some(root.clone()));
        assert_eq!(root.parent(), None);
        assert_eq!(b.tag(), Some(1));
        assert_eq!(b.depth(), 2);
    }

    #[test]
    fn descendant_test_is_strict() {
        let root = NodeRef::root();
        let a = root.child(1);
        let b = a.child(2);
        let sibling = root.child(2);

        assert!(b.is_descendant_of(&a));
        assert!(b.is_descendant_of(&root));
        assert!(!a.is_descendant_of(&a));
        assert!(!sibling.is_descendant_of(&a));
        assert!(a.is_within(&a));
        assert!(b.is_within(&a));
        assert!(!sibling.is_within(&a));
    }

    #[test]
    fn sibling_tags_do_not_prefix_match() {
        let root = NodeRef::root();
        let a = root.child(1);
        let b = root.child(12);

        // Tag 12 must not be treated as a descendant of tag 1.
        assert!(!b.is_descendant_of(&a));
    }

    #[test]
    fn display_formats_path() {
        let root = NodeRef::root();
        assert_eq!(format!("{}", root), "0");
        assert_eq!(format!("{}", root.child(3).child(1)), "0:3:1");
    }

    #[test]
    fn vertex_id_to_node_index_roundtrip() {
        let idx = NodeIndex::<u32>::new(42);
        let id = VertexId::from(idx);
        assert_eq!(id.0, 42);

        let back: NodeIndex<u32> = id.into();
        assert_eq!(back.index(), 42);
    }

    #[test]
    fn serde_roundtrip() {
        let node = NodeRef::root().child(7).child(0);
        let json = serde_json::to_string(&node).unwrap();
        let back: NodeRef = serde_json::from_str(&json).unwrap();
        assert_eq!(node, back);

        let driver = DriverId(5);
        let json = serde_json::to_string(&driver).unwrap();
        let back: DriverId = serde_json::from_str(&json).unwrap();
        assert_eq!(driver, back);
    }
}
