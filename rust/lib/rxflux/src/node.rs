use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::payload::Payload;

/// A nested state tree.
///
/// Inner nodes are `Composite` maps of named children; everything else is
/// a `Leaf`. Children are shared behind an `Arc`, so cloning a tree and
/// replacing one branch (see [`Node::with_child`]) leaves every other
/// branch pointer-equal to the original.
///
/// Equality is structural over composites and by allocation over leaves.
#[derive(Clone, PartialEq, Eq)]
pub enum Node {
    Composite(Arc<BTreeMap<String, Node>>),
    Leaf(Payload),
}

impl Node {
    /// Create a leaf holding `value`.
    pub fn leaf<T: Any + Send + Sync>(value: T) -> Self {
        Node::Leaf(Payload::new(value))
    }

    /// Create a composite from `(name, child)` pairs.
    pub fn composite<K, I>(children: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Node)>,
    {
        Node::Composite(Arc::new(
            children.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// A composite with no children.
    pub fn empty() -> Self {
        Node::Composite(Arc::new(BTreeMap::new()))
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    /// Named child of a composite. `None` for leaves.
    pub fn child(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Composite(children) => children.get(key),
            Node::Leaf(_) => None,
        }
    }

    pub fn as_leaf(&self) -> Option<&Payload> {
        match self {
            Node::Leaf(payload) => Some(payload),
            Node::Composite(_) => None,
        }
    }

    /// Downcast a leaf's value. `None` for composites or a type mismatch.
    pub fn value<T: Any>(&self) -> Option<&T> {
        self.as_leaf().and_then(|p| p.downcast_ref::<T>())
    }

    /// Child names of a composite, in order. Empty for leaves.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Node::Composite(children) => children.keys().map(String::as_str).collect(),
            Node::Leaf(_) => Vec::new(),
        }
    }

    /// Returns a copy of this node with `key` set to `child`.
    ///
    /// A leaf is replaced by a composite holding only `child`.
    pub fn with_child(&self, key: impl Into<String>, child: Node) -> Node {
        let mut children = match self {
            Node::Composite(children) => (**children).clone(),
            Node::Leaf(_) => BTreeMap::new(),
        };
        children.insert(key.into(), child);
        Node::Composite(Arc::new(children))
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Composite(children) => f.debug_map().entries(children.iter()).finish(),
            Node::Leaf(payload) => fmt::Debug::fmt(payload, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Node {
        Node::composite([
            ("a", Node::composite([("c", Node::leaf(1i32))])),
            ("title", Node::leaf("todo".to_string())),
        ])
    }

    #[test]
    fn child_and_value() {
        let root = sample();
        let a = root.child("a").unwrap();
        assert!(!a.is_leaf());
        assert_eq!(a.child("c").unwrap().value::<i32>(), Some(&1));
        assert_eq!(root.child("title").unwrap().value::<String>(), Some(&"todo".to_string()));
        assert!(root.child("missing").is_none());
    }

    #[test]
    fn leaf_has_no_children() {
        let leaf = Node::leaf(3u8);
        assert!(leaf.child("anything").is_none());
        assert!(leaf.keys().is_empty());
    }

    #[test]
    fn keys_are_ordered() {
        assert_eq!(sample().keys(), vec!["a", "title"]);
    }

    #[test]
    fn with_child_keeps_siblings_shared() {
        let root = sample();
        let next = root.with_child("title", Node::leaf("done".to_string()));

        assert_ne!(root, next);
        // The untouched branch is the very same allocation.
        match (root.child("a").unwrap(), next.child("a").unwrap()) {
            (Node::Composite(before), Node::Composite(after)) => {
                assert!(Arc::ptr_eq(before, after))
            }
            _ => panic!("expected composites"),
        }
    }

    #[test]
    fn equality_is_by_leaf_identity() {
        let shared = Node::leaf(1i32);
        let a = Node::composite([("x", shared.clone())]);
        let b = Node::composite([("x", shared)]);
        let c = Node::composite([("x", Node::leaf(1i32))]);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn debug_renders_tree() {
        assert_eq!(format!("{:?}", sample()), r#"{"a": {"c": 1}, "title": "todo"}"#);
    }
}
