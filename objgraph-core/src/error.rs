//! Errors raised by the graph engines.

use derive_more::Display;
use thiserror::Error;

use crate::core::{Index, Key, Path, display_path};
use crate::registry::NodeError;

/// How a node of an update graph is being merged into the target graph.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum NodeStatus {
    /// Attached as a brand-new subtree.
    #[display("new")]
    New,
    /// Merged into an existing node.
    #[display("updated")]
    Updated,
}

/// Errors raised while flattening, rebuilding or updating a graph.
///
/// Every error aborts the whole call. The in-place operations (pop and the
/// updates) may have mutated part of the graph before failing.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum GraphError {
    /// A value is neither a leaf, a registered node, a tree nor a static value.
    #[error("Unsupported value at path '{}': {found}", display_path(.path))]
    Unsupported {
        /// Where the value was found.
        path: Path,
        /// What the value is.
        found: String,
    },
    /// An object does not have the type its descriptor or update expects.
    #[error("Expected {expected} at path '{}', but got {found}", display_path(.path))]
    TypeMismatch {
        /// Where the mismatch happened.
        path: Path,
        /// What was expected.
        expected: String,
        /// What was found.
        found: String,
    },
    /// An immutable tree node cannot have keys added, removed or replaced.
    #[error("Cannot change key {key:?} of the immutable node at path '{}'", display_path(.path))]
    Immutable {
        /// The path of the tree node.
        path: Path,
        /// The key that was to be changed.
        key: Key,
    },
    /// A leaf table or update holds a key the node does not declare.
    #[error("Unknown key {key:?} at path '{}'", display_path(.path))]
    UnknownKey {
        /// The path of the node.
        path: Path,
        /// The undeclared key.
        key: Key,
    },
    /// A node of the update graph is used both as a new subtree and as an
    /// update target.
    #[error("{}", aliasing_message(.path, .status))]
    Aliasing {
        /// Where the conflicting use was found.
        path: Path,
        /// How the node was to be used there.
        status: NodeStatus,
    },
    /// An internal index invariant was broken. Signals a malformed
    /// descriptor or a bug, never a user error.
    #[error("Index {index} at path '{}': {reason}", display_path(.path))]
    Bookkeeping {
        /// Where the problem was found.
        path: Path,
        /// The index involved.
        index: Index,
        /// What went wrong.
        reason: &'static str,
    },
    /// A node adapter failed.
    #[error("Node adapter failed at path '{}'", display_path(.path))]
    Node {
        /// Where the adapter was called.
        path: Path,
        /// The adapter error.
        #[source]
        source: NodeError,
    },
    /// A tree descriptor does not have as many children as its shape.
    #[error("Tree at path '{}' has {found} children, but its shape has {expected}", display_path(.path))]
    TreeArity {
        /// The path of the tree.
        path: Path,
        /// The number of keys of the shape.
        expected: usize,
        /// The number of rebuilt children.
        found: usize,
    },
    /// Popping leaves requires at least one filter.
    #[error("Expected at least one filter")]
    NoFilters,
    /// Some leaves matched none of the filters of a split.
    #[error("{}", remainder_message(.paths))]
    NonExhaustiveFilters {
        /// The paths of the unmatched leaves.
        paths: Vec<Path>,
    },
    /// An update onto live objects needs a descriptor taken with an index map.
    #[error("Cannot update a graph from a descriptor without an index mapping")]
    MissingIndexMapping,
}

fn aliasing_message(path: &[Key], status: &NodeStatus) -> String {
    let path = display_path(path);
    match status {
        NodeStatus::New => format!(
            "Trying to add a new node at path '{path}' but a node with the same reference has been updated"
        ),
        NodeStatus::Updated => format!(
            "Trying to update a node at path '{path}' but a new node with the same reference has been added"
        ),
    }
}

fn remainder_message(paths: &[Path]) -> String {
    let first = paths.first().map(|p| display_path(p)).unwrap_or_default();
    format!(
        "Non-exhaustive filters: {} leaves matched no filter, the first at '{first}'",
        paths.len()
    )
}

impl GraphError {
    /// The path the error refers to, if any.
    pub fn path(&self) -> Option<&[Key]> {
        match self {
            GraphError::Unsupported { path, .. }
            | GraphError::TypeMismatch { path, .. }
            | GraphError::Immutable { path, .. }
            | GraphError::UnknownKey { path, .. }
            | GraphError::Aliasing { path, .. }
            | GraphError::Bookkeeping { path, .. }
            | GraphError::Node { path, .. }
            | GraphError::TreeArity { path, .. } => Some(path.as_slice()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn path(parts: &[&str]) -> Path {
        parts.iter().map(|&p| Key::from(p)).collect()
    }

    #[test]
    fn messages_render_paths() {
        let err = GraphError::UnknownKey {
            path: path(&["b", "c"]),
            key: "z".into(),
        };
        assert_eq!(err.to_string(), "Unknown key \"z\" at path 'b/c'");
        assert_eq!(err.path(), Some(path(&["b", "c"]).as_slice()));

        let err = GraphError::Aliasing {
            path: path(&["b"]),
            status: NodeStatus::New,
        };
        assert_eq!(
            err.to_string(),
            "Trying to add a new node at path 'b' but a node with the same reference has been updated"
        );
        assert_eq!(GraphError::NoFilters.path(), None);
    }
}
