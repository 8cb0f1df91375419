//! Flatten and rebuild cyclic object graphs while preserving identity.
//!
//! An object graph is a set of container nodes holding typed leaf cells
//! ([`Variable`]s), static values and other nodes, where any node or leaf may
//! be reachable along several paths, including from itself. This crate splits
//! such a graph into two parts:
//!
//! - a [`GraphDef`]: the shape of the graph. It records node types, static
//!   fields and where sharing happens, but no leaf payloads and no live
//!   objects. Structurally identical graphs have equal, equally hashed
//!   descriptors.
//! - a [`State`]: the leaves, keyed by the path they were first found at.
//!
//! and rebuilds graphs from the two, either into fresh objects or into
//! existing ones. On top of this it provides partial extraction of leaves
//! ([`graph::pop`], [`graph::extract`]) and in-place merges of leaf values
//! ([`graph::update`]) or of structure ([`graph::update_from`]).
//!
//! Which Rust types act as nodes is decided by a [`Registry`]. The built-in
//! [`Object`] type covers general attribute bags; other types register
//! through the [`GraphNode`] trait. [`Tree`]s are immutable containers that
//! take part in a graph without being registered.
//!
//! # Example
//!
//! ```
//! use objgraph::graph;
//! use objgraph::state::OfKind;
//! use objgraph::{Object, Registry, Value, Variable, VariableKind};
//!
//! let registry = Registry::new();
//! let linear = Value::Node(
//!     Object::new("Linear")
//!         .with("w", Variable::param(0.5))
//!         .with("mean", Variable::batch_stat(0.0))
//!         .into_ref(),
//! );
//! // Both attributes refer to the same layer.
//! let model = Value::Node(
//!     Object::new("Model")
//!         .with("encoder", linear.clone())
//!         .with("decoder", linear)
//!         .into_ref(),
//! );
//!
//! let params = OfKind(VariableKind::PARAM);
//! let stats = OfKind(VariableKind::BATCH_STAT);
//! let (graphdef, states) = graph::split(&registry, &model, &[&params, &stats]).unwrap();
//! assert_eq!(states[0].flat_state().len(), 1);
//!
//! let copy = graph::merge(&registry, &graphdef, states).unwrap();
//! let nodes = graph::iter_nodes(&registry, &copy).unwrap();
//! // The copy shares its layer just like the original.
//! assert_eq!(nodes.len(), 2);
//! ```

// These modules are re-exported as-is.
pub use objgraph_core::{
    core, epoch, error, graph, graphdef, literal, object, refmap, registry, state, value, variable,
};

// Top-level re-exports for convenience.
pub use objgraph_core::core::{Index, Key, ObjectId, Path};
pub use objgraph_core::epoch::{Epoch, EpochScope};
pub use objgraph_core::error::GraphError;
pub use objgraph_core::graphdef::{DefOrRef, GraphDef, NodeDef, VariableDef};
pub use objgraph_core::literal::Literal;
pub use objgraph_core::object::Object;
pub use objgraph_core::refmap::{IdxMap, IndexMapping, RefMap};
pub use objgraph_core::registry::{GraphNode, NodeError, NodeType, Registry};
pub use objgraph_core::state::{State, StateEntry, StateLeaf};
pub use objgraph_core::value::{GraphRef, NodeRef, Tree, Value};
pub use objgraph_core::variable::{Variable, VariableKind, VariableRef};
