//! Flattening, rebuilding and in-place updates of object graphs.
//!
//! [`graph_flatten`] splits a live graph into a [`GraphDef`] (its shape) and
//! a [`State`] (its leaves); [`graph_unflatten`] goes the other way. The
//! remaining functions are built on these two, or walk a live graph directly:
//! [`pop`] removes leaves, [`update`] merges leaf values and
//! [`graph_update_static`] merges structure.

mod flatten;
mod iter;
mod pop;
mod static_update;
mod unflatten;
mod update;


pub use flatten::graph_flatten;
pub use iter::iter_nodes;
pub use pop::graph_pop;
pub use static_update::graph_update_static;
pub use unflatten::graph_unflatten;
pub use update::graph_update_dynamic;

use crate::GraphError;
use crate::core::{Key, Path};
use crate::graphdef::GraphDef;
use crate::refmap::{IdxMap, RefMap, compose_mapping_reversed};
use crate::registry::{Classified, NodeView, Registry};
use crate::state::{Predicate, State};
use crate::value::Value;

/// The path of `key` below `path`.
fn child_path(path: &[Key], key: &Key) -> Path {
    let mut child = Vec::with_capacity(path.len() + 1);
    child.extend_from_slice(path);
    child.push(key.clone());
    child
}

/// Classifies `value`, failing on values the registry does not know.
fn classify_at<'r, 'v>(
    registry: &'r Registry,
    value: &'v Value,
    path: &[Key],
) -> Result<Classified<'r, 'v>, GraphError> {
    registry
        .classify(value)
        .ok_or_else(|| GraphError::Unsupported {
            path: path.to_vec(),
            found: value.describe(),
        })
}

/// The node view of `value`, failing if it is not a node.
fn node_at<'r, 'v>(
    registry: &'r Registry,
    value: &'v Value,
    path: &[Key],
) -> Result<NodeView<'r, 'v>, GraphError> {
    match classify_at(registry, value, path)? {
        Classified::Node(view) => Ok(view),
        _ => Err(GraphError::Unsupported {
            path: path.to_vec(),
            found: value.describe(),
        }),
    }
}

/// Sets `key` on a live node. Trees cannot be changed.
fn set_key(view: &NodeView<'_, '_>, path: &[Key], key: &Key, value: Value) -> Result<(), GraphError> {
    match view {
        NodeView::Graph(imp, node) => {
            imp.set_key(node, key.clone(), value)
                .map_err(|source| GraphError::Node {
                    path: child_path(path, key),
                    source,
                })
        }
        NodeView::Tree(_) => Err(GraphError::Immutable {
            path: path.to_vec(),
            key: key.clone(),
        }),
    }
}

/// Flattens `node` and partitions its leaves between `filters`.
///
/// With no filters a single state holds every leaf. Otherwise there is one
/// state per filter and every leaf must match at least one of them.
///
/// The returned [`RefMap`] relates the objects of `node` to the indices of
/// the descriptor. If `idxmap` is given, the descriptor also records how the
/// indices of `idxmap` map to its own.
pub fn full_split(
    registry: &Registry,
    node: &Value,
    filters: &[&dyn Predicate],
    idxmap: Option<&IdxMap>,
) -> Result<(RefMap, GraphDef, Vec<State>), GraphError> {
    let (graphdef, state, refmap) = graph_flatten(registry, node, idxmap)?;
    let states = state.split(filters)?;
    Ok((refmap, graphdef, states))
}

/// Flattens `node` into its descriptor and one state per filter.
///
/// ```
/// use objgraph_core::{Object, Registry, Value, Variable, graph};
///
/// let registry = Registry::new();
/// let model = Value::Node(Object::new("Linear").with("w", Variable::param(1i64)).into_ref());
/// let (graphdef, states) = graph::split(&registry, &model, &[]).unwrap();
/// let copy = graph::merge(&registry, &graphdef, states).unwrap();
/// assert_ne!(copy, model);
/// ```
pub fn split(
    registry: &Registry,
    node: &Value,
    filters: &[&dyn Predicate],
) -> Result<(GraphDef, Vec<State>), GraphError> {
    let (_, graphdef, states) = full_split(registry, node, filters, None)?;
    Ok((graphdef, states))
}

/// Rebuilds a graph from a descriptor and the merge of `states`, returning
/// the index of every rebuilt object as well.
pub fn full_merge(
    registry: &Registry,
    graphdef: &GraphDef,
    states: impl IntoIterator<Item = State>,
) -> Result<(Value, IdxMap), GraphError> {
    let state = State::merge(states);
    graph_unflatten(registry, graphdef, &state, None)
}

/// Rebuilds a graph from a descriptor and the merge of `states`.
pub fn merge(
    registry: &Registry,
    graphdef: &GraphDef,
    states: impl IntoIterator<Item = State>,
) -> Result<Value, GraphError> {
    full_merge(registry, graphdef, states).map(|(node, _)| node)
}

/// Rebuilds a graph onto the live objects of `refmap`.
///
/// `graphdef` must have been taken with an index map (see [`full_split`]).
/// Every object of `refmap` that the index mapping reaches is cleared and
/// refilled instead of being created anew, so outside references to those
/// objects see the new content.
pub fn full_update(
    registry: &Registry,
    refmap: &RefMap,
    graphdef: &GraphDef,
    states: impl IntoIterator<Item = State>,
) -> Result<Value, GraphError> {
    let mapping = graphdef
        .index_mapping()
        .ok_or(GraphError::MissingIndexMapping)?;
    let reuse = compose_mapping_reversed(refmap, mapping);
    tracing::debug!(reused = reuse.len(), "updating graph onto live objects");
    let state = State::merge(states);
    graph_unflatten(registry, graphdef, &state, Some(&reuse)).map(|(node, _)| node)
}

/// Merges the leaf values of `states` into `node` in place.
pub fn update(
    registry: &Registry,
    node: &Value,
    states: impl IntoIterator<Item = State>,
) -> Result<(), GraphError> {
    let state = State::merge(states);
    graph_update_dynamic(registry, node, &state)
}

/// Copies the leaves of `node` that match `filters`, one state per filter.
///
/// Unlike [`split`], leaves that match no filter are left out.
pub fn extract(
    registry: &Registry,
    node: &Value,
    filters: &[&dyn Predicate],
) -> Result<Vec<State>, GraphError> {
    if filters.is_empty() {
        return Err(GraphError::NoFilters);
    }
    let (_, state, _) = graph_flatten(registry, node, None)?;
    Ok(state.extract(filters))
}

/// Removes the leaves of `node` that match `filters`, one state per filter.
pub fn pop(
    registry: &Registry,
    node: &Value,
    filters: &[&dyn Predicate],
) -> Result<Vec<State>, GraphError> {
    if filters.is_empty() {
        return Err(GraphError::NoFilters);
    }
    graph_pop(registry, node, filters)
}

/// A deep copy of `node` with the same internal sharing.
pub fn clone_graph(registry: &Registry, node: &Value) -> Result<Value, GraphError> {
    let (graphdef, states) = split(registry, node, &[])?;
    merge(registry, &graphdef, states)
}

/// Merges the structure and then the leaf values of `updates` into `node`.
pub fn update_from(registry: &Registry, node: &Value, updates: &Value) -> Result<(), GraphError> {
    graph_update_static(registry, node, updates)?;
    let (_, states) = split(registry, updates, &[])?;
    update(registry, node, states)
}
