use std::collections::BTreeMap;

use super::{child_path, classify_at, node_at};
use crate::GraphError;
use crate::core::Key;
use crate::graphdef::{DefOrRef, GraphDef, NodeDef, VariableDef};
use crate::refmap::{IdxMap, RefMap, compose_mapping};
use crate::registry::{Classified, NodeView, Registry};
use crate::state::{FlatState, State, StateLeaf};
use crate::value::{GraphRef, Value};

/// Splits a graph into its descriptor and its leaves.
///
/// Traversal is depth-first and pre-order over the attribute order of each
/// node. Graph nodes and variables are indexed on first visit; later visits
/// become back-references. Trees are never indexed.
///
/// If `idxmap` is given, the descriptor carries the mapping from its indices
/// to the indices this traversal assigned to the same objects.
pub fn graph_flatten(
    registry: &Registry,
    node: &Value,
    idxmap: Option<&IdxMap>,
) -> Result<(GraphDef, State, RefMap), GraphError> {
    let view = node_at(registry, node, &[])?;
    let mut flattener = Flattener {
        registry,
        refmap: RefMap::new(),
        flat_state: FlatState::new(),
    };
    let nodedef = match flattener.flatten_node(&[], view)? {
        DefOrRef::Def(nodedef) => nodedef,
        DefOrRef::Ref(index) => {
            return Err(GraphError::Bookkeeping {
                path: Vec::new(),
                index,
                reason: "root was already indexed",
            });
        }
    };
    let Flattener {
        refmap, flat_state, ..
    } = flattener;
    tracing::debug!(
        indexed = refmap.len(),
        leaves = flat_state.len(),
        "flattened graph"
    );
    let index_mapping = idxmap.map(|idxmap| compose_mapping(idxmap, &refmap));
    let graphdef = GraphDef::new(nodedef, index_mapping);
    Ok((graphdef, State::from_flat_path(flat_state), refmap))
}

struct Flattener<'r> {
    registry: &'r Registry,
    refmap: RefMap,
    flat_state: FlatState,
}

impl Flattener<'_> {
    fn flatten_node(
        &mut self,
        path: &[Key],
        view: NodeView<'_, '_>,
    ) -> Result<DefOrRef<NodeDef>, GraphError> {
        // Graph nodes get their index before their children are visited, so
        // that a child can refer back to it.
        let index = match view {
            NodeView::Graph(_, node) => {
                let node = GraphRef::Node(node.clone());
                if let Some(index) = self.refmap.get(&node) {
                    return Ok(DefOrRef::Ref(index));
                }
                Some(self.refmap.insert(node))
            }
            NodeView::Tree(_) => None,
        };
        let node_type = view.node_type();
        tracing::trace!(path = %crate::core::display_path(path), %node_type, ?index, "flattening node");

        let (items, metadata) = view.flatten().map_err(|source| GraphError::Node {
            path: path.to_vec(),
            source,
        })?;

        let mut subgraphs = BTreeMap::new();
        let mut static_fields = BTreeMap::new();
        let mut variables = BTreeMap::new();
        for (key, value) in &items {
            let value_path = child_path(path, key);
            match classify_at(self.registry, value, &value_path)? {
                Classified::Node(child) => {
                    let def = self.flatten_node(&value_path, child)?;
                    subgraphs.insert(key.clone(), def);
                }
                Classified::Variable(var) => {
                    let var_ref = GraphRef::Variable(var.clone());
                    let def = match self.refmap.get(&var_ref) {
                        Some(index) => DefOrRef::Ref(index),
                        None => {
                            let index = self.refmap.insert(var_ref);
                            let var = var.borrow();
                            self.flat_state
                                .insert(value_path, StateLeaf::Variable(var.clone()));
                            DefOrRef::Def(VariableDef::from_variable(&var, index))
                        }
                    };
                    variables.insert(key.clone(), def);
                }
                Classified::Static(lit) => {
                    static_fields.insert(key.clone(), lit.clone());
                }
            }
        }

        let attributes = items.into_iter().map(|(key, _)| key).collect();
        Ok(DefOrRef::Def(NodeDef::new(
            node_type,
            index,
            attributes,
            subgraphs,
            static_fields,
            variables,
            metadata,
        )))
    }
}
