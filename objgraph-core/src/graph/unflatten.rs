use super::child_path;
use crate::GraphError;
use crate::core::{Index, Key};
use crate::graphdef::{DefOrRef, GraphDef, NodeDef, VariableDef};
use crate::literal::Literal;
use crate::refmap::IdxMap;
use crate::registry::{GraphNodeImpl, NodeImpl, NodeMetadata, Registry};
use crate::state::{State, StateEntry, StateLeaf};
use crate::value::{GraphRef, NodeRef, TreeShape, Value};
use crate::variable::{Variable, VariableRef};

/// Rebuilds a graph from its descriptor and a nested leaf table.
///
/// Leaves missing from `state` become empty placeholders. Keys of `state`
/// that the descriptor does not declare are an error.
///
/// If `idxmap` is given, the objects it holds are reused for the matching
/// indices: graph nodes are cleared and refilled, variables absorb the new
/// values in place. Returns the root and the index of every rebuilt object.
pub fn graph_unflatten(
    registry: &Registry,
    graphdef: &GraphDef,
    state: &State,
    idxmap: Option<&IdxMap>,
) -> Result<(Value, IdxMap), GraphError> {
    tracing::debug!(
        node_type = %graphdef.nodedef().node_type(),
        reuse = idxmap.map_or(0, IdxMap::len),
        "unflattening graph"
    );
    let mut unflattener = Unflattener {
        registry,
        index_to_ref: IdxMap::new(),
        idxmap,
    };
    let node = unflattener.unflatten_node(&[], graphdef.nodedef(), state)?;
    Ok((node, unflattener.index_to_ref))
}

struct Unflattener<'r, 'i> {
    registry: &'r Registry,
    index_to_ref: IdxMap,
    idxmap: Option<&'i IdxMap>,
}

impl Unflattener<'_, '_> {
    fn unflatten_node(
        &mut self,
        path: &[Key],
        nodedef: &NodeDef,
        state: &State,
    ) -> Result<Value, GraphError> {
        let node_impl = self
            .registry
            .impl_for_type(nodedef.node_type())
            .ok_or_else(|| GraphError::Unsupported {
                path: path.to_vec(),
                found: format!("the unregistered node type {}", nodedef.node_type()),
            })?;
        if let Some(key) = state.keys().find(|key| !nodedef.attributes().contains(key)) {
            return Err(GraphError::UnknownKey {
                path: path.to_vec(),
                key: key.clone(),
            });
        }
        tracing::trace!(path = %crate::core::display_path(path), node_type = %nodedef.node_type(), "unflattening node");

        match node_impl {
            NodeImpl::Graph(imp) => {
                let index = nodedef.index().ok_or(GraphError::Bookkeeping {
                    path: path.to_vec(),
                    index: 0,
                    reason: "graph node descriptor without an index",
                })?;
                let NodeMetadata::Graph(metadata) = nodedef.metadata() else {
                    return Err(GraphError::Bookkeeping {
                        path: path.to_vec(),
                        index,
                        reason: "graph node descriptor with tree metadata",
                    });
                };
                let node = self.empty_node(path, nodedef, imp, index, metadata)?;
                // Registered before the children so that cycles resolve.
                self.claim(path, index, GraphRef::Node(node.clone()))?;
                let children = self.children(path, nodedef, state)?;
                imp.init(&node, children)
                    .map_err(|(key, source)| GraphError::Node {
                        path: child_path(path, &key),
                        source,
                    })?;
                Ok(Value::Node(node))
            }
            NodeImpl::Tree(imp) => {
                let NodeMetadata::Tree(shape) = nodedef.metadata() else {
                    return Err(GraphError::Bookkeeping {
                        path: path.to_vec(),
                        index: nodedef.index().unwrap_or_default(),
                        reason: "tree descriptor with graph node metadata",
                    });
                };
                let children = self.children(path, nodedef, state)?;
                let found = children.len();
                let tree = imp
                    .unflatten(children, shape)
                    .ok_or_else(|| arity_error(path, shape, found))?;
                Ok(Value::from(tree))
            }
        }
    }

    /// A cleared reused node, or a fresh one.
    fn empty_node(
        &self,
        path: &[Key],
        nodedef: &NodeDef,
        imp: &GraphNodeImpl,
        index: Index,
        metadata: &Literal,
    ) -> Result<NodeRef, GraphError> {
        let Some(reused) = self.reused(index) else {
            return Ok(imp.create_empty(metadata));
        };
        let node = match reused {
            GraphRef::Node(node) if self.registry.node_type_of(node) == Some(nodedef.node_type()) => node,
            other => {
                return Err(GraphError::TypeMismatch {
                    path: path.to_vec(),
                    expected: format!("a node of type {} for index {index}", nodedef.node_type()),
                    found: Value::from(other.clone()).describe(),
                });
            }
        };
        let (_, live_metadata) = imp.flatten(node).map_err(|source| GraphError::Node {
            path: path.to_vec(),
            source,
        })?;
        if live_metadata != *metadata {
            return Err(GraphError::TypeMismatch {
                path: path.to_vec(),
                expected: format!("a node of type {} ({metadata}) for index {index}", nodedef.node_type()),
                found: format!("{} ({live_metadata})", Value::from(reused.clone()).describe()),
            });
        }
        imp.clear(node, metadata).map_err(|source| GraphError::Node {
            path: path.to_vec(),
            source,
        })?;
        Ok(node.clone())
    }

    fn children(
        &mut self,
        path: &[Key],
        nodedef: &NodeDef,
        state: &State,
    ) -> Result<Vec<(Key, Value)>, GraphError> {
        let no_state = State::new();
        let mut children = Vec::with_capacity(nodedef.attributes().len());
        for key in nodedef.attributes() {
            let value_path = child_path(path, key);
            let value = if let Some(lit) = nodedef.static_fields().get(key) {
                Value::Static(lit.clone())
            } else if let Some(subgraph) = nodedef.subgraphs().get(key) {
                let substate = match state.get(key) {
                    None => &no_state,
                    Some(StateEntry::Nested(substate)) => substate,
                    Some(StateEntry::Leaf(leaf)) => {
                        return Err(GraphError::TypeMismatch {
                            path: value_path,
                            expected: "the state of a subgraph".to_string(),
                            found: describe_leaf(leaf),
                        });
                    }
                };
                match subgraph {
                    DefOrRef::Ref(index) => self.lookup(&value_path, *index)?,
                    DefOrRef::Def(def) => self.unflatten_node(&value_path, def, substate)?,
                }
            } else if let Some(variable) = nodedef.variables().get(key) {
                match variable {
                    DefOrRef::Ref(index) => self.lookup(&value_path, *index)?,
                    DefOrRef::Def(def) => {
                        let var = match state.get(key) {
                            None => self.empty_variable(&value_path, def)?,
                            Some(StateEntry::Leaf(StateLeaf::Variable(var))) => {
                                self.filled_variable(&value_path, def, var)?
                            }
                            Some(entry) => {
                                return Err(GraphError::TypeMismatch {
                                    path: value_path,
                                    expected: format!("a variable of kind {}", def.kind()),
                                    found: describe_entry(entry),
                                });
                            }
                        };
                        self.claim(&value_path, def.index(), GraphRef::Variable(var.clone()))?;
                        Value::Variable(var)
                    }
                }
            } else {
                // A raw leaf the descriptor only knows by name.
                match state.get(key) {
                    Some(StateEntry::Leaf(StateLeaf::Static(lit))) => Value::Static(lit.clone()),
                    Some(StateEntry::Leaf(StateLeaf::Variable(var))) => {
                        Value::Variable(VariableRef::new(var.clone()))
                    }
                    Some(StateEntry::Nested(_)) | None => {
                        return Err(GraphError::UnknownKey {
                            path: path.to_vec(),
                            key: key.clone(),
                        });
                    }
                }
            };
            children.push((key.clone(), value));
        }
        Ok(children)
    }

    /// The placeholder for a leaf that has no value in the state.
    fn empty_variable(&self, path: &[Key], def: &VariableDef) -> Result<VariableRef, GraphError> {
        match self.reused_variable(path, def)? {
            Some(var) => {
                var.borrow_mut().copy_from_def(def, None);
                Ok(var)
            }
            None => Ok(VariableRef::new(def.to_variable(None))),
        }
    }

    /// The leaf for a value supplied by the state.
    fn filled_variable(
        &self,
        path: &[Key],
        def: &VariableDef,
        value: &Variable,
    ) -> Result<VariableRef, GraphError> {
        if value.kind() != def.kind() {
            return Err(GraphError::TypeMismatch {
                path: path.to_vec(),
                expected: format!("a variable of kind {}", def.kind()),
                found: format!("a variable of kind {}", value.kind()),
            });
        }
        match self.reused_variable(path, def)? {
            Some(var) => {
                var.borrow_mut()
                    .copy_from(value)
                    .map_err(|source| GraphError::Node {
                        path: path.to_vec(),
                        source: source.into(),
                    })?;
                Ok(var)
            }
            None => Ok(VariableRef::new(value.clone())),
        }
    }

    fn reused_variable(
        &self,
        path: &[Key],
        def: &VariableDef,
    ) -> Result<Option<VariableRef>, GraphError> {
        match self.reused(def.index()) {
            None => Ok(None),
            Some(GraphRef::Variable(var)) if var.borrow().kind() == def.kind() => Ok(Some(var.clone())),
            Some(other) => Err(GraphError::TypeMismatch {
                path: path.to_vec(),
                expected: format!("a variable of kind {} for index {}", def.kind(), def.index()),
                found: Value::from(other.clone()).describe(),
            }),
        }
    }

    fn reused(&self, index: Index) -> Option<&GraphRef> {
        self.idxmap?.get(&index)
    }

    fn lookup(&self, path: &[Key], index: Index) -> Result<Value, GraphError> {
        self.index_to_ref
            .get(&index)
            .cloned()
            .map(Value::from)
            .ok_or_else(|| GraphError::Bookkeeping {
                path: path.to_vec(),
                index,
                reason: "back-reference to an index that was not built yet",
            })
    }

    fn claim(&mut self, path: &[Key], index: Index, object: GraphRef) -> Result<(), GraphError> {
        if self.index_to_ref.contains_key(&index) {
            return Err(GraphError::Bookkeeping {
                path: path.to_vec(),
                index,
                reason: "index already used",
            });
        }
        self.index_to_ref.insert(index, object);
        Ok(())
    }
}

fn arity_error(path: &[Key], shape: &TreeShape, found: usize) -> GraphError {
    GraphError::TreeArity {
        path: path.to_vec(),
        expected: shape.keys().len(),
        found,
    }
}

fn describe_leaf(leaf: &StateLeaf) -> String {
    match leaf {
        StateLeaf::Variable(var) => format!("a variable of kind {}", var.kind()),
        StateLeaf::Static(lit) => format!("the static value {lit}"),
    }
}

fn describe_entry(entry: &StateEntry) -> String {
    match entry {
        StateEntry::Leaf(leaf) => describe_leaf(leaf),
        StateEntry::Nested(_) => "the state of a subgraph".to_string(),
    }
}
