use super::{child_path, node_at, set_key};
use crate::GraphError;
use crate::core::Key;
use crate::registry::Registry;
use crate::state::{State, StateEntry, StateLeaf};
use crate::value::{Tree, Value};
use crate::variable::VariableRef;

/// Merges a nested leaf table into a live graph, in place.
///
/// Keys the node does not have yet are added, nested tables as dict trees.
/// Existing variables absorb the new values instead of being replaced, so
/// every outside handle to them sees the update. Static values replace the existing field. Trees accept
/// none of these changes.
pub fn graph_update_dynamic(
    registry: &Registry,
    node: &Value,
    state: &State,
) -> Result<(), GraphError> {
    tracing::debug!(entries = state.len(), "updating graph leaves");
    update_node(registry, &[], node, state)
}

fn update_node(
    registry: &Registry,
    path: &[Key],
    node: &Value,
    state: &State,
) -> Result<(), GraphError> {
    let view = node_at(registry, node, path)?;
    let node_dict = view.node_dict().map_err(|source| GraphError::Node {
        path: path.to_vec(),
        source,
    })?;

    for (key, entry) in state.iter() {
        let value_path = child_path(path, key);
        let Some(current) = node_dict.get(key) else {
            set_key(&view, path, key, new_value(entry))?;
            continue;
        };

        if registry.is_node(current) {
            let StateEntry::Nested(substate) = entry else {
                return Err(GraphError::TypeMismatch {
                    path: value_path,
                    expected: "the state of a subgraph".to_string(),
                    found: "a leaf".to_string(),
                });
            };
            update_node(registry, &value_path, current, substate)?;
            continue;
        }

        match entry {
            StateEntry::Leaf(StateLeaf::Variable(var)) => {
                let Value::Variable(current) = current else {
                    return Err(GraphError::TypeMismatch {
                        path: value_path,
                        expected: format!("a variable of kind {}", var.kind()),
                        found: current.describe(),
                    });
                };
                current
                    .borrow_mut()
                    .copy_from(var)
                    .map_err(|err| GraphError::TypeMismatch {
                        path: value_path,
                        expected: format!("a variable of kind {}", err.expected),
                        found: format!("a variable of kind {}", err.found),
                    })?;
            }
            StateEntry::Leaf(StateLeaf::Static(lit)) => {
                set_key(&view, path, key, Value::Static(lit.clone()))?;
            }
            StateEntry::Nested(_) => {
                return Err(GraphError::TypeMismatch {
                    path: value_path,
                    expected: "a node".to_string(),
                    found: current.describe(),
                });
            }
        }
    }
    Ok(())
}

/// The value a state entry becomes under a key the node does not have yet.
/// Nested tables become dict trees.
fn new_value(entry: &StateEntry) -> Value {
    match entry {
        StateEntry::Leaf(StateLeaf::Variable(var)) => Value::Variable(VariableRef::new(var.clone())),
        StateEntry::Leaf(StateLeaf::Static(lit)) => Value::Static(lit.clone()),
        StateEntry::Nested(state) => Tree::dict(
            state
                .iter()
                .map(|(key, entry)| (key.clone(), new_value(entry))),
        )
        .into(),
    }
}
