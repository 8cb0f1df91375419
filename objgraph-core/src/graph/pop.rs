use std::collections::HashSet;

use super::{child_path, classify_at, node_at};
use crate::GraphError;
use crate::core::{Key, ObjectId};
use crate::registry::{Classified, NodeView, Registry};
use crate::state::{FlatState, Predicate, State, StateLeaf};
use crate::value::Value;

/// Removes the leaves of a live graph that match `predicates`.
///
/// Each leaf is offered to the predicates in order and goes to the first one
/// that matches it; it is then removed from its node and a copy is recorded
/// under its path in that predicate's state. Leaves no predicate matches stay
/// where they are. Shared nodes and leaves are only visited once.
///
/// Removing a leaf from a tree is an error. Leaves removed before the error
/// stay removed.
pub fn graph_pop(
    registry: &Registry,
    node: &Value,
    predicates: &[&dyn Predicate],
) -> Result<Vec<State>, GraphError> {
    let mut popper = Popper {
        registry,
        predicates,
        visited: HashSet::new(),
        flat_states: vec![FlatState::new(); predicates.len()],
    };
    popper.pop_node(&[], node)?;
    let states: Vec<State> = popper
        .flat_states
        .into_iter()
        .map(State::from_flat_path)
        .collect();
    tracing::debug!(
        popped = ?states.iter().map(|s| s.flat_state().len()).collect::<Vec<_>>(),
        "popped leaves"
    );
    Ok(states)
}

struct Popper<'r, 'p> {
    registry: &'r Registry,
    predicates: &'p [&'p dyn Predicate],
    visited: HashSet<ObjectId>,
    flat_states: Vec<FlatState>,
}

impl Popper<'_, '_> {
    fn pop_node(&mut self, path: &[Key], node: &Value) -> Result<(), GraphError> {
        let view = node_at(self.registry, node, path)?;
        if let Some(id) = node.identity() {
            if !self.visited.insert(id) {
                return Ok(());
            }
        }
        let (items, _) = view.flatten().map_err(|source| GraphError::Node {
            path: path.to_vec(),
            source,
        })?;

        for (key, value) in &items {
            let value_path = child_path(path, key);
            let var = match classify_at(self.registry, value, &value_path)? {
                Classified::Node(_) => {
                    self.pop_node(&value_path, value)?;
                    continue;
                }
                Classified::Static(_) => continue,
                Classified::Variable(var) => var,
            };
            if self.visited.contains(&var.id()) {
                continue;
            }
            let leaf = StateLeaf::Variable(var.borrow().clone());
            let Some(bucket) = self
                .predicates
                .iter()
                .position(|p| p.matches(&value_path, &leaf))
            else {
                continue;
            };
            match view {
                NodeView::Graph(imp, live) => {
                    imp.pop_key(live, key).map_err(|source| GraphError::Node {
                        path: value_path.clone(),
                        source,
                    })?;
                }
                NodeView::Tree(_) => {
                    return Err(GraphError::Immutable {
                        path: path.to_vec(),
                        key: key.clone(),
                    });
                }
            }
            self.visited.insert(var.id());
            tracing::trace!(path = %crate::core::display_path(&value_path), bucket, "popped leaf");
            self.flat_states[bucket].insert(value_path, leaf);
        }
        Ok(())
    }
}
