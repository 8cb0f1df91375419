use std::collections::HashMap;

use indexmap::IndexMap;

use super::{child_path, classify_at, node_at, set_key};
use crate::core::{Key, ObjectId};
use crate::error::{GraphError, NodeStatus};
use crate::literal::Literal;
use crate::registry::{Classified, NodeMetadata, Registry};
use crate::value::Value;

/// Merges the structure of `updates` into `node`, in place.
///
/// `updates` must have the same node type as `node`. Nodes of `updates` at
/// names `node` already has are merged recursively; nodes at new names are
/// attached as they are; static fields overwrite. Variables are skipped, see
/// [`graph_update_dynamic`](super::graph_update_dynamic) for those.
///
/// A node of `updates` may not be both attached as new and merged into an
/// existing node.
pub fn graph_update_static(
    registry: &Registry,
    node: &Value,
    updates: &Value,
) -> Result<(), GraphError> {
    tracing::debug!("updating graph structure");
    let mut updater = StaticUpdater {
        registry,
        cache: HashMap::new(),
    };
    updater.update_node(&[], node, updates, NodeStatus::Updated)
}

struct StaticUpdater<'r> {
    registry: &'r Registry,
    cache: HashMap<ObjectId, NodeStatus>,
}

impl StaticUpdater<'_> {
    fn update_node(
        &mut self,
        path: &[Key],
        node: &Value,
        updates: &Value,
        status: NodeStatus,
    ) -> Result<(), GraphError> {
        let view = node_at(self.registry, node, path)?;
        let updates_view = node_at(self.registry, updates, path)?;
        let (node_items, node_meta) = view.flatten().map_err(|source| GraphError::Node {
            path: path.to_vec(),
            source,
        })?;
        let (updates_items, updates_meta) =
            updates_view.flatten().map_err(|source| GraphError::Node {
                path: path.to_vec(),
                source,
            })?;
        if view.node_type() != updates_view.node_type() || !same_type(&node_meta, &updates_meta) {
            return Err(GraphError::TypeMismatch {
                path: path.to_vec(),
                expected: describe(node, &node_meta),
                found: describe(updates, &updates_meta),
            });
        }

        if let Some(id) = updates.identity() {
            if let Some(&seen) = self.cache.get(&id) {
                if seen != status {
                    return Err(GraphError::Aliasing {
                        path: path.to_vec(),
                        status,
                    });
                }
                return Ok(());
            }
            self.cache.insert(id, status);
        }
        tracing::trace!(path = %crate::core::display_path(path), %status, "updating node structure");

        let node_dict: IndexMap<Key, Value> = node_items.into_iter().collect();

        for (key, value) in &updates_items {
            let value_path = child_path(path, key);
            match classify_at(self.registry, value, &value_path)? {
                Classified::Variable(_) => {}
                Classified::Node(_) => match node_dict.get(key) {
                    Some(current) => {
                        self.update_node(&value_path, current, value, NodeStatus::Updated)?;
                    }
                    None => {
                        if view.is_tree() {
                            return Err(GraphError::Immutable {
                                path: path.to_vec(),
                                key: key.clone(),
                            });
                        }
                        if let Some(id) = value.identity() {
                            match self.cache.get(&id) {
                                Some(NodeStatus::Updated) => {
                                    return Err(GraphError::Aliasing {
                                        path: value_path,
                                        status: NodeStatus::New,
                                    });
                                }
                                Some(NodeStatus::New) => {}
                                None => {
                                    self.cache.insert(id, NodeStatus::New);
                                }
                            }
                        }
                        set_key(&view, path, key, value.clone())?;
                    }
                },
                Classified::Static(_) => {
                    if view.is_tree() {
                        if node_dict.get(key) == Some(value) {
                            continue;
                        }
                        return Err(GraphError::Immutable {
                            path: path.to_vec(),
                            key: key.clone(),
                        });
                    }
                    set_key(&view, path, key, value.clone())?;
                }
            }
        }
        Ok(())
    }
}

/// Trees match on their kind, graph nodes on their adapter metadata.
fn same_type(node: &NodeMetadata, updates: &NodeMetadata) -> bool {
    match (node, updates) {
        (NodeMetadata::Tree(a), NodeMetadata::Tree(b)) => a.kind() == b.kind(),
        (NodeMetadata::Graph(a), NodeMetadata::Graph(b)) => a == b,
        _ => false,
    }
}

fn describe(value: &Value, metadata: &NodeMetadata) -> String {
    match metadata {
        NodeMetadata::Graph(meta) if *meta != Literal::None => {
            format!("{} ({meta})", value.describe())
        }
        _ => value.describe(),
    }
}
