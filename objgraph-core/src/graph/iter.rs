use std::collections::HashSet;

use super::child_path;
use crate::GraphError;
use crate::core::{Key, ObjectId, Path};
use crate::registry::Registry;
use crate::value::Value;

/// Every node reachable from `node`, with the path it was first reached by.
///
/// Nodes come in pre-order and each shared node appears once.
pub fn iter_nodes(registry: &Registry, node: &Value) -> Result<Vec<(Path, Value)>, GraphError> {
    let mut visited = HashSet::new();
    let mut nodes = Vec::new();
    walk(registry, &[], node, &mut visited, &mut nodes)?;
    Ok(nodes)
}

fn walk(
    registry: &Registry,
    path: &[Key],
    value: &Value,
    visited: &mut HashSet<ObjectId>,
    nodes: &mut Vec<(Path, Value)>,
) -> Result<(), GraphError> {
    let Some(view) = registry.node_view(value) else {
        return Ok(());
    };
    if let Some(id) = value.identity() {
        if !visited.insert(id) {
            return Ok(());
        }
    }
    nodes.push((path.to_vec(), value.clone()));
    let (items, _) = view.flatten().map_err(|source| GraphError::Node {
        path: path.to_vec(),
        source,
    })?;
    for (key, child) in &items {
        walk(registry, &child_path(path, key), child, visited, nodes)?;
    }
    Ok(())
}
