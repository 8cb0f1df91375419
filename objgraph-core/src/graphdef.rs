//! Structural descriptors of object graphs.
//!
//! A [`GraphDef`] describes the shape of a graph: the type and static fields
//! of every node, where leaves sit and which attributes alias objects seen
//! earlier in the traversal. It holds no payloads and no live objects, so two
//! graphs built separately but with the same shape have equal descriptors,
//! which can be hashed and used as map keys.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde_with::serde_as;

use crate::core::{Index, Key};
use crate::literal::Literal;
use crate::refmap::{IdxMap, IndexMapping};
use crate::registry::{NodeMetadata, NodeType, Registry};
use crate::state::State;
use crate::value::Value;
use crate::variable::{Metadata, Variable, VariableKind};
use crate::{GraphError, graph};

/// Either a nested definition or a back-reference to an index assigned
/// earlier in the same traversal.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DefOrRef<T> {
    /// A first occurrence, fully described.
    Def(T),
    /// A repeated occurrence of the object with this index.
    Ref(Index),
}

impl<T> DefOrRef<T> {
    /// Returns the definition, if this is not a back-reference.
    pub fn as_def(&self) -> Option<&T> {
        match self {
            DefOrRef::Def(def) => Some(def),
            DefOrRef::Ref(_) => None,
        }
    }
}

/// Description of a leaf cell: enough to build an empty placeholder, or to
/// check a supplied variable against.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct VariableDef {
    kind: VariableKind,
    index: Index,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    metadata: Metadata,
}

impl VariableDef {
    /// Describes `variable`, which was assigned `index`.
    pub fn from_variable(variable: &Variable, index: Index) -> Self {
        Self {
            kind: variable.kind().clone(),
            index,
            metadata: variable.metadata().clone(),
        }
    }

    /// Builds a variable from this definition holding `value`.
    pub fn to_variable(&self, value: Option<Literal>) -> Variable {
        Variable::from_def(self, value)
    }

    /// The declared kind.
    pub fn kind(&self) -> &VariableKind {
        &self.kind
    }

    /// The index of the variable in its traversal.
    pub fn index(&self) -> Index {
        self.index
    }

    /// The metadata of the variable.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

/// Canonical description of one node.
///
/// Every attribute name appears in [`NodeDef::attributes`] and in at most one
/// of the subgraph, static field and variable collections.
///
/// The keyed collections serialize as sequences of `[key, value]` pairs, so
/// integer keys stay integers in formats whose map keys are strings.
#[serde_as]
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct NodeDef {
    node_type: NodeType,
    /// `None` for immutable trees, which are never indexed.
    index: Option<Index>,
    attributes: Vec<Key>,
    #[serde_as(as = "Vec<(_, _)>")]
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    subgraphs: BTreeMap<Key, DefOrRef<NodeDef>>,
    #[serde_as(as = "Vec<(_, _)>")]
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    static_fields: BTreeMap<Key, Literal>,
    #[serde_as(as = "Vec<(_, _)>")]
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    variables: BTreeMap<Key, DefOrRef<VariableDef>>,
    metadata: NodeMetadata,
}

impl NodeDef {
    pub(crate) fn new(
        node_type: NodeType,
        index: Option<Index>,
        attributes: Vec<Key>,
        subgraphs: BTreeMap<Key, DefOrRef<NodeDef>>,
        static_fields: BTreeMap<Key, Literal>,
        variables: BTreeMap<Key, DefOrRef<VariableDef>>,
        metadata: NodeMetadata,
    ) -> Self {
        Self {
            node_type,
            index,
            attributes,
            subgraphs,
            static_fields,
            variables,
            metadata,
        }
    }

    /// The declared type of the node.
    pub fn node_type(&self) -> &NodeType {
        &self.node_type
    }

    /// The index of the node, or `None` for trees.
    pub fn index(&self) -> Option<Index> {
        self.index
    }

    /// The attribute names, in flatten order.
    pub fn attributes(&self) -> &[Key] {
        &self.attributes
    }

    /// Child nodes, keyed by attribute.
    pub fn subgraphs(&self) -> &BTreeMap<Key, DefOrRef<NodeDef>> {
        &self.subgraphs
    }

    /// Static fields, keyed by attribute.
    pub fn static_fields(&self) -> &BTreeMap<Key, Literal> {
        &self.static_fields
    }

    /// Leaf cells, keyed by attribute.
    pub fn variables(&self) -> &BTreeMap<Key, DefOrRef<VariableDef>> {
        &self.variables
    }

    /// The metadata passed back to the adapter when rebuilding.
    pub fn metadata(&self) -> &NodeMetadata {
        &self.metadata
    }
}

/// Descriptor of a whole graph: the root [`NodeDef`] plus an optional index
/// mapping.
///
/// The index mapping is only present when the graph was flattened against an
/// existing index map; it relates those indices to the ones of this
/// descriptor. It is not part of the descriptor's identity: equality and
/// hashing only look at the root definition.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct GraphDef {
    nodedef: NodeDef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    index_mapping: Option<IndexMapping>,
}

impl GraphDef {
    /// Wraps a root definition.
    pub fn new(nodedef: NodeDef, index_mapping: Option<IndexMapping>) -> Self {
        Self {
            nodedef,
            index_mapping,
        }
    }

    /// The root node definition.
    pub fn nodedef(&self) -> &NodeDef {
        &self.nodedef
    }

    /// The index mapping, if the graph was flattened against an index map.
    pub fn index_mapping(&self) -> Option<&IndexMapping> {
        self.index_mapping.as_ref()
    }

    /// Rebuilds a graph from this descriptor and the merge of `states`.
    pub fn merge(
        &self,
        registry: &Registry,
        states: impl IntoIterator<Item = State>,
    ) -> Result<Value, GraphError> {
        graph::merge(registry, self, states)
    }

    /// Rebuilds a graph with empty placeholders for every leaf.
    pub fn make_empty(&self, registry: &Registry) -> Result<Value, GraphError> {
        self.unflatten(registry, &State::new(), None).map(|(value, _)| value)
    }

    /// Rebuilds a graph, optionally reusing the objects of `idxmap`.
    pub fn unflatten(
        &self,
        registry: &Registry,
        state: &State,
        idxmap: Option<&IdxMap>,
    ) -> Result<(Value, IdxMap), GraphError> {
        graph::graph_unflatten(registry, self, state, idxmap)
    }
}

impl PartialEq for GraphDef {
    fn eq(&self, other: &Self) -> bool {
        self.nodedef == other.nodedef
    }
}

impl Eq for GraphDef {}

impl Hash for GraphDef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.nodedef.hash(state);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    fn leaf_def(index: Index) -> NodeDef {
        NodeDef::new(
            NodeType::Graph("object".into()),
            Some(0),
            vec!["w".into()],
            BTreeMap::new(),
            BTreeMap::new(),
            BTreeMap::from([(
                "w".into(),
                DefOrRef::Def(VariableDef::from_variable(&Variable::param(1i64), index)),
            )]),
            NodeMetadata::Graph("Linear".into()),
        )
    }

    #[test]
    fn index_mapping_is_opaque() {
        let plain = GraphDef::new(leaf_def(1), None);
        let mapped = GraphDef::new(leaf_def(1), Some(IndexMapping::from([(0, 3)])));
        assert_eq!(plain, mapped);

        let set = HashSet::from([plain]);
        assert!(set.contains(&mapped));
        assert_ne!(GraphDef::new(leaf_def(2), None), mapped);
    }

    #[test]
    fn clone_keeps_index_mapping() {
        let mapped = GraphDef::new(leaf_def(1), Some(IndexMapping::from([(0, 3)])));
        assert_eq!(mapped.clone().index_mapping(), mapped.index_mapping());
    }

    #[test]
    fn serde_round_trip() {
        let def = GraphDef::new(leaf_def(1), Some(IndexMapping::from([(0, 3)])));
        let json = serde_json::to_string(&def).unwrap();
        let back: GraphDef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, def);
        assert_eq!(back.index_mapping(), def.index_mapping());
    }
}
