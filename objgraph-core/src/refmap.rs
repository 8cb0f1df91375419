//! Identity maps between live objects and dense indices.

use std::collections::BTreeMap;

use indexmap::IndexSet;

use crate::core::Index;
use crate::value::GraphRef;

/// Map from index to the live object that was assigned that index.
pub type IdxMap = BTreeMap<Index, GraphRef>;

/// Map from the indices of one traversal to the indices of another.
pub type IndexMapping = BTreeMap<Index, Index>;

/// Identity-keyed map from live objects to dense indices.
///
/// Objects are compared by the identity of their allocation, never by value.
/// Indices are assigned in insertion order, starting at zero. The map keeps
/// every object it indexes alive.
#[derive(Clone, Debug, Default)]
pub struct RefMap {
    refs: IndexSet<GraphRef>,
}

impl RefMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of indexed objects.
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    /// Whether no objects have been indexed.
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// The index of `object`, if it has one.
    pub fn get(&self, object: &GraphRef) -> Option<Index> {
        self.refs.get_index_of(object)
    }

    /// Whether `object` has been indexed.
    pub fn contains(&self, object: &GraphRef) -> bool {
        self.refs.contains(object)
    }

    /// Indexes `object`, returning its index. Already indexed objects keep
    /// their index.
    pub fn insert(&mut self, object: GraphRef) -> Index {
        self.refs.insert_full(object).0
    }

    /// The object with index `index`.
    pub fn get_ref(&self, index: Index) -> Option<&GraphRef> {
        self.refs.get_index(index)
    }

    /// Iterates over `(object, index)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (&GraphRef, Index)> {
        self.refs.iter().enumerate().map(|(i, r)| (r, i))
    }

    /// The inverse map, from index to object.
    pub fn to_idxmap(&self) -> IdxMap {
        self.iter().map(|(r, i)| (i, r.clone())).collect()
    }
}

/// Composes an index-to-object map with an object-to-index map.
///
/// Objects of `idxmap` that are not in `refmap` are dropped.
pub fn compose_mapping(idxmap: &IdxMap, refmap: &RefMap) -> IndexMapping {
    idxmap
        .iter()
        .filter_map(|(&a, object)| Some((a, refmap.get(object)?)))
        .collect()
}

/// Builds a reuse map: for each object of `refmap` whose index is mapped by
/// `mapping`, the object is placed at the mapped index.
pub fn compose_mapping_reversed(refmap: &RefMap, mapping: &IndexMapping) -> IdxMap {
    refmap
        .iter()
        .filter_map(|(object, b)| Some((*mapping.get(&b)?, object.clone())))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::object::Object;
    use crate::variable::{Variable, VariableRef};

    #[test]
    fn indices_follow_identity_not_value() {
        let a = GraphRef::from(VariableRef::new(Variable::param(1i64)));
        let b = GraphRef::from(VariableRef::new(Variable::param(1i64)));
        let mut refmap = RefMap::new();
        assert_eq!(refmap.insert(a.clone()), 0);
        assert_eq!(refmap.insert(b.clone()), 1);
        assert_eq!(refmap.insert(a.clone()), 0);
        assert_eq!(refmap.len(), 2);
        assert_eq!(refmap.get(&b), Some(1));
        assert_eq!(refmap.get_ref(0), Some(&a));
    }

    #[test]
    fn composition() {
        let x = GraphRef::from(Object::new("X").into_ref());
        let y = GraphRef::from(VariableRef::new(Variable::param(0i64)));
        let z = GraphRef::from(Object::new("Z").into_ref());

        // a traversal that saw y then x
        let mut refmap = RefMap::new();
        refmap.insert(y.clone());
        refmap.insert(x.clone());

        let idxmap = IdxMap::from([(7, x.clone()), (8, y.clone()), (9, z)]);
        let mapping = compose_mapping(&idxmap, &refmap);
        assert_eq!(mapping, IndexMapping::from([(7, 1), (8, 0)]));

        let reuse = compose_mapping_reversed(&refmap, &IndexMapping::from([(1, 4)]));
        assert_eq!(reuse, IdxMap::from([(4, x)]));
    }
}
