//! Live values of an object graph.
//!
//! A [`Value`] is what sits in an attribute of a node: another node (either a
//! registered mutable [`NodeRef`] or an immutable [`Tree`]), a leaf
//! [`VariableRef`], or a static [`Literal`].

use std::any::{Any, TypeId};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use derive_more::From;
use smol_str::SmolStr;

use crate::core::{Key, ObjectId};
use crate::literal::Literal;
use crate::variable::{Variable, VariableRef};

/// A shared handle to a live node of an arbitrary Rust type.
///
/// Whether the node takes part in a graph is decided by the
/// [`Registry`](crate::registry::Registry): only registered types are graph
/// nodes. Equality and hashing use the identity of the allocation.
#[derive(Clone)]
pub struct NodeRef {
    inner: Rc<RefCell<dyn Any>>,
    type_id: TypeId,
    type_name: &'static str,
}

impl NodeRef {
    /// Moves `node` behind a new shared handle.
    pub fn new<T: Any>(node: T) -> Self {
        let inner: Rc<RefCell<dyn Any>> = Rc::new(RefCell::new(node));
        Self {
            inner,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// The concrete type of the node.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The name of the concrete type of the node.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether the node is of type `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Borrows the node as a `T`, or `None` if it has another type.
    pub fn borrow<T: Any>(&self) -> Option<Ref<'_, T>> {
        Ref::filter_map(self.inner.borrow(), |node| node.downcast_ref::<T>()).ok()
    }

    /// Mutably borrows the node as a `T`, or `None` if it has another type.
    pub fn borrow_mut<T: Any>(&self) -> Option<RefMut<'_, T>> {
        RefMut::filter_map(self.inner.borrow_mut(), |node| node.downcast_mut::<T>()).ok()
    }

    pub(crate) fn borrow_any(&self) -> Ref<'_, dyn Any> {
        self.inner.borrow()
    }

    pub(crate) fn borrow_any_mut(&self) -> RefMut<'_, dyn Any> {
        self.inner.borrow_mut()
    }

    /// The identity of the shared allocation.
    pub fn id(&self) -> ObjectId {
        ObjectId::from_ptr(Rc::as_ptr(&self.inner))
    }

    /// Whether both handles point to the same node.
    pub fn ptr_eq(&self, other: &NodeRef) -> bool {
        self.id() == other.id()
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for NodeRef {}

impl std::hash::Hash for NodeRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

// Print as `NodeRef(type@address)`, never following the node's attributes.
impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeRef({}@{})", self.type_name, self.id())
    }
}

/// The container kind of a [`Tree`].
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TreeKind {
    /// A list, keyed by position.
    List,
    /// A tuple, keyed by position.
    Tuple,
    /// A mapping, keyed by sorted keys.
    Dict,
    /// A named record with fields in declaration order.
    Record(SmolStr),
}

/// The shape token of a [`Tree`]: enough to rebuild it from its children.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct TreeShape {
    kind: TreeKind,
    keys: Vec<Key>,
}

impl TreeShape {
    /// The container kind.
    pub fn kind(&self) -> &TreeKind {
        &self.kind
    }

    /// The keys of the children, in order.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }
}

/// An immutable container that is part of a graph without being registered.
///
/// Trees are never identity-tracked: they are rebuilt from their children
/// every time, and so can neither be shared nor reference themselves.
#[derive(Clone, Debug, PartialEq)]
pub struct Tree {
    shape: TreeShape,
    children: Vec<Value>,
}

impl Tree {
    fn positional(kind: TreeKind, items: impl IntoIterator<Item = Value>) -> Self {
        let children: Vec<Value> = items.into_iter().collect();
        let keys = (0..children.len()).map(Key::from).collect();
        Self {
            shape: TreeShape { kind, keys },
            children,
        }
    }

    /// A list of values.
    pub fn list(items: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self::positional(TreeKind::List, items.into_iter().map(Into::into))
    }

    /// A tuple of values.
    pub fn tuple(items: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self::positional(TreeKind::Tuple, items.into_iter().map(Into::into))
    }

    /// A mapping; entries are stored sorted by key.
    pub fn dict(entries: impl IntoIterator<Item = (impl Into<Key>, impl Into<Value>)>) -> Self {
        let mut entries: Vec<(Key, Value)> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries.dedup_by(|(a, _), (b, _)| a == b);
        let (keys, children) = entries.into_iter().unzip();
        Self {
            shape: TreeShape {
                kind: TreeKind::Dict,
                keys,
            },
            children,
        }
    }

    /// A named record; fields keep the given order.
    pub fn record(
        name: impl Into<SmolStr>,
        fields: impl IntoIterator<Item = (impl Into<Key>, impl Into<Value>)>,
    ) -> Self {
        let (keys, children) = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self {
            shape: TreeShape {
                kind: TreeKind::Record(name.into()),
                keys,
            },
            children,
        }
    }

    /// Rebuilds a tree from its shape and children given in shape order.
    ///
    /// Returns `None` if the number of children does not match the shape.
    pub fn from_shape(shape: TreeShape, children: Vec<Value>) -> Option<Self> {
        (shape.keys.len() == children.len()).then_some(Self { shape, children })
    }

    /// The shape token of the tree.
    pub fn shape(&self) -> &TreeShape {
        &self.shape
    }

    /// The children of the tree, in shape order.
    pub fn children(&self) -> &[Value] {
        &self.children
    }

    /// The child stored under `key`.
    pub fn get(&self, key: &Key) -> Option<&Value> {
        let pos = self.shape.keys.iter().position(|k| k == key)?;
        self.children.get(pos)
    }

    /// Iterates over `(key, child)` pairs in shape order.
    pub fn items(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.shape.keys.iter().zip(&self.children)
    }

    /// The number of children.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Whether the tree has no children.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// A value stored in an attribute of a graph node.
#[derive(Clone, Debug, PartialEq, From)]
pub enum Value {
    /// A node handle, a graph node if its type is registered.
    Node(NodeRef),
    /// An immutable foreign tree.
    Tree(Rc<Tree>),
    /// A leaf cell.
    Variable(VariableRef),
    /// A static value.
    Static(Literal),
}

impl Value {
    /// Wraps `node` in a new [`NodeRef`].
    pub fn node<T: Any>(node: T) -> Self {
        Value::Node(NodeRef::new(node))
    }

    /// Identity of the value, for anything that lives behind a shared handle.
    pub fn identity(&self) -> Option<ObjectId> {
        match self {
            Value::Node(node) => Some(node.id()),
            Value::Tree(tree) => Some(ObjectId::from_ptr(Rc::as_ptr(tree))),
            Value::Variable(var) => Some(var.id()),
            Value::Static(_) => None,
        }
    }

    /// Returns the node handle, if this is a node.
    pub fn as_node(&self) -> Option<&NodeRef> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    /// Returns the tree, if this is a tree.
    pub fn as_tree(&self) -> Option<&Tree> {
        match self {
            Value::Tree(tree) => Some(tree),
            _ => None,
        }
    }

    /// Returns the variable handle, if this is a leaf cell.
    pub fn as_variable(&self) -> Option<&VariableRef> {
        match self {
            Value::Variable(var) => Some(var),
            _ => None,
        }
    }

    /// Returns the literal, if this is a static value.
    pub fn as_static(&self) -> Option<&Literal> {
        match self {
            Value::Static(lit) => Some(lit),
            _ => None,
        }
    }

    /// A short description of what the value is, for error messages.
    pub fn describe(&self) -> String {
        match self {
            Value::Node(node) => format!("a node of type {}", node.type_name()),
            Value::Tree(tree) => format!("a tree ({:?})", tree.shape().kind()),
            Value::Variable(var) => format!("a variable of kind {}", var.borrow().kind()),
            Value::Static(lit) => format!("the static value {lit}"),
        }
    }
}

impl From<Tree> for Value {
    fn from(tree: Tree) -> Self {
        Value::Tree(Rc::new(tree))
    }
}

impl From<Variable> for Value {
    fn from(var: Variable) -> Self {
        Value::Variable(VariableRef::new(var))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Static(i.into())
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Static(f.into())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Static(b.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Static(s.into())
    }
}

/// An identity-tracked object: a graph node or a leaf cell.
#[derive(Clone, Debug, PartialEq, Eq, Hash, From)]
pub enum GraphRef {
    /// A mutable graph node.
    Node(NodeRef),
    /// A leaf cell.
    Variable(VariableRef),
}

impl GraphRef {
    /// The identity of the referenced object.
    pub fn id(&self) -> ObjectId {
        match self {
            GraphRef::Node(node) => node.id(),
            GraphRef::Variable(var) => var.id(),
        }
    }
}

impl From<GraphRef> for Value {
    fn from(r: GraphRef) -> Self {
        match r {
            GraphRef::Node(node) => Value::Node(node),
            GraphRef::Variable(var) => Value::Variable(var),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Counter(u32);

    #[test]
    fn node_ref_downcasts() {
        let node = NodeRef::new(Counter(1));
        assert!(node.is::<Counter>());
        assert!(node.borrow::<String>().is_none());
        node.borrow_mut::<Counter>().unwrap().0 += 1;
        assert_eq!(*node.borrow::<Counter>().unwrap(), Counter(2));
    }

    #[test]
    fn dict_sorts_keys() {
        let tree = Tree::dict([("b", 2i64), ("a", 1i64)]);
        assert_eq!(tree.shape().keys(), &[Key::from("a"), Key::from("b")]);
        assert_eq!(tree.get(&"b".into()), Some(&Value::from(2i64)));
    }

    #[test]
    fn from_shape_checks_arity() {
        let tree = Tree::tuple([1i64, 2]);
        let shape = tree.shape().clone();
        assert!(Tree::from_shape(shape.clone(), vec![Value::from(1i64)]).is_none());
        let rebuilt = Tree::from_shape(shape, tree.children().to_vec()).unwrap();
        assert_eq!(rebuilt, tree);
    }
}
