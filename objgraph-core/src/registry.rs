//! Node adapters and the registry that maps Rust types to them.
//!
//! A value takes part in a graph as a node if it is either a [`Tree`] or a
//! [`NodeRef`] whose concrete type was registered. Registered types are
//! *mutable graph nodes*: they can be created empty, filled key by key,
//! shared, and can reference themselves. Trees are *immutable tree nodes*,
//! handled by a single built-in adapter.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use smol_str::SmolStr;
use thiserror::Error;

use crate::core::Key;
use crate::epoch::EpochError;
use crate::literal::Literal;
use crate::object::Object;
use crate::value::{NodeRef, Tree, TreeShape, Value};
use crate::variable::{KindMismatch, VariableRef};

/// The declared type of a node, as recorded in a descriptor.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// A registered mutable graph node type.
    Graph(SmolStr),
    /// The built-in immutable tree type.
    Tree,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeType::Graph(name) => f.write_str(name),
            NodeType::Tree => f.write_str("tree"),
        }
    }
}

/// Per-type data needed to rebuild a node besides its children.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum NodeMetadata {
    /// Metadata chosen by a graph node adapter.
    Graph(Literal),
    /// The shape token of a tree.
    Tree(TreeShape),
}

/// Errors reported by node adapters.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum NodeError {
    /// The node does not accept this kind of key.
    #[error("Invalid key: {0:?}")]
    InvalidKey(Key),
    /// The key is not present on the node.
    #[error("Missing key: {0:?}")]
    MissingKey(Key),
    /// The node handle does not hold the type the adapter was registered for.
    #[error("Expected a node of Rust type {0}")]
    Downcast(&'static str),
    /// The node may not be mutated from the current epoch.
    #[error(transparent)]
    Epoch(#[from] EpochError),
    /// A variable could not absorb another one.
    #[error(transparent)]
    Kind(#[from] KindMismatch),
}

/// A Rust type that can act as a mutable graph node.
///
/// Implementors can be registered with [`Registry::register`].
pub trait GraphNode: Any {
    /// The name recorded for this type in descriptors.
    const TYPE_NAME: &'static str;

    /// The ordered `(key, value)` pairs of the node and its metadata.
    fn flatten(&self) -> (Vec<(Key, Value)>, Literal);

    /// Sets or replaces an attribute.
    fn set_key(&mut self, key: Key, value: Value) -> Result<(), NodeError>;

    /// Removes an attribute, returning its value.
    fn pop_key(&mut self, key: &Key) -> Result<Value, NodeError>;

    /// Creates an empty node from its metadata.
    fn create_empty(metadata: &Literal) -> Self
    where
        Self: Sized;

    /// Removes every attribute, leaving the node as if freshly created
    /// from `metadata`.
    fn clear(&mut self, metadata: &Literal) -> Result<(), NodeError>;
}

type FlattenFn = dyn Fn(&dyn Any) -> Result<(Vec<(Key, Value)>, Literal), NodeError>;
type SetKeyFn = dyn Fn(&mut dyn Any, Key, Value) -> Result<(), NodeError>;
type PopKeyFn = dyn Fn(&mut dyn Any, &Key) -> Result<Value, NodeError>;
type CreateEmptyFn = dyn Fn(&Literal) -> NodeRef;
type ClearFn = dyn Fn(&mut dyn Any, &Literal) -> Result<(), NodeError>;

/// Adapter for a registered mutable graph node type.
pub struct GraphNodeImpl {
    node_type: NodeType,
    type_id: TypeId,
    flatten: Box<FlattenFn>,
    set_key: Box<SetKeyFn>,
    pop_key: Box<PopKeyFn>,
    create_empty: Box<CreateEmptyFn>,
    clear: Box<ClearFn>,
}

impl GraphNodeImpl {
    fn new<T: Any>(
        name: SmolStr,
        flatten: fn(&T) -> (Vec<(Key, Value)>, Literal),
        set_key: fn(&mut T, Key, Value) -> Result<(), NodeError>,
        pop_key: fn(&mut T, &Key) -> Result<Value, NodeError>,
        create_empty: fn(&Literal) -> T,
        clear: fn(&mut T, &Literal) -> Result<(), NodeError>,
    ) -> Self {
        let downcast_err = || NodeError::Downcast(std::any::type_name::<T>());
        Self {
            node_type: NodeType::Graph(name),
            type_id: TypeId::of::<T>(),
            flatten: Box::new(move |node: &dyn Any| {
                node.downcast_ref::<T>().map(flatten).ok_or_else(downcast_err)
            }),
            set_key: Box::new(move |node: &mut dyn Any, key: Key, value: Value| {
                set_key(node.downcast_mut::<T>().ok_or_else(downcast_err)?, key, value)
            }),
            pop_key: Box::new(move |node: &mut dyn Any, key: &Key| {
                pop_key(node.downcast_mut::<T>().ok_or_else(downcast_err)?, key)
            }),
            create_empty: Box::new(move |metadata: &Literal| NodeRef::new(create_empty(metadata))),
            clear: Box::new(move |node: &mut dyn Any, metadata: &Literal| {
                clear(node.downcast_mut::<T>().ok_or_else(downcast_err)?, metadata)
            }),
        }
    }

    /// The node type this adapter handles.
    pub fn node_type(&self) -> &NodeType {
        &self.node_type
    }

    /// The ordered `(key, value)` pairs of `node` and its metadata.
    pub fn flatten(&self, node: &NodeRef) -> Result<(Vec<(Key, Value)>, Literal), NodeError> {
        (self.flatten)(&*node.borrow_any())
    }

    /// Sets an attribute of `node`.
    pub fn set_key(&self, node: &NodeRef, key: Key, value: Value) -> Result<(), NodeError> {
        (self.set_key)(&mut *node.borrow_any_mut(), key, value)
    }

    /// Removes an attribute of `node`.
    pub fn pop_key(&self, node: &NodeRef, key: &Key) -> Result<Value, NodeError> {
        (self.pop_key)(&mut *node.borrow_any_mut(), key)
    }

    /// Creates an empty node.
    pub fn create_empty(&self, metadata: &Literal) -> NodeRef {
        (self.create_empty)(metadata)
    }

    /// Empties `node` so that it can be refilled.
    pub fn clear(&self, node: &NodeRef, metadata: &Literal) -> Result<(), NodeError> {
        (self.clear)(&mut *node.borrow_any_mut(), metadata)
    }

    /// Sets each `(key, value)` pair on `node`, in order.
    pub fn init(
        &self,
        node: &NodeRef,
        items: impl IntoIterator<Item = (Key, Value)>,
    ) -> Result<(), (Key, NodeError)> {
        for (key, value) in items {
            self.set_key(node, key.clone(), value)
                .map_err(|err| (key, err))?;
        }
        Ok(())
    }
}

impl fmt::Debug for GraphNodeImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphNodeImpl")
            .field("node_type", &self.node_type)
            .finish_non_exhaustive()
    }
}

/// Adapter for the built-in immutable [`Tree`] type.
#[derive(Clone, Copy, Debug, Default)]
pub struct TreeImpl;

impl TreeImpl {
    /// The children of `tree` keyed by position or key, and its shape.
    pub fn flatten(&self, tree: &Tree) -> (Vec<(Key, Value)>, TreeShape) {
        let items = tree.items().map(|(k, v)| (k.clone(), v.clone())).collect();
        (items, tree.shape().clone())
    }

    /// Rebuilds a tree from `shape` and children given in shape order.
    pub fn unflatten(&self, items: Vec<(Key, Value)>, shape: &TreeShape) -> Option<Tree> {
        Tree::from_shape(shape.clone(), items.into_iter().map(|(_, v)| v).collect())
    }
}

/// A node paired with the adapter that handles it.
#[derive(Clone, Copy, Debug)]
pub enum NodeView<'r, 'v> {
    /// A registered mutable graph node.
    Graph(&'r GraphNodeImpl, &'v NodeRef),
    /// An immutable tree.
    Tree(&'v Tree),
}

impl NodeView<'_, '_> {
    /// The declared type of the node.
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeView::Graph(imp, _) => imp.node_type().clone(),
            NodeView::Tree(_) => NodeType::Tree,
        }
    }

    /// Whether the node is an immutable tree.
    pub fn is_tree(&self) -> bool {
        matches!(self, NodeView::Tree(_))
    }

    /// The ordered `(key, value)` pairs of the node and its metadata.
    pub fn flatten(&self) -> Result<(Vec<(Key, Value)>, NodeMetadata), NodeError> {
        match self {
            NodeView::Graph(imp, node) => {
                let (items, metadata) = imp.flatten(node)?;
                Ok((items, NodeMetadata::Graph(metadata)))
            }
            NodeView::Tree(tree) => {
                let (items, shape) = TreeImpl.flatten(tree);
                Ok((items, NodeMetadata::Tree(shape)))
            }
        }
    }

    /// The attributes of the node as a map, in flatten order.
    pub fn node_dict(&self) -> Result<IndexMap<Key, Value>, NodeError> {
        Ok(self.flatten()?.0.into_iter().collect())
    }
}

/// How the registry classifies a value.
#[derive(Clone, Copy, Debug)]
pub enum Classified<'r, 'v> {
    /// A leaf cell. Never a node.
    Variable(&'v VariableRef),
    /// A node, mutable or immutable.
    Node(NodeView<'r, 'v>),
    /// A static value.
    Static(&'v Literal),
}

/// The adapter registered for a [`NodeType`].
#[derive(Clone, Copy, Debug)]
pub enum NodeImpl<'r> {
    /// A registered mutable graph node type.
    Graph(&'r GraphNodeImpl),
    /// The built-in tree adapter.
    Tree(TreeImpl),
}

/// Table of the mutable graph node types known to the engine.
///
/// A registry is an explicit value: every engine call takes one. Keep one per
/// thread; node handles are not `Send`.
pub struct Registry {
    impls: IndexMap<SmolStr, GraphNodeImpl>,
    by_type: HashMap<TypeId, SmolStr>,
}

/// Errors raised while registering node types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// The name is already bound to a different Rust type.
    #[error("Node type name {0} is already registered for a different type")]
    DuplicateNodeType(SmolStr),
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.impls.keys()).finish()
    }
}

impl Registry {
    /// A registry with the built-in [`Object`] node type.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry
            .register::<Object>()
            .expect("empty registry cannot hold a conflicting name");
        registry
    }

    /// A registry with no node types.
    pub fn empty() -> Self {
        Self {
            impls: IndexMap::new(),
            by_type: HashMap::new(),
        }
    }

    /// Registers a mutable graph node type from its adapter functions.
    ///
    /// Registering the same Rust type again replaces its adapter.
    pub fn register_graph_node_type<T: Any>(
        &mut self,
        name: impl Into<SmolStr>,
        flatten: fn(&T) -> (Vec<(Key, Value)>, Literal),
        set_key: fn(&mut T, Key, Value) -> Result<(), NodeError>,
        pop_key: fn(&mut T, &Key) -> Result<Value, NodeError>,
        create_empty: fn(&Literal) -> T,
        clear: fn(&mut T, &Literal) -> Result<(), NodeError>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        let type_id = TypeId::of::<T>();
        if let Some(existing) = self.impls.get(&name) {
            if existing.type_id != type_id {
                return Err(RegistryError::DuplicateNodeType(name));
            }
        }
        if let Some(old_name) = self.by_type.insert(type_id, name.clone()) {
            if old_name != name {
                self.impls.shift_remove(&old_name);
            }
        }
        tracing::debug!(node_type = %name, rust_type = std::any::type_name::<T>(), "registered graph node type");
        let imp = GraphNodeImpl::new(name.clone(), flatten, set_key, pop_key, create_empty, clear);
        self.impls.insert(name, imp);
        Ok(())
    }

    /// Registers a type implementing [`GraphNode`] under its
    /// [`GraphNode::TYPE_NAME`].
    pub fn register<T: GraphNode>(&mut self) -> Result<(), RegistryError> {
        self.register_graph_node_type(
            T::TYPE_NAME,
            T::flatten,
            T::set_key,
            T::pop_key,
            T::create_empty,
            T::clear,
        )
    }

    /// Classifies a value: leaf cell, node, or static value.
    ///
    /// Returns `None` for a node handle whose type is not registered.
    pub fn classify<'v>(&self, value: &'v Value) -> Option<Classified<'_, 'v>> {
        match value {
            Value::Variable(var) => Some(Classified::Variable(var)),
            Value::Static(lit) => Some(Classified::Static(lit)),
            Value::Tree(tree) => Some(Classified::Node(NodeView::Tree(tree))),
            Value::Node(node) => {
                let imp = self.graph_impl(node)?;
                Some(Classified::Node(NodeView::Graph(imp, node)))
            }
        }
    }

    /// The node view of `value`, or `None` if it is not a node.
    pub fn node_view<'v>(&self, value: &'v Value) -> Option<NodeView<'_, 'v>> {
        match self.classify(value)? {
            Classified::Node(view) => Some(view),
            _ => None,
        }
    }

    fn graph_impl(&self, node: &NodeRef) -> Option<&GraphNodeImpl> {
        let name = self.by_type.get(&node.type_id())?;
        self.impls.get(name)
    }

    /// Whether `value` is a node, mutable or immutable.
    pub fn is_node(&self, value: &Value) -> bool {
        self.node_view(value).is_some()
    }

    /// Whether `value` is a registered mutable graph node.
    pub fn is_graph_node(&self, value: &Value) -> bool {
        matches!(self.node_view(value), Some(NodeView::Graph(..)))
    }

    /// Whether descriptors may name `node_type`.
    pub fn is_node_type(&self, node_type: &NodeType) -> bool {
        self.impl_for_type(node_type).is_some()
    }

    /// The adapter for a declared node type.
    pub fn impl_for_type(&self, node_type: &NodeType) -> Option<NodeImpl<'_>> {
        match node_type {
            NodeType::Graph(name) => self.impls.get(name).map(NodeImpl::Graph),
            NodeType::Tree => Some(NodeImpl::Tree(TreeImpl)),
        }
    }

    /// The registered type of a node handle, if any.
    pub fn node_type_of(&self, node: &NodeRef) -> Option<&NodeType> {
        self.graph_impl(node).map(GraphNodeImpl::node_type)
    }

    /// Iterates over the registered node type names, in registration order.
    pub fn node_types(&self) -> impl Iterator<Item = &str> {
        self.impls.keys().map(SmolStr::as_str)
    }
}
