//! Leaf cells of an object graph.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use derive_more::Display;
use smol_str::SmolStr;
use thiserror::Error;

use crate::core::ObjectId;
use crate::graphdef::VariableDef;
use crate::literal::Literal;

/// Descriptive metadata attached to a [`Variable`], excluding its payload.
pub type Metadata = BTreeMap<SmolStr, Literal>;

/// The declared type of a [`Variable`].
#[derive(
    Clone,
    Debug,
    Display,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct VariableKind(SmolStr);

impl VariableKind {
    /// Trainable parameters.
    pub const PARAM: VariableKind = VariableKind::new_inline("param");
    /// Running statistics updated outside of optimisation.
    pub const BATCH_STAT: VariableKind = VariableKind::new_inline("batch_stat");
    /// Values recorded while running a computation.
    pub const INTERMEDIATE: VariableKind = VariableKind::new_inline("intermediate");

    /// Creates a new variable kind.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self(name.into())
    }

    /// Creates a new variable kind at compile time.
    ///
    /// Panics if the name is longer than 23 bytes.
    pub const fn new_inline(name: &str) -> Self {
        Self(SmolStr::new_inline(name))
    }

    /// The name of the kind.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Error raised when absorbing a variable of a different kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Expected a variable of kind {expected}, but got one of kind {found}")]
pub struct KindMismatch {
    /// The kind of the receiving variable.
    pub expected: VariableKind,
    /// The kind of the offered variable.
    pub found: VariableKind,
}

/// A boxed terminal value with copy/merge semantics.
///
/// A variable with no payload is an empty placeholder; this is what gets
/// created when a graph is rebuilt without a value for a leaf.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Variable {
    kind: VariableKind,
    #[serde(default)]
    value: Option<Literal>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    metadata: Metadata,
}

impl Variable {
    /// Creates a new variable holding `value`.
    pub fn new(kind: VariableKind, value: impl Into<Literal>) -> Self {
        Self {
            kind,
            value: Some(value.into()),
            metadata: Metadata::new(),
        }
    }

    /// Creates a [`VariableKind::PARAM`] variable.
    pub fn param(value: impl Into<Literal>) -> Self {
        Self::new(VariableKind::PARAM, value)
    }

    /// Creates a [`VariableKind::BATCH_STAT`] variable.
    pub fn batch_stat(value: impl Into<Literal>) -> Self {
        Self::new(VariableKind::BATCH_STAT, value)
    }

    /// Creates a variable with no payload.
    pub fn empty(kind: VariableKind) -> Self {
        Self {
            kind,
            value: None,
            metadata: Metadata::new(),
        }
    }

    /// Rebuilds a variable from its definition and a payload.
    pub fn from_def(def: &VariableDef, value: Option<Literal>) -> Self {
        Self {
            kind: def.kind().clone(),
            value,
            metadata: def.metadata().clone(),
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<SmolStr>, value: impl Into<Literal>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The declared kind of the variable.
    pub fn kind(&self) -> &VariableKind {
        &self.kind
    }

    /// The payload, or `None` for an empty placeholder.
    pub fn value(&self) -> Option<&Literal> {
        self.value.as_ref()
    }

    /// Replaces the payload.
    pub fn set_value(&mut self, value: impl Into<Literal>) {
        self.value = Some(value.into());
    }

    /// Whether the variable is an empty placeholder.
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }

    /// The metadata of the variable.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Two variables are compatible if they have the same kind and metadata.
    pub fn is_compatible(&self, other: &Variable) -> bool {
        self.kind == other.kind && self.metadata == other.metadata
    }

    /// Absorbs the payload and metadata of `other` in place.
    pub fn copy_from(&mut self, other: &Variable) -> Result<(), KindMismatch> {
        if self.kind != other.kind {
            return Err(KindMismatch {
                expected: self.kind.clone(),
                found: other.kind.clone(),
            });
        }
        self.value.clone_from(&other.value);
        self.metadata.clone_from(&other.metadata);
        Ok(())
    }

    /// Absorbs the metadata of `def` and replaces the payload with `value`.
    pub fn copy_from_def(&mut self, def: &VariableDef, value: Option<Literal>) {
        self.metadata.clone_from(def.metadata());
        self.value = value;
    }
}

/// A shared handle to a live [`Variable`].
///
/// Equality and hashing use the identity of the allocation, not the
/// contents of the variable.
#[derive(Clone)]
pub struct VariableRef(Rc<RefCell<Variable>>);

impl VariableRef {
    /// Moves `variable` behind a new shared handle.
    pub fn new(variable: Variable) -> Self {
        Self(Rc::new(RefCell::new(variable)))
    }

    /// Immutably borrows the variable.
    pub fn borrow(&self) -> Ref<'_, Variable> {
        self.0.borrow()
    }

    /// Mutably borrows the variable.
    pub fn borrow_mut(&self) -> RefMut<'_, Variable> {
        self.0.borrow_mut()
    }

    /// The identity of the shared allocation.
    pub fn id(&self) -> ObjectId {
        ObjectId::from_ptr(Rc::as_ptr(&self.0))
    }

    /// Whether both handles point to the same variable.
    pub fn ptr_eq(&self, other: &VariableRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl From<Variable> for VariableRef {
    fn from(variable: Variable) -> Self {
        Self::new(variable)
    }
}

impl PartialEq for VariableRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for VariableRef {}

impl std::hash::Hash for VariableRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for VariableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(var) => write!(f, "VariableRef({:?}@{})", *var, self.id()),
            Err(_) => write!(f, "VariableRef(<borrowed>@{})", self.id()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn copy_from_absorbs_in_place() {
        let shared = VariableRef::new(Variable::param(1i64));
        let alias = shared.clone();
        let update = Variable::param(99i64).with_metadata("sharding", "x");

        shared.borrow_mut().copy_from(&update).unwrap();

        assert_eq!(alias.borrow().value(), Some(&Literal::Int(99)));
        assert_eq!(alias.borrow().metadata()["sharding"], Literal::from("x"));
    }

    #[test]
    fn copy_from_rejects_other_kind() {
        let mut var = Variable::param(1i64);
        let err = var.copy_from(&Variable::batch_stat(2i64)).unwrap_err();
        assert_eq!(err.expected, VariableKind::PARAM);
        assert_eq!(err.found, VariableKind::BATCH_STAT);
        assert_eq!(var.value(), Some(&Literal::Int(1)));
    }

    #[test]
    fn compatibility_ignores_payload() {
        let a = Variable::param(1i64).with_metadata("axis", 0i64);
        let b = Variable::param(2i64).with_metadata("axis", 0i64);
        let c = Variable::param(1i64).with_metadata("axis", 1i64);
        assert!(a.is_compatible(&b));
        assert!(!a.is_compatible(&c));
    }

    #[test]
    fn identity_is_by_allocation() {
        let a = VariableRef::new(Variable::param(1i64));
        let b = VariableRef::new(Variable::param(1i64));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
