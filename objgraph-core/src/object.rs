//! A general-purpose mutable graph node.

use std::collections::BTreeMap;

use smol_str::SmolStr;

use crate::core::Key;
use crate::epoch::Epoch;
use crate::literal::Literal;
use crate::registry::{GraphNode, NodeError};
use crate::value::{NodeRef, Value};

/// A graph node holding named attributes.
///
/// Attributes are kept sorted by name, which is also the order in which they
/// are flattened. The class name is the node's metadata, so two objects of
/// different classes produce different descriptors.
///
/// Every mutation checks that it happens in the [`Epoch`] that created the
/// object.
#[derive(Debug, Clone)]
pub struct Object {
    class: SmolStr,
    attrs: BTreeMap<SmolStr, Value>,
    epoch: Epoch,
}

impl Object {
    /// Creates an empty object of class `class`, owned by the current epoch.
    pub fn new(class: impl Into<SmolStr>) -> Self {
        Self {
            class: class.into(),
            attrs: BTreeMap::new(),
            epoch: Epoch::current(),
        }
    }

    /// Adds an attribute while building the object.
    #[must_use]
    pub fn with(mut self, name: impl Into<SmolStr>, value: impl Into<Value>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Moves the object behind a new shared handle.
    pub fn into_ref(self) -> NodeRef {
        NodeRef::new(self)
    }

    /// The class name of the object.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// The epoch that owns the object.
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// The attribute called `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    /// Whether the object has an attribute called `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    /// Iterates over the attributes in name order.
    pub fn attrs(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Sets an attribute, replacing any previous value.
    pub fn set_attr(&mut self, name: impl Into<SmolStr>, value: impl Into<Value>) -> Result<(), NodeError> {
        self.epoch.check()?;
        self.attrs.insert(name.into(), value.into());
        Ok(())
    }

    /// Removes an attribute.
    pub fn remove_attr(&mut self, name: &str) -> Result<Option<Value>, NodeError> {
        self.epoch.check()?;
        Ok(self.attrs.remove(name))
    }
}

fn attr_name(key: &Key) -> Result<&SmolStr, NodeError> {
    match key {
        Key::Str(name) => Ok(name),
        Key::Int(_) => Err(NodeError::InvalidKey(key.clone())),
    }
}

impl GraphNode for Object {
    const TYPE_NAME: &'static str = "object";

    fn flatten(&self) -> (Vec<(Key, Value)>, Literal) {
        let items = self
            .attrs
            .iter()
            .map(|(k, v)| (Key::Str(k.clone()), v.clone()))
            .collect();
        (items, Literal::Str(self.class.clone()))
    }

    fn set_key(&mut self, key: Key, value: Value) -> Result<(), NodeError> {
        self.epoch.check()?;
        let name = attr_name(&key)?;
        // An existing variable absorbs a new one in place so that outside
        // handles to it observe the update.
        if let (Some(Value::Variable(current)), Value::Variable(new)) = (self.attrs.get(name), &value) {
            if !current.ptr_eq(new) {
                current.borrow_mut().copy_from(&new.borrow())?;
            }
            return Ok(());
        }
        self.attrs.insert(name.clone(), value);
        Ok(())
    }

    fn pop_key(&mut self, key: &Key) -> Result<Value, NodeError> {
        self.epoch.check()?;
        self.attrs
            .remove(attr_name(key)?)
            .ok_or_else(|| NodeError::MissingKey(key.clone()))
    }

    fn create_empty(metadata: &Literal) -> Self {
        Self::new(metadata.as_str().unwrap_or(Self::TYPE_NAME))
    }

    fn clear(&mut self, metadata: &Literal) -> Result<(), NodeError> {
        self.epoch.check()?;
        self.attrs.clear();
        if let Some(class) = metadata.as_str() {
            self.class = class.into();
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::epoch::EpochScope;
    use crate::variable::{Variable, VariableRef};
    use cool_asserts::assert_matches;

    #[test]
    fn flatten_is_sorted_by_name() {
        let obj = Object::new("Linear").with("w", 1i64).with("b", 2i64);
        let (items, metadata) = obj.flatten();
        let keys: Vec<_> = items.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, ["b", "w"]);
        assert_eq!(metadata, Literal::from("Linear"));
    }

    #[test]
    fn set_key_absorbs_variables() {
        let held = VariableRef::new(Variable::param(1i64));
        let mut obj = Object::new("Linear").with("w", Value::Variable(held.clone()));

        obj.set_key("w".into(), Variable::param(5i64).into()).unwrap();

        assert_eq!(held.borrow().value(), Some(&Literal::Int(5)));
        let Some(Value::Variable(w)) = obj.get("w") else {
            panic!("w should still be a variable");
        };
        assert!(w.ptr_eq(&held));
    }

    #[test]
    fn integer_keys_are_rejected() {
        let mut obj = Object::new("Linear");
        assert_matches!(
            obj.set_key(Key::Int(0), 1i64.into()),
            Err(NodeError::InvalidKey(Key::Int(0)))
        );
        assert_matches!(obj.pop_key(&"missing".into()), Err(NodeError::MissingKey(_)));
    }

    #[test]
    fn mutation_outside_owning_epoch_fails() {
        let mut obj = Object::new("Linear");
        {
            let _scope = EpochScope::enter();
            assert_matches!(obj.set_attr("x", 1i64), Err(NodeError::Epoch(_)));
            let mut inner = Object::new("Inner");
            inner.set_attr("x", 1i64).unwrap();
        }
        obj.set_attr("x", 1i64).unwrap();
        assert!(obj.contains("x"));
    }

    #[test]
    fn clear_keeps_identity_and_adopts_class() {
        let mut obj = Object::new("Linear").with("w", 1i64);
        obj.clear(&Literal::from("Conv")).unwrap();
        assert_eq!(obj.class(), "Conv");
        assert_eq!(obj.attrs().count(), 0);
    }
}
