//! JSON documents describing object graphs.
//!
//! A document lists every object and variable under an id, and attributes
//! refer to them by id. This lets a document express shared and cyclic
//! references that plain JSON nesting cannot:
//!
//! ```json
//! {
//!   "root": "model",
//!   "objects": {
//!     "model": {"class": "Model", "attrs": {"self": {"object": "model"}, "w": {"variable": "w"}}}
//!   },
//!   "variables": {"w": {"kind": "param", "value": 1.0}}
//! }
//! ```

use std::collections::BTreeMap;

use objgraph::{Literal, NodeError, NodeRef, Object, Tree, Value, Variable, VariableRef};
use smol_str::SmolStr;
use thiserror::Error;

/// A serialized object graph.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GraphDocument {
    /// The id of the root object.
    pub root: SmolStr,
    /// Objects by id.
    #[serde(default)]
    pub objects: BTreeMap<SmolStr, ObjectDoc>,
    /// Variables by id.
    #[serde(default)]
    pub variables: BTreeMap<SmolStr, Variable>,
}

/// An object entry of a [`GraphDocument`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ObjectDoc {
    /// Class name of the object.
    pub class: SmolStr,
    /// Attributes by name.
    #[serde(default)]
    pub attrs: BTreeMap<SmolStr, AttrDoc>,
}

/// An attribute value in a [`GraphDocument`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrDoc {
    /// A reference to an object by id.
    Object(SmolStr),
    /// A reference to a variable by id.
    Variable(SmolStr),
    /// A list of values.
    List(Vec<AttrDoc>),
    /// A tuple of values.
    Tuple(Vec<AttrDoc>),
    /// A mapping from names to values.
    Dict(BTreeMap<SmolStr, AttrDoc>),
    /// A static value.
    Static(Literal),
}

/// Errors in a [`GraphDocument`].
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum DocumentError {
    /// An object id is referenced but never defined.
    #[error("Unknown object id {0:?}")]
    UnknownObject(SmolStr),
    /// A variable id is referenced but never defined.
    #[error("Unknown variable id {0:?}")]
    UnknownVariable(SmolStr),
    /// An object refused one of its attributes.
    #[error("Cannot set attribute {attr:?} of object {id:?}")]
    Attribute {
        /// The object id.
        id: SmolStr,
        /// The attribute name.
        attr: SmolStr,
        /// The underlying failure.
        #[source]
        source: NodeError,
    },
}

impl GraphDocument {
    /// Builds the live graph and returns its root.
    ///
    /// Every id becomes exactly one live object, so references to the same
    /// id share it.
    pub fn build(&self) -> Result<Value, DocumentError> {
        // Create every object first so that attributes can point anywhere,
        // including back at their owner.
        let nodes: BTreeMap<&SmolStr, NodeRef> = self
            .objects
            .iter()
            .map(|(id, obj)| (id, Object::new(obj.class.clone()).into_ref()))
            .collect();
        let variables: BTreeMap<&SmolStr, VariableRef> = self
            .variables
            .iter()
            .map(|(id, var)| (id, VariableRef::new(var.clone())))
            .collect();
        let builder = Builder { nodes, variables };

        for (id, obj) in &self.objects {
            let node = builder.node(id)?;
            for (name, attr) in &obj.attrs {
                let value = builder.value(attr)?;
                if let Some(mut target) = node.borrow_mut::<Object>() {
                    target
                        .set_attr(name.clone(), value)
                        .map_err(|source| DocumentError::Attribute {
                            id: id.clone(),
                            attr: name.clone(),
                            source,
                        })?;
                }
            }
        }
        builder.node(&self.root).map(Value::Node)
    }
}

struct Builder<'d> {
    nodes: BTreeMap<&'d SmolStr, NodeRef>,
    variables: BTreeMap<&'d SmolStr, VariableRef>,
}

impl Builder<'_> {
    fn node(&self, id: &SmolStr) -> Result<NodeRef, DocumentError> {
        self.nodes
            .get(id)
            .cloned()
            .ok_or_else(|| DocumentError::UnknownObject(id.clone()))
    }

    fn value(&self, attr: &AttrDoc) -> Result<Value, DocumentError> {
        Ok(match attr {
            AttrDoc::Object(id) => Value::Node(self.node(id)?),
            AttrDoc::Variable(id) => Value::Variable(
                self.variables
                    .get(id)
                    .cloned()
                    .ok_or_else(|| DocumentError::UnknownVariable(id.clone()))?,
            ),
            AttrDoc::List(items) => Tree::list(self.values(items)?).into(),
            AttrDoc::Tuple(items) => Tree::tuple(self.values(items)?).into(),
            AttrDoc::Dict(entries) => {
                let entries = entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.value(v)?)))
                    .collect::<Result<Vec<_>, DocumentError>>()?;
                Tree::dict(entries).into()
            }
            AttrDoc::Static(lit) => Value::Static(lit.clone()),
        })
    }

    fn values(&self, items: &[AttrDoc]) -> Result<Vec<Value>, DocumentError> {
        items.iter().map(|item| self.value(item)).collect()
    }
}

#[cfg(test)]
mod test {
    use objgraph::graph;
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn document(value: serde_json::Value) -> GraphDocument {
        serde_json::from_value(value).unwrap()
    }

    #[rstest]
    fn shared_ids_share_objects() {
        let doc = document(json!({
            "root": "model",
            "objects": {
                "model": {"class": "Model", "attrs": {
                    "a": {"object": "layer"},
                    "b": {"list": [{"object": "layer"}, {"static": 3}]},
                    "me": {"object": "model"}
                }},
                "layer": {"class": "Linear", "attrs": {"w": {"variable": "w"}}}
            },
            "variables": {"w": {"kind": "param", "value": 0.5}}
        }));
        let root = doc.build().unwrap();
        let model = root.as_node().unwrap().borrow::<Object>().unwrap().clone();
        assert_eq!(model.class(), "Model");
        assert_eq!(model.get("me"), Some(&root));
        let listed = model.get("b").unwrap().as_tree().unwrap().children()[0].clone();
        assert_eq!(model.get("a"), Some(&listed));

        // The two objects plus the list tree under "b".
        let registry = objgraph::Registry::new();
        let nodes = graph::iter_nodes(&registry, &root).unwrap();
        assert_eq!(nodes.len(), 3);
        let objects = nodes.iter().filter(|(_, node)| registry.is_graph_node(node)).count();
        assert_eq!(objects, 2);
    }

    #[rstest]
    #[case::object(json!({"root": "m", "objects": {"m": {"class": "M", "attrs": {"x": {"object": "nope"}}}}}),
        DocumentError::UnknownObject("nope".into()))]
    #[case::variable(json!({"root": "m", "objects": {"m": {"class": "M", "attrs": {"x": {"variable": "v"}}}}}),
        DocumentError::UnknownVariable("v".into()))]
    #[case::root(json!({"root": "m"}), DocumentError::UnknownObject("m".into()))]
    fn unknown_ids(#[case] value: serde_json::Value, #[case] err: DocumentError) {
        assert_eq!(document(value).build(), Err(err));
    }
}
