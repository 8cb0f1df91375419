//! Flatten and rebuild cyclic object graphs while preserving identity.
//!
//! This crate contains the core definitions and engines of objgraph.
//! See the [top-level crate documentation](https://docs.rs/objgraph/latest/objgraph/) for more information.

pub mod core;
pub mod epoch;
pub mod error;
pub mod graph;
pub mod graphdef;
pub mod literal;
pub mod object;
pub mod refmap;
pub mod registry;
pub mod state;
pub mod value;
pub mod variable;

pub use crate::core::{Index, Key, ObjectId, Path};
pub use crate::epoch::{Epoch, EpochScope};
pub use crate::error::GraphError;
pub use crate::graphdef::{DefOrRef, GraphDef, NodeDef, VariableDef};
pub use crate::literal::Literal;
pub use crate::object::Object;
pub use crate::refmap::{IdxMap, IndexMapping, RefMap};
pub use crate::registry::{GraphNode, NodeError, NodeType, Registry};
pub use crate::state::{State, StateEntry, StateLeaf};
pub use crate::value::{GraphRef, NodeRef, Tree, Value};
pub use crate::variable::{Variable, VariableKind, VariableRef};
