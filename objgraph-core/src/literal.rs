//! Hashable static values.
//!
//! Static fields of a node are stored verbatim in its [`NodeDef`], so they
//! take part in descriptor equality and hashing. [`Literal`] is the closed set
//! of values that can live there; it is also the payload type of a
//! [`Variable`].
//!
//! [`NodeDef`]: crate::graphdef::NodeDef
//! [`Variable`]: crate::variable::Variable

use std::fmt;

use derive_more::From;
use itertools::Itertools;
use ordered_float::OrderedFloat;
use smol_str::SmolStr;

/// A hashable, totally ordered value.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    From,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(untagged)]
pub enum Literal {
    /// The absence of a value.
    #[default]
    #[from(ignore)]
    None,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A float, ordered so that it can be hashed.
    Float(OrderedFloat<f64>),
    /// A string.
    Str(SmolStr),
    /// An ordered sequence of literals.
    Seq(Vec<Literal>),
}

impl Literal {
    /// A float literal.
    pub fn float(f: f64) -> Self {
        Literal::Float(OrderedFloat(f))
    }

    /// A sequence literal.
    pub fn seq(items: impl IntoIterator<Item = impl Into<Literal>>) -> Self {
        Literal::Seq(items.into_iter().map_into().collect())
    }

    /// Returns the string, if this is a string literal.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer, if this is an integer literal.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Literal::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<f64> for Literal {
    fn from(f: f64) -> Self {
        Literal::float(f)
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::Str(s.into())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::Str(s.into())
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::None => f.write_str("None"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(x) => write!(f, "{x}"),
            Literal::Str(s) => write!(f, "{s:?}"),
            Literal::Seq(items) => write!(f, "[{}]", items.iter().join(", ")),
        }
    }
}
