//! Definitions for the core types used to address parts of an object graph.
//!
//! These types are re-exported in the root of the crate.

use std::fmt;

use derive_more::From;
use itertools::Itertools;
use smol_str::SmolStr;

/// A dense position in the identity index space of one traversal.
///
/// Mutable graph nodes and variables share the same index space; indices are
/// handed out in first-visit pre-order.
pub type Index = usize;

/// A sequence of keys leading from the root of a graph to a value.
pub type Path = Vec<Key>;

/// A single step in a [`Path`]: an attribute name or a sequence position.
#[derive(
    Clone,
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
pub enum Key {
    /// A position inside a sequence-like container.
    Int(i64),
    /// A named attribute or mapping key.
    Str(SmolStr),
}

impl Key {
    /// Returns the attribute name, if this is a string key.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Key::Str(s) => Some(s),
            Key::Int(_) => None,
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.into())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s.into())
    }
}

/// Positions past `i64::MAX` saturate to `i64::MAX`.
impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(i) => write!(f, "{i}"),
            Key::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(i) => write!(f, "{i}"),
            Key::Str(s) => f.write_str(s),
        }
    }
}

/// Render a path as `a/b/0`, the form used in error messages.
pub fn display_path(path: &[Key]) -> String {
    path.iter().join("/")
}

/// Address-based identity of a live object.
///
/// Only meaningful while the object it was taken from is alive.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ObjectId(usize);

impl ObjectId {
    pub(crate) fn from_ptr<T: ?Sized>(ptr: *const T) -> Self {
        Self(ptr as *const () as usize)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn keys_order_ints_before_strings() {
        let mut keys: Vec<Key> = vec!["b".into(), 1usize.into(), "a".into(), 0usize.into()];
        keys.sort();
        assert_eq!(display_path(&keys), "0/1/a/b");
    }

    #[test]
    fn large_positions_saturate() {
        assert_eq!(Key::from(7usize), Key::Int(7));
        if usize::BITS >= 64 {
            assert_eq!(Key::from(usize::MAX), Key::Int(i64::MAX));
        }
    }

    #[test]
    fn key_debug_quotes_names() {
        assert_eq!(format!("{:?}", Key::from("w")), "\"w\"");
        assert_eq!(format!("{:?}", Key::Int(3)), "3");
    }
}
