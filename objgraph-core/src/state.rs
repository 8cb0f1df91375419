//! Leaf tables: the dynamic half of a split graph.
//!
//! A [`State`] mirrors the nesting of the graph it was taken from: every
//! level maps an attribute name to either a leaf or the state of a child
//! node. [`FlatState`] is the same content keyed by full path, which is the
//! form predicates are evaluated on.

use std::collections::BTreeMap;

use serde_with::serde_as;

use crate::GraphError;
use crate::core::{Key, Path};
use crate::literal::Literal;
use crate::variable::{Variable, VariableKind};

/// A leaf value stored in a [`State`].
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateLeaf {
    /// A copy of a leaf cell.
    Variable(Variable),
    /// A raw static value.
    Static(Literal),
}

impl StateLeaf {
    /// Returns the variable, if this leaf is one.
    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            StateLeaf::Variable(var) => Some(var),
            StateLeaf::Static(_) => None,
        }
    }
}

impl From<Variable> for StateLeaf {
    fn from(var: Variable) -> Self {
        StateLeaf::Variable(var)
    }
}

/// One entry of a [`State`] level.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum StateEntry {
    /// A leaf value.
    Leaf(StateLeaf),
    /// The state of a child node.
    Nested(State),
}

/// Leaf table keyed by the full path of each leaf.
pub type FlatState = BTreeMap<Path, StateLeaf>;

/// Nested leaf table keyed by attribute name at each level.
///
/// Each level serializes as a sequence of `[key, entry]` pairs.
#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct State(#[serde_as(as = "Vec<(_, _)>")] BTreeMap<Key, StateEntry>);

impl State {
    /// An empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a nested state from a flat one.
    ///
    /// A path that passes through an existing leaf replaces that leaf with a
    /// nested level.
    pub fn from_flat_path(flat_state: impl IntoIterator<Item = (Path, StateLeaf)>) -> Self {
        let mut state = State::new();
        for (path, leaf) in flat_state {
            state.insert_path(&path, leaf);
        }
        state
    }

    fn insert_path(&mut self, path: &[Key], leaf: StateLeaf) {
        let Some((last, prefix)) = path.split_last() else {
            return;
        };
        let mut level = self;
        for key in prefix {
            let entry = level
                .0
                .entry(key.clone())
                .or_insert_with(|| StateEntry::Nested(State::new()));
            if let StateEntry::Leaf(_) = entry {
                *entry = StateEntry::Nested(State::new());
            }
            let StateEntry::Nested(next) = entry else {
                unreachable!("entry was just made nested")
            };
            level = next;
        }
        level.0.insert(last.clone(), StateEntry::Leaf(leaf));
    }

    /// The leaves of the state keyed by full path.
    pub fn flat_state(&self) -> FlatState {
        let mut flat = FlatState::new();
        self.collect_flat(&mut Vec::new(), &mut flat);
        flat
    }

    fn collect_flat(&self, prefix: &mut Path, flat: &mut FlatState) {
        for (key, entry) in &self.0 {
            prefix.push(key.clone());
            match entry {
                StateEntry::Leaf(leaf) => {
                    flat.insert(prefix.clone(), leaf.clone());
                }
                StateEntry::Nested(state) => state.collect_flat(prefix, flat),
            }
            prefix.pop();
        }
    }

    /// The entry stored under `key` at the top level.
    pub fn get(&self, key: &Key) -> Option<&StateEntry> {
        self.0.get(key)
    }

    /// The leaf at `path`, if there is one.
    pub fn get_path(&self, path: &[Key]) -> Option<&StateLeaf> {
        let (last, prefix) = path.split_last()?;
        let mut level = self;
        for key in prefix {
            match level.0.get(key)? {
                StateEntry::Nested(next) => level = next,
                StateEntry::Leaf(_) => return None,
            }
        }
        match level.0.get(last)? {
            StateEntry::Leaf(leaf) => Some(leaf),
            StateEntry::Nested(_) => None,
        }
    }

    /// Inserts an entry at the top level, returning the previous one.
    pub fn insert(&mut self, key: impl Into<Key>, entry: impl Into<StateEntry>) -> Option<StateEntry> {
        self.0.insert(key.into(), entry.into())
    }

    /// Whether the top level has an entry for `key`.
    pub fn contains_key(&self, key: &Key) -> bool {
        self.0.contains_key(key)
    }

    /// Iterates over the top-level entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &StateEntry)> {
        self.0.iter()
    }

    /// Iterates over the top-level keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.0.keys()
    }

    /// The number of top-level entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the state has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merges several states into one. Later states win on conflicting
    /// paths.
    pub fn merge(states: impl IntoIterator<Item = State>) -> Self {
        let mut states = states.into_iter();
        let Some(first) = states.next() else {
            return State::new();
        };
        let mut flat = first.flat_state();
        let mut merged_any = false;
        for state in states {
            merged_any = true;
            flat.extend(state.flat_state());
        }
        if merged_any {
            State::from_flat_path(flat)
        } else {
            first
        }
    }

    /// Partitions the leaves between `predicates`; the first matching
    /// predicate takes each leaf.
    ///
    /// With no predicates the state is returned whole. Leaves matched by no
    /// predicate are an error.
    pub fn split(self, predicates: &[&dyn Predicate]) -> Result<Vec<State>, GraphError> {
        if predicates.is_empty() {
            return Ok(vec![self]);
        }
        let (states, remainder) = self.partition(predicates);
        if !remainder.is_empty() {
            return Err(GraphError::NonExhaustiveFilters {
                paths: remainder.into_keys().collect(),
            });
        }
        Ok(states)
    }

    /// Like [`State::split`], but leaves matched by no predicate are dropped.
    pub fn extract(&self, predicates: &[&dyn Predicate]) -> Vec<State> {
        self.partition(predicates).0
    }

    fn partition(&self, predicates: &[&dyn Predicate]) -> (Vec<State>, FlatState) {
        let mut buckets = vec![FlatState::new(); predicates.len()];
        let mut remainder = FlatState::new();
        for (path, leaf) in self.flat_state() {
            match predicates.iter().position(|p| p.matches(&path, &leaf)) {
                Some(i) => {
                    buckets[i].insert(path, leaf);
                }
                None => {
                    remainder.insert(path, leaf);
                }
            }
        }
        let states = buckets.into_iter().map(State::from_flat_path).collect();
        (states, remainder)
    }
}

impl From<StateLeaf> for StateEntry {
    fn from(leaf: StateLeaf) -> Self {
        StateEntry::Leaf(leaf)
    }
}

impl From<Variable> for StateEntry {
    fn from(var: Variable) -> Self {
        StateEntry::Leaf(StateLeaf::Variable(var))
    }
}

impl From<Literal> for StateEntry {
    fn from(lit: Literal) -> Self {
        StateEntry::Leaf(StateLeaf::Static(lit))
    }
}

impl From<State> for StateEntry {
    fn from(state: State) -> Self {
        StateEntry::Nested(state)
    }
}

impl FromIterator<(Key, StateEntry)> for State {
    fn from_iter<I: IntoIterator<Item = (Key, StateEntry)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for State {
    type Item = (Key, StateEntry);
    type IntoIter = std::collections::btree_map::IntoIter<Key, StateEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A test deciding which bucket a leaf goes to.
pub trait Predicate {
    /// Whether the leaf at `path` is selected.
    fn matches(&self, path: &[Key], leaf: &StateLeaf) -> bool;
}

impl<F> Predicate for F
where
    F: Fn(&[Key], &StateLeaf) -> bool,
{
    fn matches(&self, path: &[Key], leaf: &StateLeaf) -> bool {
        self(path, leaf)
    }
}

/// Selects every leaf.
#[derive(Clone, Copy, Debug, Default)]
pub struct Everything;

impl Predicate for Everything {
    fn matches(&self, _path: &[Key], _leaf: &StateLeaf) -> bool {
        true
    }
}

/// Selects variables of one kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OfKind(pub VariableKind);

impl Predicate for OfKind {
    fn matches(&self, _path: &[Key], leaf: &StateLeaf) -> bool {
        leaf.as_variable().is_some_and(|var| var.kind() == &self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use cool_asserts::assert_matches;
    use rstest::{fixture, rstest};

    fn path(parts: &[&str]) -> Path {
        parts.iter().map(|&p| Key::from(p)).collect()
    }

    #[fixture]
    fn state() -> State {
        State::from_flat_path([
            (path(&["a"]), Variable::param(1i64).into()),
            (path(&["b", "c"]), Variable::batch_stat(2i64).into()),
            (path(&["b", "d"]), Variable::param(3i64).into()),
        ])
    }

    #[rstest]
    fn nesting_follows_paths(state: State) {
        assert_eq!(state.len(), 2);
        assert_matches!(state.get(&"b".into()), Some(StateEntry::Nested(b)) => {
            assert_eq!(b.len(), 2);
        });
        assert_eq!(
            state.get_path(&path(&["b", "c"])),
            Some(&StateLeaf::Variable(Variable::batch_stat(2i64)))
        );
        assert_eq!(state.get_path(&path(&["b"])), None);
        assert_eq!(State::from_flat_path(state.flat_state()), state);
    }

    #[rstest]
    fn first_matching_predicate_wins(state: State) {
        let params = OfKind(VariableKind::PARAM);
        let states = state.split(&[&params, &Everything]).unwrap();
        assert_eq!(states[0].flat_state().len(), 2);
        assert_eq!(
            states[1].flat_state().into_keys().collect::<Vec<_>>(),
            [path(&["b", "c"])]
        );
    }

    #[rstest]
    fn split_requires_exhaustive_predicates(state: State) {
        let params = OfKind(VariableKind::PARAM);
        assert_matches!(
            state.clone().split(&[&params]),
            Err(GraphError::NonExhaustiveFilters { paths }) => {
                assert_eq!(paths, [path(&["b", "c"])]);
            }
        );
        let extracted = state.extract(&[&params]);
        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0].flat_state().len(), 2);
    }

    #[rstest]
    fn split_without_predicates_is_whole(state: State) {
        assert_eq!(state.clone().split(&[]).unwrap(), vec![state]);
    }

    #[rstest]
    fn closures_are_predicates(state: State) {
        let under_b = |path: &[Key], _: &StateLeaf| path.first() == Some(&Key::from("b"));
        let states = state.extract(&[&under_b]);
        assert_eq!(states[0].flat_state().len(), 2);
    }

    #[test]
    fn later_states_win_on_merge() {
        let first = State::from_flat_path([(path(&["a"]), Variable::param(1i64).into())]);
        let second = State::from_flat_path([
            (path(&["a"]), Variable::param(5i64).into()),
            (path(&["z"]), StateLeaf::Static(Literal::Bool(true))),
        ]);
        let merged = State::merge([first, second]);
        assert_eq!(
            merged.get_path(&path(&["a"])),
            Some(&StateLeaf::Variable(Variable::param(5i64)))
        );
        assert_eq!(merged.len(), 2);
        assert!(State::merge([]).is_empty());
    }

    #[test]
    fn serde_shape() {
        let state = State::from_flat_path([
            (path(&["a"]), Variable::param(1i64).into()),
            (path(&["b", "c"]), StateLeaf::Static(Literal::Int(2))),
            (vec![Key::from("l"), Key::Int(0)], StateLeaf::Static(Literal::Int(3))),
        ]);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                ["a", {"variable": {"kind": "param", "value": 1}}],
                ["b", [["c", {"static": 2}]]],
                ["l", [[0, {"static": 3}]]]
            ])
        );
        let back: State = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
