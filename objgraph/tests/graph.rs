//! Integration tests for splitting, merging and updating object graphs.

use std::hash::{BuildHasher, RandomState};

use cool_asserts::assert_matches;
use objgraph::graph;
use objgraph::state::{Everything, OfKind};
use objgraph::{
    EpochScope, GraphDef, GraphError, Literal, NodeError, Object, Registry, State, Tree, Value,
    Variable, VariableKind, VariableRef,
};
use proptest::prelude::*;
use rstest::{fixture, rstest};

#[fixture]
fn registry() -> Registry {
    Registry::new()
}

fn node(obj: Object) -> Value {
    Value::Node(obj.into_ref())
}

fn attr(value: &Value, name: &str) -> Value {
    value
        .as_node()
        .and_then(|n| n.borrow::<Object>()?.get(name).cloned())
        .unwrap_or_else(|| panic!("missing attribute {name}"))
}

/// A layer whose weight is shared with whoever passes it in.
fn tied_layer(weight: &VariableRef) -> Value {
    node(
        Object::new("Embed")
            .with("weight", Value::Variable(weight.clone()))
            .with("dim", 16i64),
    )
}

#[rstest]
fn tied_weights_survive_a_round_trip(registry: Registry) {
    let weight = VariableRef::new(Variable::param(Literal::seq([1i64, 2, 3])));
    let model = node(
        Object::new("LanguageModel")
            .with("embed", tied_layer(&weight))
            .with("unembed", tied_layer(&weight)),
    );

    let copy = graph::clone_graph(&registry, &model).unwrap();
    let embed = attr(&attr(&copy, "embed"), "weight");
    let unembed = attr(&attr(&copy, "unembed"), "weight");
    assert_eq!(embed, unembed);
    assert_ne!(embed, Value::Variable(weight.clone()));

    // Writing through one handle is seen through the other.
    embed.as_variable().unwrap().borrow_mut().set_value(7i64);
    assert_eq!(
        unembed.as_variable().unwrap().borrow().value(),
        Some(&Literal::Int(7))
    );
    assert_eq!(weight.borrow().value(), Some(&Literal::seq([1i64, 2, 3])));
}

#[rstest]
fn cycles_through_several_nodes(registry: Registry) {
    let parent = Object::new("Parent").into_ref();
    let child = Object::new("Child").with("parent", parent.clone()).into_ref();
    parent
        .borrow_mut::<Object>()
        .unwrap()
        .set_attr("child", child)
        .unwrap();
    let root = Value::Node(parent);

    let copy = graph::clone_graph(&registry, &root).unwrap();
    assert_eq!(attr(&attr(&copy, "child"), "parent"), copy);
}

#[rstest]
fn split_state_serializes(registry: Registry) {
    let model = node(
        Object::new("BatchNorm")
            .with("scale", Variable::param(1.5))
            .with("mean", Variable::batch_stat(0.0))
            .with("axes", Tree::tuple([0i64, 1])),
    );
    let params = OfKind(VariableKind::PARAM);
    let (graphdef, states) = graph::split(&registry, &model, &[&params, &Everything]).unwrap();

    let json = serde_json::to_string(&(graphdef.clone(), states.clone())).unwrap();
    let (graphdef2, states2): (GraphDef, Vec<State>) = serde_json::from_str(&json).unwrap();
    assert_eq!(graphdef2, graphdef);
    assert_eq!(states2, states);

    let copy = graph::merge(&registry, &graphdef2, states2).unwrap();
    assert_eq!(
        attr(&copy, "axes"),
        Value::from(Tree::tuple([0i64, 1]))
    );
}

#[rstest]
fn pop_then_update_restores_leaves(registry: Registry) {
    let model = node(
        Object::new("Model")
            .with("w", Variable::param(1i64))
            .with("count", Variable::batch_stat(4i64)),
    );
    let stats = OfKind(VariableKind::BATCH_STAT);
    let popped = graph::pop(&registry, &model, &[&stats]).unwrap();
    assert!(!model.as_node().unwrap().borrow::<Object>().unwrap().contains("count"));

    graph::update(&registry, &model, popped).unwrap();
    let count = attr(&model, "count");
    assert_eq!(
        count.as_variable().unwrap().borrow().value(),
        Some(&Literal::Int(4))
    );
}

#[rstest]
fn transformed_copies_write_back(registry: Registry) {
    let model = node(Object::new("Counter").with("n", Variable::batch_stat(0i64)));
    let held = attr(&model, "n");

    let (refmap, graphdef, states) = graph::full_split(&registry, &model, &[], None).unwrap();
    let new_graphdef;
    let new_states;
    {
        // Work on a copy inside its own epoch; the original is read-only there.
        let _scope = EpochScope::enter();
        let (copy, idxmap) = graph::full_merge(&registry, &graphdef, states).unwrap();
        assert_matches!(
            model
                .as_node()
                .unwrap()
                .borrow_mut::<Object>()
                .unwrap()
                .set_attr("n", 1i64),
            Err(NodeError::Epoch(_))
        );
        let step = attr(&copy, "n");
        step.as_variable().unwrap().borrow_mut().set_value(1i64);
        let (_, def, states) = graph::full_split(&registry, &copy, &[], Some(&idxmap)).unwrap();
        new_graphdef = def;
        new_states = states;
    }

    let updated = graph::full_update(&registry, &refmap, &new_graphdef, new_states).unwrap();
    assert_eq!(updated, model);
    assert_eq!(
        held.as_variable().unwrap().borrow().value(),
        Some(&Literal::Int(1))
    );
}

#[rstest]
fn update_on_tree_fails(registry: Registry) {
    let model = node(Object::new("Model").with("pair", Tree::tuple([1i64, 2])));
    let mut pair = State::new();
    pair.insert(objgraph::Key::Int(2), Literal::Int(3));
    let mut state = State::new();
    state.insert("pair", pair);
    assert_matches!(
        graph::update(&registry, &model, [state]),
        Err(GraphError::Immutable { .. })
    );
}

/// The shape of a generated graph.
#[derive(Clone, Debug)]
enum Shape {
    Param,
    Stat,
    Static(i64),
    Object(Vec<Shape>),
    List(Vec<Shape>),
}

fn any_shape() -> impl Strategy<Value = Shape> {
    let leaf = prop_oneof![
        Just(Shape::Param),
        Just(Shape::Stat),
        (-5i64..5).prop_map(Shape::Static),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Shape::Object),
            prop::collection::vec(inner, 0..4).prop_map(Shape::List),
        ]
    })
}

/// Builds a graph of the given shape, numbering leaf payloads from `next`.
fn build(shape: &Shape, next: &mut i64) -> Value {
    match shape {
        Shape::Param | Shape::Stat => {
            *next += 1;
            let kind = match shape {
                Shape::Param => VariableKind::PARAM,
                _ => VariableKind::BATCH_STAT,
            };
            Variable::new(kind, *next).into()
        }
        Shape::Static(i) => Value::from(*i),
        Shape::Object(children) => {
            let obj = children
                .iter()
                .enumerate()
                .fold(Object::new("Node"), |obj, (i, child)| {
                    obj.with(format!("f{i}"), build(child, next))
                });
            node(obj)
        }
        Shape::List(children) => Tree::list(children.iter().map(|c| build(c, next))).into(),
    }
}

fn build_root(shape: &Shape, first: i64) -> Value {
    let mut next = first;
    node(Object::new("Root").with("body", build(shape, &mut next)))
}

proptest! {
    #[test]
    fn descriptors_only_depend_on_shape(shape in any_shape()) {
        let registry = Registry::new();
        let (a, _) = graph::split(&registry, &build_root(&shape, 0), &[]).unwrap();
        let (b, _) = graph::split(&registry, &build_root(&shape, 1000), &[]).unwrap();
        prop_assert_eq!(&a, &b);
        let hasher = RandomState::new();
        prop_assert_eq!(hasher.hash_one(&a), hasher.hash_one(&b));
    }

    #[test]
    fn split_merge_round_trip(shape in any_shape()) {
        let registry = Registry::new();
        let root = build_root(&shape, 0);
        let (graphdef, states) = graph::split(&registry, &root, &[]).unwrap();
        let copy = graph::merge(&registry, &graphdef, states.clone()).unwrap();
        let (graphdef2, states2) = graph::split(&registry, &copy, &[]).unwrap();
        prop_assert_eq!(graphdef2, graphdef);
        prop_assert_eq!(states2, states);
    }
}
