// tests/cardinality_grammar.rs

mod common;

use common::{fed_node, fixed_tool};
use plangraph::core::{Cardinality, CardinalitySpec};
use plangraph::errors::PlanError;
use plangraph::planning::{InputSpec, NodeId, NodeKind, OutputId, OutputSpec, PlanGraph, SOURCE_OUTPUT, ToolSpec};

/// `pick.pairs` reads the whole source and then the `out` of a node with
/// cardinality 2, so its cardinality is `N_numbers + 2`.
fn picker(output_cardinality: &str) -> (PlanGraph, NodeId, OutputId) {
    let mut graph = PlanGraph::new("net");
    let numbers = graph.create_source("Int", "numbers").unwrap();
    let two = fed_node(&mut graph, numbers, &fixed_tool("two", "2"), "two");

    let tool = ToolSpec::new("pick")
        .with_input(InputSpec::new("pairs", "Int", "1-*"))
        .with_output(OutputSpec::new("out", "Int", output_cardinality));
    let pick = graph.create_node(&tool, "pick", NodeKind::Tool).unwrap();
    let pairs = graph.node_input(pick, "pairs").unwrap();
    let source = graph.node_output(numbers, SOURCE_OUTPUT).unwrap();
    let two_out = graph.node_output(two, "out").unwrap();
    graph.append(pairs, source).unwrap();
    graph.append(pairs, two_out).unwrap();

    let out = graph.node_output(pick, "out").unwrap();
    (graph, pick, out)
}

#[test]
fn as_follows_the_whole_target() {
    let (graph, _, out) = picker("as:pairs");
    let cardinality = graph.output_cardinality(out, None).unwrap().unwrap();
    assert_eq!(cardinality.to_string(), "N_numbers + 2");
}

#[test]
fn as_index_picks_one_term_of_the_sum() {
    let (graph, _, out) = picker("as:pairs[1]");
    assert_eq!(graph.output_cardinality(out, None).unwrap(), Some(Cardinality::Concrete(2)));

    let (graph, _, out) = picker("as:pairs[0]");
    assert_eq!(
        graph.output_cardinality(out, None).unwrap(),
        Some(Cardinality::symbol("N_numbers"))
    );
}

#[test]
fn as_index_past_the_end_is_a_cardinality_error() {
    let (graph, _, out) = picker("as:pairs[4]");
    assert!(matches!(graph.output_cardinality(out, None), Err(PlanError::Cardinality(_))));
}

#[test]
fn as_naming_a_missing_input_is_reported_on_evaluation() {
    let (graph, pick, out) = picker("as:nothing");
    assert!(matches!(graph.output_cardinality(out, None), Err(PlanError::Cardinality(_))));
    // parsing succeeded; the problem only shows once evaluated
    assert!(graph.node(pick).is_ok());
}

#[test]
fn payload_dependent_outputs_have_no_planning_value() {
    let (graph, _, out) = picker("val:pairs");
    assert_eq!(graph.output_cardinality(out, None).unwrap(), None);
}

#[test]
fn input_specs_round_trip_through_state() {
    let (mut graph, pick, _) = picker("as:pairs");
    let pairs = graph.node_input(pick, "pairs").unwrap();
    graph
        .set_input_cardinality(pairs, "[1,2,4]".parse::<CardinalitySpec>().unwrap())
        .unwrap();

    let state = graph.input_state(pairs).unwrap();
    assert_eq!(state.cardinality, "[1,2,4]");
    assert_eq!(state.input_group, "default");

    graph
        .set_input_cardinality(pairs, CardinalitySpec::Any)
        .unwrap();
    graph.restore_input_state(pairs, &state).unwrap();
    assert_eq!(graph.input(pairs).unwrap().cardinality_spec(), &CardinalitySpec::Choice(vec![1, 2, 4]));
}
