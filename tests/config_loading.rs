// tests/config_loading.rs

mod common;

use std::io::Write;

use common::{NetworkBuilder, ToolBuilder, init_tracing};
use plangraph::config::{NetworkConfig, load_and_validate, load_from_path, save_to_path};
use plangraph::core::{Cardinality, RawValue};
use plangraph::errors::PlanError;
use plangraph::planning::CollapseDim;
use tempfile::NamedTempFile;

fn adder() -> plangraph::config::ToolConfig {
    ToolBuilder::new()
        .input("left", "Int", "1-*")
        .optional_input("right", "Int", "as:left")
        .output("result", "Int", "as:left")
        .build()
}

#[test]
fn link_cycle_returns_structured_error() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[tool.pass]
inputs = [{{ id = "in", datatype = "Int" }}]
outputs = [{{ id = "out", datatype = "Int" }}]

[node.A]
tool = "pass"

[node.B]
tool = "pass"

[[link]]
source = "A/out"
target = "B/in"

[[link]]
source = "B/out"
target = "A/in"
"#
    )
    .unwrap();

    match load_and_validate(file.path()) {
        Err(PlanError::Config(msg)) => {
            assert!(msg.contains("cycle detected"), "{msg}");
            assert!(msg.contains('A') || msg.contains('B'));
        }
        Err(e) => panic!("Expected Config error, got: {e:?}"),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn malformed_cardinality_is_rejected_with_the_offending_string() {
    let raw = NetworkBuilder::new("net")
        .with_tool(
            "broken",
            ToolBuilder::new().input("in", "Int", "1--2").output("out", "Int", "1").build(),
        )
        .raw();

    let err = NetworkConfig::try_from(raw).unwrap_err();
    assert!(err.to_string().contains("1--2"), "{err}");
}

#[test]
fn unknown_link_target_is_rejected() {
    let raw = NetworkBuilder::new("net")
        .with_tool("adder", adder())
        .with_source("numbers", "Int")
        .with_node("add", "adder")
        .with_link("numbers/output", "add/middle")
        .raw();

    assert!(matches!(NetworkConfig::try_from(raw), Err(PlanError::Config(_))));
}

#[test]
fn built_network_reports_planning_cardinalities() {
    init_tracing();
    let mut graph = NetworkBuilder::new("demo")
        .with_tool("adder", adder())
        .with_source("numbers", "Int")
        .with_node("add", "adder")
        .with_link("numbers/output", "add/left")
        .with_constant("add/left", vec![RawValue::from(1i64), RawValue::from(2i64)])
        .build_graph();

    let add = graph.node_by_name("add").unwrap();
    let result = graph.node_output(add, "result").unwrap();
    let cardinality = graph.output_cardinality(result, None).unwrap().unwrap();
    // one term per entry of `left`; constants stay symbolic while planning
    assert!(matches!(cardinality, Cardinality::Sum(ref terms) if terms.len() == 2));
    assert!(cardinality.to_string().starts_with("N_numbers + N_"), "{cardinality}");

    // two constant samples cannot broadcast against the unsized source
    match graph.check_ready() {
        Err(PlanError::NotReady(messages)) => {
            assert!(messages.iter().any(|m| m.contains("sizes do not match")), "{messages:?}");
        }
        other => panic!("expected NotReady, got {other:?}"),
    }
}

#[test]
fn collapse_options_survive_a_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Network.toml");

    let graph = NetworkBuilder::new("demo")
        .with_tool("adder", adder())
        .with_source("numbers", "Int")
        .with_node("add", "adder")
        .with_collapsed_link("numbers/output", "add/left", &[CollapseDim::from("numbers")])
        .build_graph();

    let snapshot = graph.to_config().unwrap();
    save_to_path(&snapshot, &path).unwrap();

    let loaded = load_from_path(&path).unwrap();
    assert_eq!(loaded, snapshot);
    assert_eq!(loaded.link[0].collapse, vec![CollapseDim::Name("numbers".into())]);

    let rebuilt = load_and_validate(&path).unwrap().build().unwrap();
    let (_, link) = rebuilt.links().next().unwrap();
    assert_eq!(link.collapse(), [CollapseDim::Name("numbers".into())]);
}
