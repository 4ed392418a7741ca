#![allow(dead_code)]

use plangraph::planning::{InputSpec, NodeId, NodeKind, OutputSpec, PlanGraph, SOURCE_OUTPUT, ToolSpec};

pub use plangraph_test_utils::builders::{NetworkBuilder, ToolBuilder};
pub use plangraph_test_utils::init_tracing;

/// A tool with one `Int` input accepting anything and one `Int` output of
/// the given cardinality.
pub fn fixed_tool(name: &str, cardinality: &str) -> ToolSpec {
    ToolSpec::new(name)
        .with_input(InputSpec::new("in", "Int", "*"))
        .with_output(OutputSpec::new("out", "Int", cardinality))
}

/// Create a node from `tool` whose `in` reads the whole output of `source`.
pub fn fed_node(graph: &mut PlanGraph, source: NodeId, tool: &ToolSpec, name: &str) -> NodeId {
    let node = graph.create_node(tool, name, NodeKind::Tool).unwrap();
    let input = graph.node_input(node, "in").unwrap();
    let output = graph.node_output(source, SOURCE_OUTPUT).unwrap();
    graph.append(input, output).unwrap();
    node
}
