// src/config/build.rs

//! Turning a checked description into a [`PlanGraph`], and back.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::model::{
    ConstantValues, DatatypeConfig, LinkConfig, NetworkConfig, NetworkSection, NodeConfig, RawNetworkConfig,
    SourceRef, TargetRef, ToolConfig,
};
use crate::errors::{PlanError, Result};
use crate::planning::graph::PlanGraph;
use crate::planning::ids::{InputId, NodeId, SubInputId};
use crate::planning::input::{InputEntry, InputKey, SubInputParent};
use crate::planning::link::{LinkSource, LinkValue, Linked};
use crate::planning::node::{DEFAULT_INPUT_GROUP, InputSpec, NodeKind, OutputSpec, SOURCE_OUTPUT};
use crate::planning::output::OutputIndex;
use crate::planning::session::PlanningSession;

impl NetworkConfig {
    pub fn build(&self) -> Result<PlanGraph> {
        self.build_with_session(PlanningSession::new())
    }

    /// Build the graph with updates suspended, then run a single round over
    /// the finished graph.
    pub fn build_with_session(&self, session: Arc<PlanningSession>) -> Result<PlanGraph> {
        let mut graph = PlanGraph::with_session(self.network.id.as_str(), session);
        graph.set_updating(false);

        for (name, parent) in &self.datatypes {
            graph.register_datatype(name, parent)?;
        }
        graph.set_preferred_types(self.network.preferred_types.clone())?;

        for (name, node) in &self.nodes {
            let id = create_node(&mut graph, self, name, node)?;
            if let Some(nodegroup) = &node.nodegroup {
                graph.set_nodegroup(id, Some(nodegroup.clone()))?;
            }
            for (input, group) in &node.input_groups {
                let input = graph.node_input(id, input)?;
                graph.set_input_group(input, group)?;
            }
        }

        for link in &self.links {
            let source = resolve_source(&mut graph, &link.source)?;
            let linked = connect(&mut graph, &link.target, source.into())?;
            for id in linked.links() {
                if !link.collapse.is_empty() {
                    graph.set_collapse(id, link.collapse.clone())?;
                }
                if link.expand {
                    graph.set_expand(id, true)?;
                }
            }
        }

        for constant in &self.constants {
            let value = match &constant.id {
                Some(id) => {
                    let input = resolve_input(&graph, &constant.target)?;
                    let datatype = graph.input(input)?.datatype().to_string();
                    let node = graph.create_constant(&datatype, constant.data.clone(), Some(id.as_str()))?;
                    LinkValue::Source(graph.node_output(node, SOURCE_OUTPUT)?.into())
                }
                None => LinkValue::Data(constant.data.clone()),
            };
            connect(&mut graph, &constant.target, value)?;
        }

        graph.set_updating(true);
        graph.update_all();
        info!(
            network = %graph.name(),
            nodes = self.nodes.len(),
            links = self.links.len(),
            "network built"
        );
        Ok(graph)
    }
}

fn create_node(graph: &mut PlanGraph, cfg: &NetworkConfig, name: &str, node: &NodeConfig) -> Result<NodeId> {
    let missing = |what: &str| PlanError::Config(format!("node '{name}' has no {what}"));
    match node.kind {
        NodeKind::Source => {
            let datatype = node.datatype.as_deref().ok_or_else(|| missing("datatype"))?;
            graph.create_source(datatype, name)
        }
        NodeKind::Constant => {
            let datatype = node.datatype.as_deref().ok_or_else(|| missing("datatype"))?;
            let data = node.constant_values().to_source_data().ok_or_else(|| missing("data"))?;
            graph.create_constant(datatype, data, Some(name))
        }
        kind => {
            let tool_name = node.tool.as_deref().ok_or_else(|| missing("tool"))?;
            let tool = cfg
                .tools
                .get(tool_name)
                .ok_or_else(|| PlanError::Config(format!("node '{name}' uses unknown tool '{tool_name}'")))?;
            graph.create_node(tool, name, kind)
        }
    }
}

fn find_node(graph: &PlanGraph, name: &str) -> Result<NodeId> {
    graph
        .node_by_name(name)
        .ok_or_else(|| PlanError::Config(format!("unknown node '{name}'")))
}

fn resolve_source(graph: &mut PlanGraph, source: &SourceRef) -> Result<LinkSource> {
    let node = find_node(graph, &source.node)?;
    let output = graph.node_output(node, &source.output)?;
    Ok(match source.index {
        Some(index) => LinkSource::SubOutput(graph.output_item(output, index)?),
        None => LinkSource::Output(output),
    })
}

fn resolve_input(graph: &PlanGraph, target: &TargetRef) -> Result<InputId> {
    let node = find_node(graph, &target.node)?;
    graph.node_input(node, &target.input)
}

/// Without a key the value is appended; an integer key fills that slot and
/// a name key appends to the named entry, so repeated name targets
/// accumulate.
fn connect(graph: &mut PlanGraph, target: &TargetRef, value: LinkValue) -> Result<Linked> {
    let input = resolve_input(graph, target)?;
    match &target.key {
        None => graph.append(input, value),
        Some(key @ InputKey::Index(_)) => graph.set_item(input, key.clone(), value),
        Some(key @ InputKey::Name(_)) => match graph.input_entry(input, key.clone())? {
            InputEntry::Named(named) => graph.append_named(named, value),
            InputEntry::Sub(sub) => graph.create_link_from(sub, value),
        },
    }
}

impl PlanGraph {
    /// Snapshot the graph as a network description.
    ///
    /// Constants created by assigning values become constant nodes, and every
    /// link names its target slot explicitly, so building the result yields an
    /// equivalent graph.
    pub fn to_config(&self) -> Result<RawNetworkConfig> {
        let mut cfg = RawNetworkConfig {
            network: NetworkSection {
                id: self.name().to_string(),
                preferred_types: self.preferred_types().map(<[String]>::to_vec),
                log_level: None,
            },
            ..RawNetworkConfig::default()
        };

        for (name, parent) in self.registry().user_types() {
            cfg.datatype.insert(name, DatatypeConfig { parent });
        }

        for (id, node) in self.nodes() {
            let mut entry = NodeConfig {
                kind: node.kind(),
                nodegroup: node.nodegroup().map(str::to_string),
                ..NodeConfig::default()
            };

            if node.kind().is_source_like() {
                let output = self.output(self.node_output(id, SOURCE_OUTPUT)?)?;
                entry.datatype = Some(output.datatype().to_string());
                if let Some(data) = node.data() {
                    let values = ConstantValues::from_source_data(data);
                    entry.values = values.values;
                    entry.tuple = values.tuple;
                    entry.samples = values.samples;
                }
            } else {
                let tool = self.current_tool(id)?;
                let tool_name = match cfg.tool.get(&node.tool().id) {
                    Some(existing) if existing != &tool => format!("{}_{}", node.tool().id, node.id()),
                    _ => node.tool().id.clone(),
                };
                cfg.tool.insert(tool_name.clone(), tool);
                entry.tool = Some(tool_name);

                for (input_name, input) in node.inputs() {
                    let group = self.input(*input)?.input_group();
                    if group != DEFAULT_INPUT_GROUP {
                        entry.input_groups.insert(input_name.clone(), group.to_string());
                    }
                }
            }
            cfg.node.insert(node.id().to_string(), entry);
        }

        for (_, link) in self.links() {
            cfg.link.push(LinkConfig {
                source: self.source_ref(link.source())?.to_string(),
                target: self.target_ref(link.target())?.to_string(),
                collapse: link.collapse().to_vec(),
                expand: link.expand(),
            });
        }

        debug!(network = %self.name(), nodes = cfg.node.len(), links = cfg.link.len(), "snapshotted network");
        Ok(cfg)
    }

    /// The interface of a node as its inputs and outputs are set now.
    fn current_tool(&self, node: NodeId) -> Result<ToolConfig> {
        let n = self.node(node)?;
        let inputs = n
            .inputs()
            .values()
            .map(|id| {
                let state = self.input_state(*id)?;
                Ok(InputSpec {
                    id: state.id,
                    datatype: state.datatype,
                    cardinality: state.cardinality,
                    required: state.required,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let outputs = n
            .outputs()
            .values()
            .map(|id| {
                let state = self.output_state(*id)?;
                Ok(OutputSpec::new(state.id, state.datatype, state.cardinality))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ToolConfig { inputs, outputs })
    }

    fn source_ref(&self, source: LinkSource) -> Result<SourceRef> {
        let output = self.output(self.root_output(source)?)?;
        let index: Option<OutputIndex> = match source {
            LinkSource::Output(_) => None,
            LinkSource::SubOutput(sub) => Some(self.suboutput(sub)?.index()),
        };
        Ok(SourceRef {
            node: self.node(output.node())?.id().to_string(),
            output: output.id().to_string(),
            index,
        })
    }

    fn target_ref(&self, sub: SubInputId) -> Result<TargetRef> {
        let input_id = self.subinput_input(sub)?;
        let input = self.input(input_id)?;
        let key = match self.subinput(sub)?.parent() {
            SubInputParent::Input(_) => self.subinput_key(sub)?,
            SubInputParent::Named(named) => InputKey::Name(self.named_subinput(named)?.key().to_string()),
        };
        Ok(TargetRef {
            node: self.node(input.node())?.id().to_string(),
            input: input.id().to_string(),
            key: Some(key),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::{load_from_str, to_toml_string};

    const NETWORK: &str = r#"
[network]
id = "demo"

[tool.adder]
inputs = [
    { id = "left", datatype = "Int", cardinality = "1-*" },
    { id = "right", datatype = "Int", cardinality = "1" },
]
outputs = [{ id = "result", datatype = "Int", cardinality = "as:left" }]

[node.numbers]
kind = "source"
datatype = "Int"

[node.add]
tool = "adder"
nodegroup = "math"

[[link]]
source = "numbers/output"
target = "add/left"

[[constant]]
target = "add/right"
values = [5]
"#;

    fn build(text: &str) -> PlanGraph {
        let raw = load_from_str(text).unwrap();
        NetworkConfig::try_from(raw).unwrap().build().unwrap()
    }

    #[test]
    fn builds_nodes_links_and_constants() {
        let mut graph = build(NETWORK);
        assert_eq!(graph.name(), "demo");

        let add = graph.node_by_name("add").unwrap();
        assert_eq!(graph.node(add).unwrap().nodegroup(), Some("math"));

        let right = graph.node_input(add, "right").unwrap();
        assert!(graph.input_cardinality(right, None).unwrap().is_symbolic());
        assert!(graph.input(right).unwrap().valid());

        // numbers, add and the constant feeding add/right
        assert_eq!(graph.nodes().count(), 3);
        assert_eq!(graph.links().count(), 2);
        assert!(graph.is_ready());
    }

    #[test]
    fn unknown_tool_is_rejected_before_building() {
        let text = NETWORK.replace("tool = \"adder\"", "tool = \"missing\"");
        let raw = load_from_str(&text).unwrap();
        assert!(NetworkConfig::try_from(raw).is_err());
    }

    #[test]
    fn snapshot_rebuilds_equivalent_graph() {
        let graph = build(NETWORK);
        let snapshot = graph.to_config().unwrap();

        assert!(snapshot.constant.is_empty());
        assert_eq!(snapshot.link.len(), 2);
        assert!(snapshot.link.iter().all(|l| l.target.starts_with("add/")));
        assert!(snapshot.link.iter().any(|l| l.target == "add/left/0"));

        let text = to_toml_string(&snapshot).unwrap();
        let rebuilt = build(&text);
        assert_eq!(rebuilt.nodes().count(), graph.nodes().count());
        assert_eq!(rebuilt.to_config().unwrap(), snapshot);
    }

    #[test]
    fn named_targets_accumulate() {
        let text = NETWORK.replace("target = \"add/left\"", "target = \"add/left/a\"")
            + r#"
[[constant]]
target = "add/left/a"
values = [1, 2]
"#;
        let graph = build(&text);
        let add = graph.node_by_name("add").unwrap();
        let left = graph.node_input(add, "left").unwrap();

        let entries = graph.input(left).unwrap().entries();
        assert_eq!(entries.len(), 1);
        let InputEntry::Named(named) = entries[0] else {
            panic!("expected a named entry");
        };
        assert_eq!(graph.named_subinput(named).unwrap().entries().len(), 2);
    }
}
