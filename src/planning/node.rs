// src/planning/node.rs

//! Nodes, the tool descriptions they are created from, and input groups.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::cardinality::create_cardinality;
use crate::core::dimension::{Dimension, HasDimensions, Size};
use crate::core::source_data::SourceData;
use crate::errors::{PlanError, Result};
use crate::planning::graph::{GraphItem, PlanGraph};
use crate::planning::ids::{InputId, LinkId, NodeId, OutputId};
use crate::planning::input::{Input, broadcast_dimensions};
use crate::planning::output::{Output, OutputKind};
use crate::planning::session::RoundKey;
use crate::planning::update::{UpdateStatus, Updateable};

pub const DEFAULT_INPUT_GROUP: &str = "default";
pub const SOURCE_OUTPUT: &str = "output";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    #[default]
    Tool,
    Flow,
    AdvancedFlow,
    Source,
    Constant,
    Macro,
}

impl NodeKind {
    pub fn is_source_like(&self) -> bool {
        matches!(self, NodeKind::Source | NodeKind::Constant)
    }
}

fn default_cardinality() -> String {
    "1".to_string()
}

fn default_required() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    pub id: String,
    pub datatype: String,
    #[serde(default = "default_cardinality")]
    pub cardinality: String,
    #[serde(default = "default_required")]
    pub required: bool,
}

impl InputSpec {
    pub fn new(id: impl Into<String>, datatype: impl Into<String>, cardinality: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            datatype: datatype.into(),
            cardinality: cardinality.into(),
            required: true,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub id: String,
    pub datatype: String,
    #[serde(default = "default_cardinality")]
    pub cardinality: String,
}

impl OutputSpec {
    pub fn new(id: impl Into<String>, datatype: impl Into<String>, cardinality: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            datatype: datatype.into(),
            cardinality: cardinality.into(),
        }
    }
}

/// Interface of a tool: the inputs and outputs a node created from it gets.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub id: String,
    #[serde(default)]
    pub inputs: Vec<InputSpec>,
    #[serde(default)]
    pub outputs: Vec<OutputSpec>,
}

impl ToolSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_input(mut self, input: InputSpec) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn with_output(mut self, output: OutputSpec) -> Self {
        self.outputs.push(output);
        self
    }

    /// Interface of a source or constant node: a single `output`.
    pub fn source(datatype: &str) -> Self {
        ToolSpec::new(format!("Source{datatype}")).with_output(OutputSpec::new(SOURCE_OUTPUT, datatype, "any"))
    }
}

/// Inputs of one node that share an input group; together they span a part
/// of the node's dimensions.
#[derive(Clone, Debug, PartialEq)]
pub struct InputGroup {
    pub id: String,
    pub inputs: Vec<InputId>,
    pub dimensions: Vec<Dimension>,
}

impl InputGroup {
    /// A group is empty when any of its dimensions is concretely zero.
    pub fn empty(&self) -> bool {
        self.dimensions.iter().any(|d| d.size().is_zero())
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) id: String,
    pub(crate) kind: NodeKind,
    pub(crate) tool: ToolSpec,
    pub(crate) inputs: IndexMap<String, InputId>,
    pub(crate) outputs: IndexMap<String, OutputId>,
    pub(crate) nodegroup: Option<String>,
    pub(crate) source_dimension: Option<Dimension>,
    pub(crate) data: Option<SourceData>,
    pub(crate) macro_outputs: IndexMap<String, Vec<Dimension>>,
    pub(crate) status: UpdateStatus,
}

impl Node {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn tool(&self) -> &ToolSpec {
        &self.tool
    }

    pub fn inputs(&self) -> &IndexMap<String, InputId> {
        &self.inputs
    }

    pub fn outputs(&self) -> &IndexMap<String, OutputId> {
        &self.outputs
    }

    pub fn nodegroup(&self) -> Option<&str> {
        self.nodegroup.as_deref()
    }

    /// Fixed data of a constant node.
    pub fn data(&self) -> Option<&SourceData> {
        self.data.as_ref()
    }

    pub fn status(&self) -> &UpdateStatus {
        &self.status
    }

    pub fn valid(&self) -> bool {
        self.status.is_valid()
    }

    pub fn messages(&self) -> &[String] {
        &self.status.messages
    }

    /// Name of the dimension this node contributes as a source.
    pub(crate) fn dimension_name(&self) -> &str {
        self.nodegroup.as_deref().unwrap_or(&self.id)
    }
}

impl PlanGraph {
    /// Create a node from a tool description.
    ///
    /// Source and constant nodes carry data instead of a tool and are
    /// created with [`PlanGraph::create_source`] and
    /// [`PlanGraph::create_constant`].
    pub fn create_node(&mut self, tool: &ToolSpec, id: &str, kind: NodeKind) -> Result<NodeId> {
        if kind.is_source_like() {
            return Err(PlanError::Type(format!(
                "node {id}: {kind:?} nodes are created with create_source/create_constant"
            )));
        }
        self.insert_node(tool.clone(), id, kind, None, None)
    }

    /// Create a source node delivering `datatype` samples on its `output`.
    ///
    /// Until data is set, its size is the symbol `N_<id>`.
    pub fn create_source(&mut self, datatype: &str, id: &str) -> Result<NodeId> {
        let dimension = Dimension::new(id, Size::symbol(format!("N_{id}")));
        self.insert_node(ToolSpec::source(datatype), id, NodeKind::Source, Some(dimension), None)
    }

    /// Create a constant node with fixed data. Without an id, one is
    /// derived from the datatype.
    pub fn create_constant(&mut self, datatype: &str, data: SourceData, id: Option<&str>) -> Result<NodeId> {
        let samples = data.samples()?;
        for value in samples.values().flatten() {
            self.registry().convert(datatype, value)?;
        }

        let id = match id {
            Some(id) => id.to_string(),
            None => self.unique_node_name(&format!("const_{datatype}")),
        };
        let dimension = Dimension::new(id.as_str(), samples.len() as u64);
        debug!(node = %id, samples = samples.len(), "creating constant node");
        self.insert_node(ToolSpec::source(datatype), &id, NodeKind::Constant, Some(dimension), Some(data))
    }

    pub(crate) fn unique_node_name(&self, base: &str) -> String {
        if self.node_by_name(base).is_none() {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| self.node_by_name(candidate).is_none())
            .unwrap_or_else(|| base.to_string())
    }

    fn insert_node(
        &mut self,
        tool: ToolSpec,
        id: &str,
        kind: NodeKind,
        source_dimension: Option<Dimension>,
        data: Option<SourceData>,
    ) -> Result<NodeId> {
        if id.is_empty() || id.contains('/') {
            return Err(PlanError::Value(format!("invalid node id {id:?}")));
        }
        if self.node_by_name(id).is_some() {
            return Err(PlanError::Value(format!("node {id} already exists in {}", self.name())));
        }

        // check the whole interface before touching the graph
        let mut input_specs = Vec::with_capacity(tool.inputs.len());
        for spec in &tool.inputs {
            self.require_datatype(&spec.datatype)?;
            input_specs.push((spec.clone(), create_cardinality(&spec.cardinality)?));
        }
        let mut output_specs = Vec::with_capacity(tool.outputs.len());
        for spec in &tool.outputs {
            self.require_datatype(&spec.datatype)?;
            output_specs.push((spec.clone(), create_cardinality(&spec.cardinality)?));
        }

        let node_id = NodeId::new(self.id(), self.next_index());
        let output_kind = match kind {
            NodeKind::Source | NodeKind::Constant => OutputKind::Source,
            NodeKind::AdvancedFlow => OutputKind::AdvancedFlow,
            NodeKind::Macro => OutputKind::Macro,
            NodeKind::Tool | NodeKind::Flow => OutputKind::Regular,
        };

        let mut inputs = IndexMap::new();
        for (spec, cardinality) in input_specs {
            let input_id = InputId::new(self.id(), self.next_index());
            self.inputs
                .insert(input_id, Input::new(&spec, cardinality, node_id, DEFAULT_INPUT_GROUP));
            inputs.insert(spec.id.clone(), input_id);
        }

        let mut outputs = IndexMap::new();
        for (spec, cardinality) in output_specs {
            let output_id = OutputId::new(self.id(), self.next_index());
            self.outputs
                .insert(output_id, Output::new(&spec, cardinality, node_id, output_kind));
            outputs.insert(spec.id.clone(), output_id);
        }

        self.nodes.insert(
            node_id,
            Node {
                id: id.to_string(),
                kind,
                tool,
                inputs,
                outputs,
                nodegroup: None,
                source_dimension,
                data,
                macro_outputs: IndexMap::new(),
                status: UpdateStatus::default(),
            },
        );
        debug!(node = %id, ?kind, "created node");

        self.update(GraphItem::Node(node_id), None, true, false);
        Ok(node_id)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.check_handle(id)?;
        self.nodes
            .get(&id)
            .ok_or_else(|| PlanError::NotFound(format!("{id} in {}", self.name())))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.check_handle(id)?;
        let name = self.name().to_string();
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| PlanError::NotFound(format!("{id} in {name}")))
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().find(|(_, n)| n.id == name).map(|(id, _)| *id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().map(|(id, n)| (*id, n))
    }

    /// The Input `name` of `node`.
    pub fn node_input(&self, node: NodeId, name: &str) -> Result<InputId> {
        let n = self.node(node)?;
        n.inputs
            .get(name)
            .copied()
            .ok_or_else(|| PlanError::Key(format!("node {} has no input {name}", n.id)))
    }

    /// The Output `name` of `node`.
    pub fn node_output(&self, node: NodeId, name: &str) -> Result<OutputId> {
        let n = self.node(node)?;
        n.outputs
            .get(name)
            .copied()
            .ok_or_else(|| PlanError::Key(format!("node {} has no output {name}", n.id)))
    }

    pub fn set_nodegroup(&mut self, node: NodeId, nodegroup: Option<String>) -> Result<()> {
        self.node_mut(node)?.nodegroup = nodegroup;
        self.update(GraphItem::Node(node), None, true, false);
        Ok(())
    }

    /// Register the dimensions a macro node delivers on one of its outputs.
    pub fn register_macro_output(&mut self, node: NodeId, output: &str, dimensions: Vec<Dimension>) -> Result<()> {
        let n = self.node_mut(node)?;
        if n.kind != NodeKind::Macro {
            return Err(PlanError::Type(format!("node {} is not a macro node", n.id)));
        }
        if !n.outputs.contains_key(output) {
            return Err(PlanError::Key(format!("node {} has no output {output}", n.id)));
        }
        n.macro_outputs.insert(output.to_string(), dimensions);
        self.update(GraphItem::Node(node), None, true, false);
        Ok(())
    }

    /// Input groups of `node`, in order of first appearance.
    pub fn input_groups(&self, node: NodeId) -> Result<Vec<InputGroup>> {
        let n = self.node(node)?;
        let mut members: IndexMap<String, Vec<InputId>> = IndexMap::new();
        for input_id in n.inputs.values() {
            let input = self.input(*input_id)?;
            members.entry(input.input_group.clone()).or_default().push(*input_id);
        }

        members
            .into_iter()
            .map(|(id, inputs)| {
                let candidates = inputs
                    .iter()
                    .map(|i| self.view(*i).dimensions())
                    .collect::<Result<Vec<_>>>()?;
                let dimensions = broadcast_dimensions(candidates, &format!("InputGroup {id}"))?;
                Ok(InputGroup { id, inputs, dimensions })
            })
            .collect()
    }

    pub(crate) fn node_dimensions(&self, node: NodeId) -> Result<Vec<Dimension>> {
        let n = self.node(node)?;
        if let Some(source) = &n.source_dimension {
            return Ok(vec![Dimension::new(n.dimension_name(), source.size().clone())]);
        }
        let _deriving = self.derive(GraphItem::Node(node))?;

        let mut dimensions: Vec<Dimension> = self
            .input_groups(node)?
            .into_iter()
            .flat_map(|group| group.dimensions)
            .collect();

        if matches!(n.kind, NodeKind::Flow | NodeKind::AdvancedFlow) {
            dimensions.push(Dimension::new(n.id.as_str(), Size::symbol(format!("N_{}", n.id))));
        }
        Ok(dimensions)
    }

    /// Nodes that deliver data to any input of `node`.
    pub fn sourced_nodes(&self, node: NodeId) -> Result<Vec<NodeId>> {
        let mut found = Vec::new();
        for input in self.node(node)?.inputs.values() {
            for output in self.sourced_outputs(*input)? {
                let source_node = self.output(output)?.node;
                if !found.contains(&source_node) {
                    found.push(source_node);
                }
            }
        }
        Ok(found)
    }

    /// Links listening on any output (or sub-selection of one) of `node`.
    pub fn listeners(&self, node: NodeId) -> Result<Vec<LinkId>> {
        let mut found = Vec::new();
        for output in self.node(node)?.outputs.values() {
            found.extend(self.output_listeners(*output)?);
        }
        Ok(found)
    }

    pub(crate) fn refresh_node(&mut self, node: NodeId, key: RoundKey, forward: bool, backward: bool) {
        let Ok(n) = self.node(node) else {
            return;
        };
        let inputs: Vec<InputId> = n.inputs.values().copied().collect();
        let outputs: Vec<OutputId> = n.outputs.values().copied().collect();

        if backward {
            for upstream in self.sourced_nodes(node).unwrap_or_default() {
                self.update(GraphItem::Node(upstream), Some(key), false, backward);
            }
        }

        for input in &inputs {
            self.update(GraphItem::Input(*input), Some(key), forward, backward);
        }

        let (valid, messages) = self.evaluate_node(node);
        if let Ok(n) = self.node_mut(node) {
            n.status.set(valid, messages);
        }

        for output in &outputs {
            self.update(GraphItem::Output(*output), Some(key), forward, backward);
        }

        if forward {
            for link in self.listeners(node).unwrap_or_default() {
                self.update(GraphItem::Link(link), Some(key), forward, false);
            }
        }
    }

    fn evaluate_node(&self, node: NodeId) -> (bool, Vec<String>) {
        let Ok(n) = self.node(node) else {
            return (false, vec![format!("{node} no longer exists")]);
        };
        let mut messages = Vec::new();

        for (name, input_id) in &n.inputs {
            if let Ok(input) = self.input(*input_id) {
                if !input.status.is_valid() {
                    if input.status.messages.is_empty() {
                        messages.push(format!("[{}] Input {name} is not valid", n.id));
                    }
                    for message in &input.status.messages {
                        messages.push(format!("[{}] Input {name} is not valid: {message}", n.id));
                    }
                }
            }
        }

        match self.input_groups(node) {
            Ok(groups) => {
                for group in groups.iter().filter(|g| g.empty()) {
                    messages.push(format!("[{}] InputGroup {} is empty", n.id, group.id));
                }
            }
            Err(e) => messages.push(format!("[{}] cannot determine input groups: {e}", n.id)),
        }

        for (name, output_id) in &n.outputs {
            match self.resulting_datatype(*output_id) {
                Ok(Some(_)) => {}
                Ok(None) => messages.push(format!(
                    "[{}] Output {name} cannot determine the Output DataType, please specify a valid DataType or add casts to the Links",
                    n.id
                )),
                Err(e) => messages.push(format!("[{}] Output {name}: {e}", n.id)),
            }
        }

        (messages.is_empty(), messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adder() -> ToolSpec {
        ToolSpec::new("adder")
            .with_input(InputSpec::new("left", "Int", "1-*"))
            .with_input(InputSpec::new("right", "Int", "as:left").optional())
            .with_output(OutputSpec::new("result", "Int", "as:left"))
    }

    #[test]
    fn nodes_get_their_tool_interface() {
        let mut graph = PlanGraph::new("net");
        let add = graph.create_node(&adder(), "add", NodeKind::Tool).unwrap();
        let node = graph.node(add).unwrap();
        assert_eq!(node.inputs().keys().collect::<Vec<_>>(), vec!["left", "right"]);
        assert_eq!(node.outputs().keys().collect::<Vec<_>>(), vec!["result"]);
        assert_eq!(graph.node_by_name("add"), Some(add));
        assert!(matches!(graph.node_input(add, "middle"), Err(PlanError::Key(_))));
    }

    #[test]
    fn duplicate_ids_and_bad_specs_are_rejected_up_front() {
        let mut graph = PlanGraph::new("net");
        graph.create_node(&adder(), "add", NodeKind::Tool).unwrap();
        assert!(matches!(
            graph.create_node(&adder(), "add", NodeKind::Tool),
            Err(PlanError::Value(_))
        ));

        let broken = ToolSpec::new("broken").with_input(InputSpec::new("x", "Int", "one"));
        assert!(matches!(
            graph.create_node(&broken, "b", NodeKind::Tool),
            Err(PlanError::CardinalityFormat(_))
        ));
        assert!(graph.node_by_name("b").is_none());

        assert!(matches!(
            graph.create_node(&adder(), "s", NodeKind::Source),
            Err(PlanError::Type(_))
        ));
    }

    #[test]
    fn source_dimension_is_symbolic_until_data_arrives() {
        let mut graph = PlanGraph::new("net");
        let src = graph.create_source("Int", "numbers").unwrap();
        let dims = graph.view(src).dimensions().unwrap();
        assert_eq!(dims, vec![Dimension::new("numbers", Size::symbol("N_numbers"))]);
        assert!(graph.node(src).unwrap().valid());

        let constant = graph
            .create_constant("Int", SourceData::listed([1i64, 2]), Some("two"))
            .unwrap();
        assert_eq!(graph.view(constant).size().unwrap(), vec![Size::Concrete(2)]);
    }

    #[test]
    fn flow_nodes_add_their_own_dimension() {
        let mut graph = PlanGraph::new("net");
        let src = graph.create_source("Int", "numbers").unwrap();
        let tool = ToolSpec::new("splitter")
            .with_input(InputSpec::new("x", "Int", "1"))
            .with_output(OutputSpec::new("parts", "Int", "1"));
        let split = graph.create_node(&tool, "split", NodeKind::Flow).unwrap();
        let x = graph.node_input(split, "x").unwrap();
        let out = graph.node_output(src, SOURCE_OUTPUT).unwrap();
        graph.append(x, out).unwrap();

        assert_eq!(graph.view(split).dimnames().unwrap(), vec!["numbers", "split"]);
    }
}
