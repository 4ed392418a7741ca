#![allow(dead_code)]

use plangraph::config::{ConstantConfig, DatatypeConfig, LinkConfig, NetworkConfig, NodeConfig, RawNetworkConfig, ToolConfig};
use plangraph::core::RawValue;
use plangraph::planning::{CollapseDim, InputSpec, NodeKind, OutputSpec, PlanGraph};

/// Builder for `NetworkConfig` to simplify test setup.
pub struct NetworkBuilder {
    config: RawNetworkConfig,
}

impl NetworkBuilder {
    pub fn new(id: &str) -> Self {
        let mut config = RawNetworkConfig::default();
        config.network.id = id.to_string();
        Self { config }
    }

    pub fn with_datatype(mut self, name: &str, parent: &str) -> Self {
        self.config.datatype.insert(
            name.to_string(),
            DatatypeConfig {
                parent: parent.to_string(),
            },
        );
        self
    }

    pub fn with_preferred_types(mut self, types: &[&str]) -> Self {
        self.config.network.preferred_types = Some(types.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn with_tool(mut self, name: &str, tool: ToolConfig) -> Self {
        self.config.tool.insert(name.to_string(), tool);
        self
    }

    pub fn with_source(mut self, name: &str, datatype: &str) -> Self {
        self.config.node.insert(
            name.to_string(),
            NodeConfig {
                kind: NodeKind::Source,
                datatype: Some(datatype.to_string()),
                ..NodeConfig::default()
            },
        );
        self
    }

    pub fn with_node(self, name: &str, tool: &str) -> Self {
        self.with_node_kind(name, tool, NodeKind::Tool)
    }

    pub fn with_node_kind(mut self, name: &str, tool: &str, kind: NodeKind) -> Self {
        self.config.node.insert(
            name.to_string(),
            NodeConfig {
                kind,
                tool: Some(tool.to_string()),
                ..NodeConfig::default()
            },
        );
        self
    }

    pub fn with_link(self, source: &str, target: &str) -> Self {
        self.with_link_config(LinkConfig {
            source: source.to_string(),
            target: target.to_string(),
            collapse: vec![],
            expand: false,
        })
    }

    pub fn with_collapsed_link(self, source: &str, target: &str, collapse: &[CollapseDim]) -> Self {
        self.with_link_config(LinkConfig {
            source: source.to_string(),
            target: target.to_string(),
            collapse: collapse.to_vec(),
            expand: false,
        })
    }

    pub fn with_link_config(mut self, link: LinkConfig) -> Self {
        self.config.link.push(link);
        self
    }

    /// One sample per value, fed into `target`.
    pub fn with_constant(mut self, target: &str, values: Vec<RawValue>) -> Self {
        self.config.constant.push(ConstantConfig {
            target: target.to_string(),
            id: None,
            values: Some(values),
            tuple: None,
            samples: None,
        });
        self
    }

    pub fn raw(self) -> RawNetworkConfig {
        self.config
    }

    pub fn build(self) -> NetworkConfig {
        NetworkConfig::try_from(self.config).expect("Failed to build valid network from builder")
    }

    pub fn build_graph(self) -> PlanGraph {
        self.build().build().expect("Failed to build graph from network")
    }
}

/// Builder for `ToolConfig`.
#[derive(Default)]
pub struct ToolBuilder {
    tool: ToolConfig,
}

impl ToolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, id: &str, datatype: &str, cardinality: &str) -> Self {
        self.tool.inputs.push(InputSpec::new(id, datatype, cardinality));
        self
    }

    pub fn optional_input(mut self, id: &str, datatype: &str, cardinality: &str) -> Self {
        self.tool.inputs.push(InputSpec::new(id, datatype, cardinality).optional());
        self
    }

    pub fn output(mut self, id: &str, datatype: &str, cardinality: &str) -> Self {
        self.tool.outputs.push(OutputSpec::new(id, datatype, cardinality));
        self
    }

    pub fn build(self) -> ToolConfig {
        self.tool
    }
}
