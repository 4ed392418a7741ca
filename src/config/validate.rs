// src/config/validate.rs

use std::collections::BTreeMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{
    ConstantPlan, LinkPlan, NetworkConfig, NodeConfig, RawNetworkConfig, SourceRef, TargetRef,
};
use crate::core::cardinality::create_cardinality;
use crate::core::datatype::TypeRegistry;
use crate::errors::{PlanError, Result};
use crate::planning::input::InputKey;
use crate::planning::node::{NodeKind, SOURCE_OUTPUT, ToolSpec};
use crate::planning::output::OutputIndex;

impl TryFrom<RawNetworkConfig> for NetworkConfig {
    type Error = PlanError;

    fn try_from(raw: RawNetworkConfig) -> std::result::Result<Self, Self::Error> {
        validate_network_section(&raw)?;
        let datatypes = ordered_datatypes(&raw)?;

        let mut registry = TypeRegistry::new();
        for (name, parent) in &datatypes {
            registry.register(name, parent)?;
        }
        validate_preferred_types(&raw, &registry)?;

        let tools = validate_tools(&raw, &registry)?;
        validate_nodes(&raw, &tools, &registry)?;

        let links = raw
            .link
            .iter()
            .map(|link| {
                let source = parse_source_ref(&link.source)?;
                let target = parse_target_ref(&link.target)?;
                check_source(&raw, &tools, &source)?;
                check_target(&raw, &tools, &target)?;
                Ok(LinkPlan {
                    source,
                    target,
                    collapse: link.collapse.clone(),
                    expand: link.expand,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let constants = raw
            .constant
            .iter()
            .map(|constant| {
                let target = parse_target_ref(&constant.target)?;
                check_target(&raw, &tools, &target)?;
                let data = constant.constant_values().to_source_data().ok_or_else(|| {
                    PlanError::Config(format!(
                        "constant for '{}' needs exactly one of `values`, `tuple` or `samples`",
                        constant.target
                    ))
                })?;
                Ok(ConstantPlan {
                    target,
                    id: constant.id.clone(),
                    data,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        validate_dag(&links)?;

        Ok(NetworkConfig {
            network: raw.network,
            datatypes,
            tools,
            nodes: raw.node,
            links,
            constants,
        })
    }
}

/// Check a raw description without keeping the result.
pub fn validate_config(raw: &RawNetworkConfig) -> Result<()> {
    NetworkConfig::try_from(raw.clone()).map(|_| ())
}

fn validate_network_section(cfg: &RawNetworkConfig) -> Result<()> {
    let id = &cfg.network.id;
    if id.is_empty() || id.contains('/') {
        return Err(PlanError::Config(format!("[network].id must be non-empty and without '/' (got {id:?})")));
    }
    if let Some(level) = &cfg.network.log_level {
        if level.trim().parse::<tracing::Level>().is_err() {
            return Err(PlanError::Config(format!(
                "[network].log_level must be one of error, warn, info, debug, trace (got {level:?})"
            )));
        }
    }
    Ok(())
}

/// User datatypes ordered so every parent is registered before its children.
fn ordered_datatypes(cfg: &RawNetworkConfig) -> Result<Vec<(String, String)>> {
    let builtin = TypeRegistry::new();
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for (name, datatype) in cfg.datatype.iter() {
        if builtin.contains(name) {
            return Err(PlanError::Config(format!("datatype '{name}' shadows a builtin datatype")));
        }
        let parent = datatype.parent.as_str();
        if !builtin.contains(parent) && !cfg.datatype.contains_key(parent) {
            return Err(PlanError::Config(format!("datatype '{name}' has unknown parent '{parent}'")));
        }
        graph.add_node(name.as_str());
        if cfg.datatype.contains_key(parent) {
            graph.add_edge(parent, name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order
            .into_iter()
            .filter_map(|name| cfg.datatype.get(name).map(|d| (name.to_string(), d.parent.clone())))
            .collect()),
        Err(cycle) => Err(PlanError::Config(format!(
            "datatype '{}' is its own ancestor",
            cycle.node_id()
        ))),
    }
}

fn validate_preferred_types(cfg: &RawNetworkConfig, registry: &TypeRegistry) -> Result<()> {
    for datatype in cfg.network.preferred_types.iter().flatten() {
        if !registry.contains(datatype) {
            return Err(PlanError::Config(format!(
                "[network].preferred_types names unknown datatype '{datatype}'"
            )));
        }
    }
    Ok(())
}

fn validate_tools(cfg: &RawNetworkConfig, registry: &TypeRegistry) -> Result<BTreeMap<String, ToolSpec>> {
    let mut tools = BTreeMap::new();
    for (name, tool) in cfg.tool.iter() {
        let mut seen = Vec::new();
        let interface = tool
            .inputs
            .iter()
            .map(|i| (i.id.as_str(), i.datatype.as_str(), i.cardinality.as_str()))
            .chain(
                tool.outputs
                    .iter()
                    .map(|o| (o.id.as_str(), o.datatype.as_str(), o.cardinality.as_str())),
            );
        for (id, datatype, cardinality) in interface {
            if seen.contains(&id) {
                return Err(PlanError::Config(format!("tool '{name}' declares '{id}' twice")));
            }
            seen.push(id);
            if !registry.contains(datatype) {
                return Err(PlanError::Config(format!(
                    "tool '{name}' argument '{id}' has unknown datatype '{datatype}'"
                )));
            }
            create_cardinality(cardinality).map_err(|e| {
                PlanError::Config(format!("tool '{name}' argument '{id}': {e}"))
            })?;
        }

        tools.insert(
            name.clone(),
            ToolSpec {
                id: name.clone(),
                inputs: tool.inputs.clone(),
                outputs: tool.outputs.clone(),
            },
        );
    }
    Ok(tools)
}

fn validate_nodes(cfg: &RawNetworkConfig, tools: &BTreeMap<String, ToolSpec>, registry: &TypeRegistry) -> Result<()> {
    for (name, node) in cfg.node.iter() {
        if name.is_empty() || name.contains('/') {
            return Err(PlanError::Config(format!("invalid node id {name:?}")));
        }

        if node.kind.is_source_like() {
            let datatype = node
                .datatype
                .as_deref()
                .ok_or_else(|| PlanError::Config(format!("{:?} node '{name}' needs a `datatype`", node.kind)))?;
            if !registry.contains(datatype) {
                return Err(PlanError::Config(format!("node '{name}' has unknown datatype '{datatype}'")));
            }
            let values = node.constant_values();
            match node.kind {
                NodeKind::Constant if values.to_source_data().is_none() => {
                    return Err(PlanError::Config(format!(
                        "constant node '{name}' needs exactly one of `values`, `tuple` or `samples`"
                    )));
                }
                NodeKind::Source if !values.is_empty() => {
                    return Err(PlanError::Config(format!(
                        "source node '{name}' cannot carry data; use kind = \"constant\""
                    )));
                }
                _ => {}
            }
            if !node.input_groups.is_empty() {
                return Err(PlanError::Config(format!("node '{name}' has no inputs to group")));
            }
            continue;
        }

        let tool_name = node
            .tool
            .as_deref()
            .ok_or_else(|| PlanError::Config(format!("node '{name}' needs a `tool`")))?;
        let tool = tools
            .get(tool_name)
            .ok_or_else(|| PlanError::Config(format!("node '{name}' uses unknown tool '{tool_name}'")))?;

        if node.kind == NodeKind::Macro && !node.input_groups.is_empty() {
            return Err(PlanError::Config(format!(
                "macro node '{name}' cannot set input groups"
            )));
        }
        for input in node.input_groups.keys() {
            if !tool.inputs.iter().any(|i| &i.id == input) {
                return Err(PlanError::Config(format!(
                    "node '{name}' sets the input group of unknown input '{input}'"
                )));
            }
        }
    }
    Ok(())
}

fn split_ref(reference: &str) -> Result<Vec<&str>> {
    let parts: Vec<&str> = reference.split('/').collect();
    if parts.len() < 2 || parts.iter().any(|p| p.trim().is_empty()) {
        return Err(PlanError::Config(format!("malformed reference '{reference}'")));
    }
    Ok(parts)
}

/// Parse `node/output` or `node/output[selection]`.
pub fn parse_source_ref(reference: &str) -> Result<SourceRef> {
    let parts = split_ref(reference)?;
    let [node, output] = parts.as_slice() else {
        return Err(PlanError::Config(format!("malformed source reference '{reference}'")));
    };

    let (output, index) = match output.split_once('[') {
        Some((output, rest)) => {
            let selection = rest
                .strip_suffix(']')
                .ok_or_else(|| PlanError::Config(format!("unclosed selection in '{reference}'")))?;
            let index = selection
                .parse::<OutputIndex>()
                .map_err(|e| PlanError::Config(format!("source '{reference}': {e}")))?;
            (output, Some(index))
        }
        None => (*output, None),
    };

    Ok(SourceRef {
        node: node.to_string(),
        output: output.to_string(),
        index,
    })
}

/// Parse `node/input` or `node/input/key`.
pub fn parse_target_ref(reference: &str) -> Result<TargetRef> {
    let parts = split_ref(reference)?;
    match parts.as_slice() {
        [node, input] => Ok(TargetRef {
            node: node.to_string(),
            input: input.to_string(),
            key: None,
        }),
        [node, input, key] => Ok(TargetRef {
            node: node.to_string(),
            input: input.to_string(),
            key: Some(InputKey::parse(key)),
        }),
        _ => Err(PlanError::Config(format!("malformed target reference '{reference}'"))),
    }
}

fn lookup_node<'a>(cfg: &'a RawNetworkConfig, name: &str, reference: &str) -> Result<&'a NodeConfig> {
    cfg.node
        .get(name)
        .ok_or_else(|| PlanError::Config(format!("reference '{reference}' names unknown node '{name}'")))
}

fn check_source(cfg: &RawNetworkConfig, tools: &BTreeMap<String, ToolSpec>, source: &SourceRef) -> Result<()> {
    let node = lookup_node(cfg, &source.node, &source.to_string())?;
    let known = if node.kind.is_source_like() {
        source.output == SOURCE_OUTPUT
    } else {
        node.tool
            .as_ref()
            .and_then(|t| tools.get(t))
            .is_some_and(|t| t.outputs.iter().any(|o| o.id == source.output))
    };
    if !known {
        return Err(PlanError::Config(format!(
            "node '{}' has no output '{}'",
            source.node, source.output
        )));
    }
    Ok(())
}

fn check_target(cfg: &RawNetworkConfig, tools: &BTreeMap<String, ToolSpec>, target: &TargetRef) -> Result<()> {
    let node = lookup_node(cfg, &target.node, &target.to_string())?;
    let known = node
        .tool
        .as_ref()
        .filter(|_| !node.kind.is_source_like())
        .and_then(|t| tools.get(t))
        .is_some_and(|t| t.inputs.iter().any(|i| i.id == target.input));
    if !known {
        return Err(PlanError::Config(format!(
            "node '{}' has no input '{}'",
            target.node, target.input
        )));
    }
    Ok(())
}

fn validate_dag(links: &[LinkPlan]) -> Result<()> {
    // Edge direction: source node -> target node.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for link in links {
        graph.add_edge(link.source.node.as_str(), link.target.node.as_str(), ());
    }

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(PlanError::Config(format!(
            "cycle detected in links involving node '{}'",
            cycle.node_id()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_log_level_must_name_a_level() {
        let mut raw = RawNetworkConfig::default();
        raw.network.log_level = Some("Debug".to_string());
        assert!(validate_network_section(&raw).is_ok());

        raw.network.log_level = Some("chatty".to_string());
        let err = validate_network_section(&raw).unwrap_err();
        assert!(err.to_string().contains("chatty"), "{err}");
    }

    #[test]
    fn source_refs_take_an_optional_selection() {
        let plain = parse_source_ref("numbers/output").unwrap();
        assert_eq!(plain.index, None);

        let sliced = parse_source_ref("numbers/output[1:3]").unwrap();
        assert_eq!(sliced.output, "output");
        assert_eq!(sliced.index, Some(OutputIndex::from(1i64..3)));
        assert_eq!(sliced.to_string(), "numbers/output[1:3]");

        assert!(parse_source_ref("numbers").is_err());
        assert!(parse_source_ref("numbers/output[1:3").is_err());
        assert!(parse_source_ref("a/b/c").is_err());
    }

    #[test]
    fn target_refs_take_an_optional_key() {
        let keyed = parse_target_ref("add/left/2").unwrap();
        assert_eq!(keyed.key, Some(InputKey::Index(2)));
        let named = parse_target_ref("add/left/first").unwrap();
        assert_eq!(named.key, Some(InputKey::Name("first".into())));
        assert!(parse_target_ref("add//x").is_err());
    }
}
