// src/config/model.rs

use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::datatype::RawValue;
use crate::core::source_data::SourceData;
use crate::planning::input::InputKey;
use crate::planning::link::CollapseDim;
use crate::planning::node::{InputSpec, NodeKind, OutputSpec, ToolSpec};
use crate::planning::output::OutputIndex;

/// Network description as read from a TOML file.
///
/// ```toml
/// [network]
/// id = "demo"
/// preferred_types = ["Int"]
///
/// [datatype.Image]
/// parent = "FilePath"
///
/// [tool.adder]
/// inputs = [{ id = "left", datatype = "Int", cardinality = "1-*" }]
/// outputs = [{ id = "result", datatype = "Int", cardinality = "as:left" }]
///
/// [node.numbers]
/// kind = "source"
/// datatype = "Int"
///
/// [node.add]
/// tool = "adder"
///
/// [[link]]
/// source = "numbers/output"
/// target = "add/left"
/// ```
///
/// Every section is optional. Nodes keep the order of the file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RawNetworkConfig {
    #[serde(default)]
    pub network: NetworkSection,

    /// User datatypes from `[datatype.<name>]`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub datatype: BTreeMap<String, DatatypeConfig>,

    /// Tool interfaces from `[tool.<name>]`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tool: BTreeMap<String, ToolConfig>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub node: IndexMap<String, NodeConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub link: Vec<LinkConfig>,

    /// Fixed values fed into inputs; each becomes a constant node.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constant: Vec<ConstantConfig>,
}

/// `[network]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NetworkSection {
    #[serde(default = "default_network_id")]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_types: Option<Vec<String>>,

    /// Log level used when neither `--log-level` nor `PLANGRAPH_LOG` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

fn default_network_id() -> String {
    "network".to_string()
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            id: default_network_id(),
            preferred_types: None,
            log_level: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DatatypeConfig {
    pub parent: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ToolConfig {
    #[serde(default)]
    pub inputs: Vec<InputSpec>,
    #[serde(default)]
    pub outputs: Vec<OutputSpec>,
}

/// Literal data of a constant, in one of three shapes:
///
/// - `values = [1, 2]`: one sample per value
/// - `tuple = [1, 2]`: a single sample holding all values
/// - `samples = { a = [1], b = [2, 3] }`: named samples
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ConstantValues {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<RawValue>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuple: Option<Vec<RawValue>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples: Option<BTreeMap<String, Vec<RawValue>>>,
}

impl ConstantValues {
    /// The data described, if exactly one shape is given.
    pub fn to_source_data(&self) -> Option<SourceData> {
        match (&self.values, &self.tuple, &self.samples) {
            (Some(values), None, None) => Some(SourceData::Listed {
                values: values.clone(),
                ids: None,
            }),
            (None, Some(tuple), None) => Some(SourceData::Tuple(tuple.clone())),
            (None, None, Some(samples)) => Some(SourceData::from_map(samples.clone())),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_none() && self.tuple.is_none() && self.samples.is_none()
    }

    pub fn from_source_data(data: &SourceData) -> Self {
        match data {
            SourceData::Listed { values, ids: None } => Self {
                values: Some(values.clone()),
                ..Self::default()
            },
            SourceData::Listed { values, ids: Some(ids) } => Self {
                samples: Some(
                    ids.iter()
                        .zip(values)
                        .map(|(id, v)| (id.to_string(), vec![v.clone()]))
                        .collect(),
                ),
                ..Self::default()
            },
            SourceData::Keyed(map) => Self {
                samples: Some(map.iter().map(|(id, v)| (id.to_string(), v.clone())).collect()),
                ..Self::default()
            },
            SourceData::Tuple(values) => Self {
                tuple: Some(values.clone()),
                ..Self::default()
            },
            SourceData::Scalar(value) => Self {
                tuple: Some(vec![value.clone()]),
                ..Self::default()
            },
        }
    }
}

/// `[node.<id>]` section.
///
/// Tool-backed nodes name their `tool`; source and constant nodes give a
/// `datatype` instead, and constants carry their data inline.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub kind: NodeKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodegroup: Option<String>,

    /// Input id to input group, for inputs outside the default group.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub input_groups: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<RawValue>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuple: Option<Vec<RawValue>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples: Option<BTreeMap<String, Vec<RawValue>>>,
}

impl NodeConfig {
    pub fn constant_values(&self) -> ConstantValues {
        ConstantValues {
            values: self.values.clone(),
            tuple: self.tuple.clone(),
            samples: self.samples.clone(),
        }
    }
}

/// `[[link]]` entry.
///
/// `source` is `node/output` with an optional selection (`node/output[1:3]`),
/// `target` is `node/input` with an optional key (`node/input/2`,
/// `node/input/left`). Without a key the link is appended.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LinkConfig {
    pub source: String,
    pub target: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collapse: Vec<CollapseDim>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub expand: bool,
}

/// `[[constant]]` entry.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ConstantConfig {
    pub target: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<RawValue>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuple: Option<Vec<RawValue>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples: Option<BTreeMap<String, Vec<RawValue>>>,
}

impl ConstantConfig {
    pub fn constant_values(&self) -> ConstantValues {
        ConstantValues {
            values: self.values.clone(),
            tuple: self.tuple.clone(),
            samples: self.samples.clone(),
        }
    }
}

/// `node/output`, optionally with a selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    pub node: String,
    pub output: String,
    pub index: Option<OutputIndex>,
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node, self.output)?;
        if let Some(index) = &self.index {
            write!(f, "[{index}]")?;
        }
        Ok(())
    }
}

/// `node/input`, optionally with an entry key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRef {
    pub node: String,
    pub input: String,
    pub key: Option<InputKey>,
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node, self.input)?;
        if let Some(key) = &self.key {
            write!(f, "/{key}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkPlan {
    pub source: SourceRef,
    pub target: TargetRef,
    pub collapse: Vec<CollapseDim>,
    pub expand: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPlan {
    pub target: TargetRef,
    pub id: Option<String>,
    pub data: SourceData,
}

/// A checked network description, ready to be built.
///
/// Obtained from [`RawNetworkConfig`] through `TryFrom`, which resolves
/// every reference and parses every cardinality string.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub network: NetworkSection,
    /// User datatypes, parents before children.
    pub datatypes: Vec<(String, String)>,
    pub tools: BTreeMap<String, ToolSpec>,
    pub nodes: IndexMap<String, NodeConfig>,
    pub links: Vec<LinkPlan>,
    pub constants: Vec<ConstantPlan>,
}
