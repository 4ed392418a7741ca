// src/planning/output.rs

//! The producer side of a connection: Output and SubOutput.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use tracing::debug;

use crate::core::cardinality::CardinalitySpec;
use crate::core::samples::{SampleCollection, SampleItem, SampleKey};
use crate::core::symbolic::Cardinality;
use crate::errors::{PlanError, Result};
use crate::planning::graph::{GraphItem, PlanGraph};
use crate::planning::ids::{LinkId, NodeId, OutputId, SubOutputId};
use crate::planning::link::LinkSource;
use crate::planning::node::OutputSpec;
use crate::planning::scope::NodeScope;
use crate::planning::session::RoundKey;
use crate::planning::update::{UpdateStatus, Updateable};

/// How an Output derives its dimensions and cardinality from its node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OutputKind {
    #[default]
    Regular,
    /// Output of a source or constant node; its cardinality is unknown
    /// until run time.
    Source,
    AdvancedFlow,
    Macro,
}

/// Selection of elements out of one Output sample: `out[2]`, `out[1:4:2]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputIndex {
    Int(i64),
    Slice {
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    },
}

impl OutputIndex {
    pub fn slice(start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Result<Self> {
        if step == Some(0) {
            return Err(PlanError::Value("slice step cannot be zero".to_string()));
        }
        Ok(OutputIndex::Slice { start, stop, step })
    }

    /// Number of elements selected out of `length`.
    ///
    /// Slices are normalised against `length` the way sequence slicing
    /// clamps out-of-range bounds, then counted as `(stop - start) // step`.
    pub fn selected_len(&self, length: u64) -> u64 {
        match *self {
            OutputIndex::Int(_) => u64::from(length >= 1),
            OutputIndex::Slice { start, stop, step } => {
                let length = i64::try_from(length).unwrap_or(i64::MAX);
                let (start, stop, step) = slice_indices(start, stop, step, length);
                u64::try_from(floor_div(stop.saturating_sub(start), step)).unwrap_or(0)
            }
        }
    }
}

fn slice_indices(start: Option<i64>, stop: Option<i64>, step: Option<i64>, length: i64) -> (i64, i64, i64) {
    let step = step.unwrap_or(1);
    let (lower, upper) = if step < 0 { (-1, length - 1) } else { (0, length) };
    let clamp = |value: i64| {
        let value = if value < 0 { value + length } else { value };
        value.clamp(lower, upper)
    };
    let start = start.map(clamp).unwrap_or(if step < 0 { upper } else { lower });
    let stop = stop.map(clamp).unwrap_or(if step < 0 { lower } else { upper });
    (start, stop, step)
}

fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    if a % b != 0 && ((a < 0) != (b < 0)) { q - 1 } else { q }
}

impl fmt::Display for OutputIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |v: Option<i64>| v.map(|v| v.to_string()).unwrap_or_default();
        match *self {
            OutputIndex::Int(i) => write!(f, "{i}"),
            OutputIndex::Slice { start, stop, step: None } => write!(f, "{}:{}", part(start), part(stop)),
            OutputIndex::Slice { start, stop, step } => {
                write!(f, "{}:{}:{}", part(start), part(stop), part(step))
            }
        }
    }
}

impl FromStr for OutputIndex {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || PlanError::Value(format!("invalid output index {s:?}"));
        let number = |part: &str| -> Result<Option<i64>> {
            let part = part.trim();
            if part.is_empty() {
                Ok(None)
            } else {
                part.parse::<i64>().map(Some).map_err(|_| bad())
            }
        };

        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [single] => number(single)?.map(OutputIndex::Int).ok_or_else(bad),
            [start, stop] => OutputIndex::slice(number(start)?, number(stop)?, None),
            [start, stop, step] => OutputIndex::slice(number(start)?, number(stop)?, number(step)?),
            _ => Err(bad()),
        }
    }
}

impl From<i64> for OutputIndex {
    fn from(value: i64) -> Self {
        OutputIndex::Int(value)
    }
}

impl From<std::ops::Range<i64>> for OutputIndex {
    fn from(value: std::ops::Range<i64>) -> Self {
        OutputIndex::Slice {
            start: Some(value.start),
            stop: Some(value.end),
            step: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Output {
    pub(crate) id: String,
    pub(crate) node: NodeId,
    pub(crate) datatype: String,
    pub(crate) spec: CardinalitySpec,
    pub(crate) kind: OutputKind,
    pub(crate) preferred_types: Option<Vec<String>>,
    pub(crate) listeners: Vec<LinkId>,
    pub(crate) suboutputs: IndexMap<String, SubOutputId>,
    pub(crate) samples: SampleCollection,
    pub(crate) status: UpdateStatus,
}

impl Output {
    pub(crate) fn new(spec: &OutputSpec, cardinality: CardinalitySpec, node: NodeId, kind: OutputKind) -> Self {
        Self {
            id: spec.id.clone(),
            node,
            datatype: spec.datatype.clone(),
            spec: cardinality,
            kind,
            preferred_types: None,
            listeners: Vec::new(),
            suboutputs: IndexMap::new(),
            samples: SampleCollection::new(),
            status: UpdateStatus::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn datatype(&self) -> &str {
        &self.datatype
    }

    pub fn kind(&self) -> OutputKind {
        self.kind
    }

    pub fn cardinality_spec(&self) -> &CardinalitySpec {
        &self.spec
    }

    pub fn preferred_types(&self) -> Option<&[String]> {
        self.preferred_types.as_deref()
    }

    /// Links reading this Output directly.
    pub fn listeners(&self) -> &[LinkId] {
        &self.listeners
    }

    pub fn samples(&self) -> &SampleCollection {
        &self.samples
    }

    pub fn valid(&self) -> bool {
        self.status.is_valid()
    }

    pub fn messages(&self) -> &[String] {
        &self.status.messages
    }
}

#[derive(Clone, Debug)]
pub struct SubOutput {
    pub(crate) output: OutputId,
    pub(crate) index: OutputIndex,
    pub(crate) listeners: Vec<LinkId>,
    pub(crate) status: UpdateStatus,
}

impl SubOutput {
    pub fn output(&self) -> OutputId {
        self.output
    }

    pub fn index(&self) -> OutputIndex {
        self.index
    }

    pub fn listeners(&self) -> &[LinkId] {
        &self.listeners
    }

    pub fn valid(&self) -> bool {
        self.status.is_valid()
    }

    pub fn messages(&self) -> &[String] {
        &self.status.messages
    }
}

impl PlanGraph {
    pub fn output(&self, id: OutputId) -> Result<&Output> {
        self.check_handle(id)?;
        self.outputs
            .get(&id)
            .ok_or_else(|| PlanError::NotFound(format!("{id} in {}", self.name())))
    }

    pub(crate) fn output_mut(&mut self, id: OutputId) -> Result<&mut Output> {
        self.check_handle(id)?;
        self.outputs
            .get_mut(&id)
            .ok_or_else(|| PlanError::NotFound(id.to_string()))
    }

    pub fn suboutput(&self, id: SubOutputId) -> Result<&SubOutput> {
        self.check_handle(id)?;
        self.suboutputs
            .get(&id)
            .ok_or_else(|| PlanError::NotFound(format!("{id} in {}", self.name())))
    }

    pub(crate) fn suboutput_mut(&mut self, id: SubOutputId) -> Result<&mut SubOutput> {
        self.check_handle(id)?;
        self.suboutputs
            .get_mut(&id)
            .ok_or_else(|| PlanError::NotFound(id.to_string()))
    }

    /// `Output[index]`. The same index always yields the same SubOutput.
    pub fn output_item(&mut self, output: OutputId, index: impl Into<OutputIndex>) -> Result<SubOutputId> {
        let index = index.into();
        if let OutputIndex::Slice { step: Some(0), .. } = index {
            return Err(PlanError::Value("slice step cannot be zero".to_string()));
        }
        let key = index.to_string();
        if let Some(existing) = self.output(output)?.suboutputs.get(&key) {
            return Ok(*existing);
        }

        let id = SubOutputId::new(self.id(), self.next_index());
        self.suboutputs.insert(
            id,
            SubOutput {
                output,
                index,
                listeners: Vec::new(),
                status: UpdateStatus::default(),
            },
        );
        self.output_mut(output)?.suboutputs.insert(key, id);
        debug!(output = %self.fullid(output.into()), %index, "created suboutput");
        self.update(GraphItem::SubOutput(id), None, true, false);
        Ok(id)
    }

    /// The Output behind a link source.
    pub fn root_output(&self, source: LinkSource) -> Result<OutputId> {
        match source {
            LinkSource::Output(output) => Ok(output),
            LinkSource::SubOutput(sub) => Ok(self.suboutput(sub)?.output),
        }
    }

    /// Planning cardinality of one sample of `output`.
    ///
    /// With a key addressing a stored sample, that sample's cardinality.
    /// Source outputs are the symbol `N_<node>` until their data is known;
    /// other outputs ask their cardinality spec. `None` when the spec cannot
    /// tell before execution.
    pub fn output_cardinality(&self, output: OutputId, key: Option<&SampleKey>) -> Result<Option<Cardinality>> {
        let o = self.output(output)?;
        if let Some(sample) = key.and_then(|k| o.samples.get(k)) {
            return Ok(Some(Cardinality::Concrete(sample.cardinality())));
        }
        match o.kind {
            OutputKind::Source => Ok(Some(Cardinality::symbol(format!("N_{}", self.node(o.node)?.id)))),
            _ => {
                let _deriving = self.derive(GraphItem::Output(output))?;
                let scope = NodeScope::new(self, o.node, Some(output));
                o.spec.calculate_planning_cardinality(&scope)
            }
        }
    }

    pub fn suboutput_cardinality(&self, sub: SubOutputId, key: Option<&SampleKey>) -> Result<Option<Cardinality>> {
        let s = self.suboutput(sub)?;
        Ok(self
            .output_cardinality(s.output, key)?
            .map(|parent| match parent.as_concrete() {
                Some(length) => Cardinality::Concrete(s.index.selected_len(length)),
                None => parent,
            }))
    }

    pub fn source_cardinality(&self, source: LinkSource, key: Option<&SampleKey>) -> Result<Option<Cardinality>> {
        match source {
            LinkSource::Output(output) => self.output_cardinality(output, key),
            LinkSource::SubOutput(sub) => self.suboutput_cardinality(sub, key),
        }
    }

    /// Links reading `output`, directly or through one of its SubOutputs.
    pub fn output_listeners(&self, output: OutputId) -> Result<Vec<LinkId>> {
        let o = self.output(output)?;
        let mut found = o.listeners.clone();
        for sub in o.suboutputs.values() {
            found.extend(self.suboutput(*sub)?.listeners.iter().copied());
        }
        Ok(found)
    }

    /// Preferred datatypes for `output`: its own, else the graph's, else the
    /// registry default.
    pub fn output_preferred_types(&self, output: OutputId) -> Result<Vec<String>> {
        let o = self.output(output)?;
        Ok(o.preferred_types
            .clone()
            .or_else(|| self.preferred_types().map(<[String]>::to_vec))
            .unwrap_or_else(|| self.registry().default_preferred().to_vec()))
    }

    /// The datatype `output` will actually deliver, given what its listeners
    /// accept.
    pub fn resulting_datatype(&self, output: OutputId) -> Result<Option<String>> {
        let o = self.output(output)?;
        let mut requested = vec![o.datatype.clone()];
        for link in self.output_listeners(output)? {
            let target = self.link(link)?.target;
            let input = self.subinput_input(target)?;
            requested.push(self.input(input)?.datatype.clone());
        }
        let requested: Vec<&str> = requested.iter().map(String::as_str).collect();
        Ok(self
            .registry()
            .match_types(&requested, &self.output_preferred_types(output)?))
    }

    pub fn set_output_cardinality(&mut self, output: OutputId, spec: CardinalitySpec) -> Result<()> {
        self.output_mut(output)?.spec = spec;
        self.update(GraphItem::Output(output), None, true, false);
        Ok(())
    }

    pub fn set_output_preferred_types(&mut self, output: OutputId, types: Option<Vec<String>>) -> Result<()> {
        if let Some(types) = &types {
            for datatype in types {
                self.require_datatype(datatype)?;
            }
        }
        let node = self.output(output)?.node;
        self.output_mut(output)?.preferred_types = types;
        self.update(GraphItem::Node(node), None, true, false);
        Ok(())
    }

    pub fn output_sample(&self, output: OutputId, key: &SampleKey) -> Result<Option<&SampleItem>> {
        Ok(self.output(output)?.samples.get(key))
    }

    pub(crate) fn store_output_sample(&mut self, output: OutputId, item: SampleItem) -> Result<()> {
        self.output_mut(output)?.samples.insert(item);
        Ok(())
    }

    pub(crate) fn refresh_output(&mut self, output: OutputId, key: RoundKey, forward: bool, backward: bool) {
        let Ok(o) = self.output(output) else {
            return;
        };
        let node = o.node;
        self.update(GraphItem::Node(node), Some(key), forward, backward);
        let status = self.node_status_for_child(node);
        if let Ok(o) = self.output_mut(output) {
            o.status.set(status.0, status.1);
        }
    }

    pub(crate) fn refresh_suboutput(&mut self, sub: SubOutputId, key: RoundKey, forward: bool, backward: bool) {
        let Ok(s) = self.suboutput(sub) else {
            return;
        };
        let output = s.output;
        self.update(GraphItem::Output(output), Some(key), forward, backward);
        let node = self.output(output).map(|o| o.node);
        let status = match node {
            Ok(node) => self.node_status_for_child(node),
            Err(e) => (false, vec![e.to_string()]),
        };
        if let Ok(s) = self.suboutput_mut(sub) {
            s.status.set(status.0, status.1);
        }
    }

    fn node_status_for_child(&self, node: NodeId) -> (bool, Vec<String>) {
        match self.node(node) {
            Ok(n) if n.valid() => (true, Vec::new()),
            Ok(_) => (false, vec!["Parent NodeRun is not valid".to_string()]),
            Err(e) => (false, vec![e.to_string()]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_keys_are_canonical() {
        assert_eq!(OutputIndex::Int(2).to_string(), "2");
        assert_eq!(OutputIndex::from(1i64..4).to_string(), "1:4");
        assert_eq!(OutputIndex::slice(Some(1), Some(4), Some(2)).unwrap().to_string(), "1:4:2");
        assert_eq!(OutputIndex::slice(None, Some(3), None).unwrap().to_string(), ":3");
        assert_eq!("1:4:2".parse::<OutputIndex>().unwrap(), OutputIndex::slice(Some(1), Some(4), Some(2)).unwrap());
        assert_eq!("-1".parse::<OutputIndex>().unwrap(), OutputIndex::Int(-1));
        assert!(matches!("::0".parse::<OutputIndex>(), Err(PlanError::Value(_))));
        assert!(matches!("a:b".parse::<OutputIndex>(), Err(PlanError::Value(_))));
    }

    #[test]
    fn slices_count_like_sequence_slicing() {
        let every_other = OutputIndex::slice(Some(2), Some(8), Some(2)).unwrap();
        assert_eq!(every_other.selected_len(10), 3);
        assert_eq!(OutputIndex::from(0i64..1).selected_len(10), 1);
        assert_eq!(OutputIndex::from(0i64..20).selected_len(10), 10);
        assert_eq!(OutputIndex::from(5i64..2).selected_len(10), 0);
        assert_eq!(OutputIndex::slice(Some(-3), None, None).unwrap().selected_len(10), 3);
        assert_eq!(OutputIndex::slice(None, None, Some(-1)).unwrap().selected_len(4), 4);
    }

    #[test]
    fn integer_index_selects_one_element_when_present() {
        assert_eq!(OutputIndex::Int(3).selected_len(10), 1);
        assert_eq!(OutputIndex::Int(0).selected_len(0), 0);
    }
}
