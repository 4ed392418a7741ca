// src/planning/input.rs

//! The consumer side of a connection: Input, NamedSubInput and SubInput.
//!
//! An Input maps keys to entries. Integer keys hold SubInputs (one Link
//! each); string keys hold NamedSubInputs, which are integer-keyed
//! containers of SubInputs one level deeper. Entries are created lazily and
//! an unlinked SubInput removes itself during the next update round.

use std::fmt;

use indexmap::IndexMap;
use tracing::debug;

use crate::core::cardinality::CardinalitySpec;
use crate::core::dimension::{Dimension, HasDimensions, Size, is_empty_size, is_trivial_size};
use crate::core::samples::SampleKey;
use crate::core::source_data::SourceData;
use crate::core::symbolic::Cardinality;
use crate::errors::{PlanError, Result};
use crate::planning::graph::{GraphItem, PlanGraph};
use crate::planning::ids::{InputId, LinkId, NamedSubInputId, NodeId, OutputId, SubInputId};
use crate::planning::link::{LinkSource, LinkValue, Linked, TupleItem};
use crate::planning::node::{InputSpec, NodeKind};
use crate::planning::scope::NodeScope;
use crate::planning::session::RoundKey;
use crate::planning::update::{UpdateStatus, Updateable};

/// Key of an Input entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InputKey {
    Index(usize),
    Name(String),
}

impl InputKey {
    /// Keys that parse as integers address integer slots.
    pub fn parse(key: &str) -> Self {
        key.parse::<usize>()
            .map(InputKey::Index)
            .unwrap_or_else(|_| InputKey::Name(key.to_string()))
    }
}

impl From<usize> for InputKey {
    fn from(value: usize) -> Self {
        InputKey::Index(value)
    }
}

impl From<&str> for InputKey {
    fn from(value: &str) -> Self {
        InputKey::parse(value)
    }
}

impl From<String> for InputKey {
    fn from(value: String) -> Self {
        InputKey::parse(&value)
    }
}

impl fmt::Display for InputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputKey::Index(i) => write!(f, "{i}"),
            InputKey::Name(n) => f.write_str(n),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InputEntry {
    Sub(SubInputId),
    Named(NamedSubInputId),
}

impl From<InputEntry> for GraphItem {
    fn from(value: InputEntry) -> Self {
        match value {
            InputEntry::Sub(id) => GraphItem::SubInput(id),
            InputEntry::Named(id) => GraphItem::NamedSubInput(id),
        }
    }
}

/// Container a SubInput lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubInputParent {
    Input(InputId),
    Named(NamedSubInputId),
}

impl From<SubInputParent> for GraphItem {
    fn from(value: SubInputParent) -> Self {
        match value {
            SubInputParent::Input(id) => GraphItem::Input(id),
            SubInputParent::Named(id) => GraphItem::NamedSubInput(id),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Input {
    pub(crate) id: String,
    pub(crate) node: NodeId,
    pub(crate) datatype: String,
    pub(crate) required: bool,
    pub(crate) input_group: String,
    pub(crate) spec: CardinalitySpec,
    pub(crate) entries: IndexMap<InputKey, InputEntry>,
    pub(crate) status: UpdateStatus,
}

impl Input {
    pub(crate) fn new(spec: &InputSpec, cardinality: CardinalitySpec, node: NodeId, input_group: &str) -> Self {
        Self {
            id: spec.id.clone(),
            node,
            datatype: spec.datatype.clone(),
            required: spec.required,
            input_group: input_group.to_string(),
            spec: cardinality,
            entries: IndexMap::new(),
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

    pub fn required(&self) -> bool {
        self.required
    }

    pub fn input_group(&self) -> &str {
        &self.input_group
    }

    pub fn cardinality_spec(&self) -> &CardinalitySpec {
        &self.spec
    }

    pub fn entries(&self) -> &IndexMap<InputKey, InputEntry> {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn valid(&self) -> bool {
        self.status.is_valid()
    }

    pub fn messages(&self) -> &[String] {
        &self.status.messages
    }

    fn next_index(&self) -> usize {
        self.entries
            .keys()
            .filter_map(|k| match k {
                InputKey::Index(i) => Some(i + 1),
                InputKey::Name(_) => None,
            })
            .max()
            .unwrap_or(0)
    }
}

#[derive(Clone, Debug)]
pub struct NamedSubInput {
    pub(crate) key: String,
    pub(crate) input: InputId,
    pub(crate) entries: IndexMap<usize, SubInputId>,
    pub(crate) status: UpdateStatus,
}

impl NamedSubInput {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn input(&self) -> InputId {
        self.input
    }

    pub fn entries(&self) -> &IndexMap<usize, SubInputId> {
        &self.entries
    }

    pub fn valid(&self) -> bool {
        self.status.is_valid()
    }

    pub fn messages(&self) -> &[String] {
        &self.status.messages
    }
}

#[derive(Clone, Debug)]
pub struct SubInput {
    pub(crate) parent: SubInputParent,
    pub(crate) link: Option<LinkId>,
    pub(crate) status: UpdateStatus,
}

impl SubInput {
    pub fn parent(&self) -> SubInputParent {
        self.parent
    }

    pub fn link(&self) -> Option<LinkId> {
        self.link
    }

    pub fn valid(&self) -> bool {
        self.status.is_valid()
    }

    pub fn messages(&self) -> &[String] {
        &self.status.messages
    }
}

/// Pick the dimensions that all candidates agree on.
///
/// Sizes `()`, `(0,)` and `(1,)` are trivial and broadcast against anything.
/// Among the non-trivial sizes all must agree, unless every one of them is
/// (partly) symbolic, in which case the highest-rank one is taken.
pub fn broadcast_dimensions(candidates: Vec<Vec<Dimension>>, what: &str) -> Result<Vec<Dimension>> {
    let sizes: Vec<Vec<Size>> = candidates
        .iter()
        .map(|dims| dims.iter().map(|d| d.size().clone()).collect())
        .collect();

    let mut unique: Vec<&Vec<Size>> = Vec::new();
    for size in sizes.iter().filter(|s| !is_trivial_size(s)) {
        if !unique.contains(&size) {
            unique.push(size);
        }
    }

    let pick = |wanted: &dyn Fn(&Vec<Size>) -> bool| -> Vec<Dimension> {
        sizes
            .iter()
            .position(|s| wanted(s))
            .map(|i| candidates[i].clone())
            .unwrap_or_default()
    };

    match unique.len() {
        0 if sizes.iter().any(|s| s == &[Size::Concrete(1)]) => Ok(pick(&|s| s == &[Size::Concrete(1)])),
        0 if sizes.iter().any(|s| s == &[Size::Concrete(0)]) => Ok(pick(&|s| s == &[Size::Concrete(0)])),
        0 => Ok(Vec::new()),
        1 => {
            let only = unique[0].clone();
            Ok(pick(&|s| s == &only))
        }
        _ => {
            if unique.iter().all(|s| s.iter().any(Size::is_symbolic)) {
                let rank = unique.iter().map(|s| s.len()).max().unwrap_or(0);
                Ok(pick(&|s| s.len() == rank && !is_trivial_size(s)))
            } else {
                let listed: Vec<String> = unique
                    .iter()
                    .map(|s| format!("({})", s.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(", ")))
                    .collect();
                Err(PlanError::SizeMismatch(format!(
                    "Cannot determine dimensions of {what}: sizes do not match ({})",
                    listed.join(" vs ")
                )))
            }
        }
    }
}

impl PlanGraph {
    pub fn input(&self, id: InputId) -> Result<&Input> {
        self.check_handle(id)?;
        self.inputs
            .get(&id)
            .ok_or_else(|| PlanError::NotFound(format!("{id} in {}", self.name())))
    }

    pub(crate) fn input_mut(&mut self, id: InputId) -> Result<&mut Input> {
        self.check_handle(id)?;
        self.inputs
            .get_mut(&id)
            .ok_or_else(|| PlanError::NotFound(id.to_string()))
    }

    pub fn named_subinput(&self, id: NamedSubInputId) -> Result<&NamedSubInput> {
        self.check_handle(id)?;
        self.named
            .get(&id)
            .ok_or_else(|| PlanError::NotFound(format!("{id} in {}", self.name())))
    }

    pub fn subinput(&self, id: SubInputId) -> Result<&SubInput> {
        self.check_handle(id)?;
        self.subinputs
            .get(&id)
            .ok_or_else(|| PlanError::NotFound(format!("{id} in {}", self.name())))
    }

    /// The Input a SubInput ultimately belongs to.
    pub fn subinput_input(&self, id: SubInputId) -> Result<InputId> {
        match self.subinput(id)?.parent {
            SubInputParent::Input(input) => Ok(input),
            SubInputParent::Named(named) => Ok(self.named_subinput(named)?.input),
        }
    }

    /// `Input[key]`: get the entry at `key`, creating it when absent.
    ///
    /// Creating an entry does not start an update round; an entry that is
    /// still unlinked when the next round passes removes itself.
    pub fn input_entry(&mut self, input: InputId, key: impl Into<InputKey>) -> Result<InputEntry> {
        let key = key.into();
        if let Some(entry) = self.input(input)?.entries.get(&key) {
            return Ok(*entry);
        }

        let entry = match &key {
            InputKey::Index(_) => InputEntry::Sub(self.new_subinput(SubInputParent::Input(input))),
            InputKey::Name(name) => {
                let id = NamedSubInputId::new(self.id(), self.next_index());
                self.named.insert(
                    id,
                    NamedSubInput {
                        key: name.clone(),
                        input,
                        entries: IndexMap::new(),
                        status: UpdateStatus::default(),
                    },
                );
                InputEntry::Named(id)
            }
        };

        let entries = &mut self.input_mut(input)?.entries;
        entries.insert(key, entry);
        entries.sort_keys();
        Ok(entry)
    }

    /// `NamedSubInput[index]`, creating the SubInput when absent.
    pub fn named_entry(&mut self, named: NamedSubInputId, index: usize) -> Result<SubInputId> {
        if let Some(sub) = self.named_subinput(named)?.entries.get(&index) {
            return Ok(*sub);
        }
        let sub = self.new_subinput(SubInputParent::Named(named));
        let entries = &mut self.named_mut(named)?.entries;
        entries.insert(index, sub);
        entries.sort_keys();
        Ok(sub)
    }

    /// `SubInput[k]`: a SubInput holds a single slot, reachable as `0` or `-1`.
    pub fn subinput_item(&self, sub: SubInputId, index: i64) -> Result<SubInputId> {
        self.subinput(sub)?;
        if (-1..1).contains(&index) {
            Ok(sub)
        } else {
            Err(PlanError::Value(format!("SubInput index must be -1 or 0, got {index}")))
        }
    }

    /// `Input[key] = value`.
    pub fn set_item(&mut self, input: InputId, key: impl Into<InputKey>, value: impl Into<LinkValue>) -> Result<Linked> {
        match self.input_entry(input, key)? {
            InputEntry::Sub(sub) => self.create_link_from(sub, value.into()),
            InputEntry::Named(named) => {
                self.clear_named(named)?;
                self.append_named(named, value)
            }
        }
    }

    /// Link `value` into a new SubInput after the highest integer key.
    pub fn append(&mut self, input: InputId, value: impl Into<LinkValue>) -> Result<Linked> {
        let index = self.input(input)?.next_index();
        let sub = match self.input_entry(input, index)? {
            InputEntry::Sub(sub) => sub,
            InputEntry::Named(_) => {
                return Err(PlanError::Key(format!("integer key {index} holds a named entry")));
            }
        };
        self.create_link_from(sub, value.into())
    }

    pub fn append_named(&mut self, named: NamedSubInputId, value: impl Into<LinkValue>) -> Result<Linked> {
        let index = self
            .named_subinput(named)?
            .entries
            .keys()
            .map(|k| k + 1)
            .max()
            .unwrap_or(0);
        let sub = self.named_entry(named, index)?;
        self.create_link_from(sub, value.into())
    }

    /// Insert an unlinked SubInput at `index`, moving later integer keys up
    /// by one. Link it with [`PlanGraph::set_subinput_source`].
    pub fn insert_at(&mut self, input: InputId, index: usize) -> Result<SubInputId> {
        let sub = self.new_subinput(SubInputParent::Input(input));
        let entries = &mut self.input_mut(input)?.entries;
        let shifted: IndexMap<InputKey, InputEntry> = entries
            .drain(..)
            .map(|(key, entry)| match key {
                InputKey::Index(i) if i >= index => (InputKey::Index(i + 1), entry),
                other => (other, entry),
            })
            .collect();
        *entries = shifted;
        entries.insert(InputKey::Index(index), InputEntry::Sub(sub));
        entries.sort_keys();
        Ok(sub)
    }

    /// Remove the entry at `key`, destroying its links.
    pub fn remove(&mut self, input: InputId, key: impl Into<InputKey>) -> Result<()> {
        let key = key.into();
        let entry = self
            .input(input)?
            .entries
            .get(&key)
            .copied()
            .ok_or_else(|| PlanError::Key(format!("input has no entry {key}")))?;
        self.drop_entry(entry);
        self.update(GraphItem::Input(input), None, true, false);
        Ok(())
    }

    /// Remove one SubInput wherever it lives, destroying its link.
    pub fn remove_subinput(&mut self, sub: SubInputId) -> Result<()> {
        let parent = self.subinput(sub)?.parent;
        self.drop_subinput(sub);
        self.update(parent.into(), None, true, false);
        Ok(())
    }

    pub fn clear(&mut self, input: InputId) -> Result<()> {
        let entries: Vec<InputEntry> = self.input(input)?.entries.values().copied().collect();
        for entry in entries {
            self.drop_entry(entry);
        }
        self.update(GraphItem::Input(input), None, true, false);
        Ok(())
    }

    fn clear_named(&mut self, named: NamedSubInputId) -> Result<()> {
        let subs: Vec<SubInputId> = self.named_subinput(named)?.entries.values().copied().collect();
        for sub in subs {
            self.drop_subinput(sub);
        }
        Ok(())
    }

    /// Replace the link of a SubInput. The previous link is destroyed first;
    /// `None` removes the SubInput altogether.
    pub fn set_subinput_source(&mut self, sub: SubInputId, source: Option<LinkSource>) -> Result<Option<LinkId>> {
        match source {
            Some(source) => self.create_link(source, sub).map(Some),
            None => {
                self.remove_subinput(sub)?;
                Ok(None)
            }
        }
    }

    /// Connect `value` to a SubInput.
    ///
    /// Outputs are linked directly; plain data is wrapped in a new constant
    /// node first. A tuple that holds any Output is split: the SubInput's
    /// container is cleared and every Output, and every run of plain values
    /// between them, is appended as a separate link.
    pub fn create_link_from(&mut self, sub: SubInputId, value: LinkValue) -> Result<Linked> {
        match value {
            LinkValue::Source(source) => self.create_link(source, sub).map(Linked::Single),
            LinkValue::Data(data) => self.link_constant(sub, data, None).map(Linked::Single),
            LinkValue::Scalar(value) => self.link_constant(sub, SourceData::Scalar(value), None).map(Linked::Single),
            LinkValue::Tuple(items) if items.iter().all(|i| matches!(i, TupleItem::Value(_))) => {
                let values = items
                    .into_iter()
                    .filter_map(|i| match i {
                        TupleItem::Value(v) => Some(v),
                        TupleItem::Source(_) => None,
                    })
                    .collect();
                self.link_constant(sub, SourceData::Tuple(values), None).map(Linked::Single)
            }
            LinkValue::Tuple(items) => self.link_mixed_tuple(sub, items),
        }
    }

    fn link_mixed_tuple(&mut self, sub: SubInputId, items: Vec<TupleItem>) -> Result<Linked> {
        let parent = self.subinput(sub)?.parent;
        match parent {
            SubInputParent::Input(input) => {
                let entries: Vec<InputEntry> = self.input(input)?.entries.values().copied().collect();
                for entry in entries {
                    self.drop_entry(entry);
                }
            }
            SubInputParent::Named(named) => self.clear_named(named)?,
        }

        let mut parts: Vec<LinkValue> = Vec::new();
        let mut run: Vec<crate::core::datatype::RawValue> = Vec::new();
        for item in items {
            match item {
                TupleItem::Value(v) => run.push(v),
                TupleItem::Source(source) => {
                    if !run.is_empty() {
                        parts.push(LinkValue::Data(SourceData::Tuple(std::mem::take(&mut run))));
                    }
                    parts.push(LinkValue::Source(source));
                }
            }
        }
        if !run.is_empty() {
            parts.push(LinkValue::Data(SourceData::Tuple(run)));
        }

        let mut links = Vec::with_capacity(parts.len());
        for part in parts {
            let linked = match parent {
                SubInputParent::Input(input) => self.append(input, part)?,
                SubInputParent::Named(named) => self.append_named(named, part)?,
            };
            links.extend(linked.links());
        }
        Ok(Linked::Many(links))
    }

    fn link_constant(&mut self, sub: SubInputId, data: SourceData, id: Option<String>) -> Result<LinkId> {
        let input = self.subinput_input(sub)?;
        let datatype = self.input(input)?.datatype.clone();
        let base = match id {
            Some(id) => id,
            None => self.subinput_constant_id(sub)?,
        };
        let name = self.unique_node_name(&base);
        let constant = self.create_constant(&datatype, data, Some(&name))?;
        let output = self.node_output(constant, crate::planning::node::SOURCE_OUTPUT)?;
        self.create_link(LinkSource::Output(output), sub)
    }

    /// Id for a constant node feeding this Input: `const__<node>__<input>`.
    pub fn input_constant_id(&self, input: InputId) -> Result<String> {
        let i = self.input(input)?;
        Ok(format!("const__{}__{}", self.node(i.node)?.id, i.id))
    }

    pub fn named_constant_id(&self, named: NamedSubInputId) -> Result<String> {
        let n = self.named_subinput(named)?;
        let position = self
            .input(n.input)?
            .entries
            .values()
            .position(|e| *e == InputEntry::Named(named))
            .unwrap_or(0);
        Ok(format!("{}__{position}", self.input_constant_id(n.input)?))
    }

    /// `<parent constant id>__<position of the SubInput in its parent>`.
    pub fn subinput_constant_id(&self, sub: SubInputId) -> Result<String> {
        let position = self.subinput_position(sub)?;
        let base = match self.subinput(sub)?.parent {
            SubInputParent::Input(input) => self.input_constant_id(input)?,
            SubInputParent::Named(named) => self.named_constant_id(named)?,
        };
        Ok(format!("{base}__{position}"))
    }

    /// Position of a SubInput among its parent's entries.
    pub fn subinput_position(&self, sub: SubInputId) -> Result<usize> {
        let position = match self.subinput(sub)?.parent {
            SubInputParent::Input(input) => self
                .input(input)?
                .entries
                .values()
                .position(|e| *e == InputEntry::Sub(sub)),
            SubInputParent::Named(named) => self
                .named_subinput(named)?
                .entries
                .values()
                .position(|s| *s == sub),
        };
        position.ok_or_else(|| PlanError::NotFound(format!("{sub} is detached from its parent")))
    }

    /// Key of a SubInput in its parent.
    pub(crate) fn subinput_key(&self, sub: SubInputId) -> Result<InputKey> {
        match self.subinput(sub)?.parent {
            SubInputParent::Input(input) => self
                .input(input)?
                .entries
                .iter()
                .find(|(_, e)| **e == InputEntry::Sub(sub))
                .map(|(k, _)| k.clone()),
            SubInputParent::Named(named) => self
                .named_subinput(named)?
                .entries
                .iter()
                .find(|(_, s)| **s == sub)
                .map(|(k, _)| InputKey::Index(*k)),
        }
        .ok_or_else(|| PlanError::NotFound(format!("{sub} is detached from its parent")))
    }

    pub fn set_input_group(&mut self, input: InputId, group: &str) -> Result<()> {
        let node = self.input(input)?.node;
        if self.node(node)?.kind == NodeKind::Macro {
            return Err(PlanError::Value(
                "Input groups are not settable for macro nodes (all inputs have to be in the default group)"
                    .to_string(),
            ));
        }
        self.input_mut(input)?.input_group = group.to_string();
        self.update(GraphItem::Input(input), None, true, false);
        Ok(())
    }

    pub fn set_input_cardinality(&mut self, input: InputId, spec: CardinalitySpec) -> Result<()> {
        self.input_mut(input)?.spec = spec;
        self.update(GraphItem::Input(input), None, true, false);
        Ok(())
    }

    pub fn set_input_datatype(&mut self, input: InputId, datatype: &str) -> Result<()> {
        self.require_datatype(datatype)?;
        self.input_mut(input)?.datatype = datatype.to_string();
        self.update(GraphItem::Input(input), None, true, false);
        Ok(())
    }

    /// Sum of the cardinalities of all entries.
    pub fn input_cardinality(&self, input: InputId, key: Option<&SampleKey>) -> Result<Cardinality> {
        Cardinality::sum(self.input_item_cardinalities(input, key)?)
    }

    pub(crate) fn input_item_cardinalities(&self, input: InputId, key: Option<&SampleKey>) -> Result<Vec<Cardinality>> {
        self.input(input)?
            .entries
            .values()
            .map(|entry| match entry {
                InputEntry::Sub(sub) => self.subinput_cardinality(*sub, key),
                InputEntry::Named(named) => self.named_cardinality(*named, key),
            })
            .collect()
    }

    pub fn named_cardinality(&self, named: NamedSubInputId, key: Option<&SampleKey>) -> Result<Cardinality> {
        let items = self
            .named_subinput(named)?
            .entries
            .values()
            .map(|sub| self.subinput_cardinality(*sub, key))
            .collect::<Result<Vec<_>>>()?;
        Cardinality::sum(items)
    }

    /// The cardinality of the held link, or 0 when unlinked.
    pub fn subinput_cardinality(&self, sub: SubInputId, key: Option<&SampleKey>) -> Result<Cardinality> {
        match self.subinput(sub)?.link {
            Some(link) => self.link_cardinality(link, key),
            None => Ok(Cardinality::zero()),
        }
    }

    /// Outputs (never SubOutputs) delivering data to `input`.
    pub fn sourced_outputs(&self, input: InputId) -> Result<Vec<OutputId>> {
        let mut subs = Vec::new();
        for entry in self.input(input)?.entries.values() {
            match entry {
                InputEntry::Sub(sub) => subs.push(*sub),
                InputEntry::Named(named) => subs.extend(self.named_subinput(*named)?.entries.values().copied()),
            }
        }

        let mut outputs = Vec::new();
        for sub in subs {
            if let Some(link) = self.subinput(sub)?.link {
                let output = self.root_output(self.link(link)?.source)?;
                if !outputs.contains(&output) {
                    outputs.push(output);
                }
            }
        }
        Ok(outputs)
    }

    pub(crate) fn input_dimensions(&self, input: InputId) -> Result<Vec<Dimension>> {
        let i = self.input(input)?;
        let candidates = i
            .entries
            .values()
            .map(|entry| self.view(GraphItem::from(*entry)).dimensions())
            .collect::<Result<Vec<_>>>()?;
        broadcast_dimensions(candidates, &format!("Input {}", i.id))
    }

    pub(crate) fn named_dimensions(&self, named: NamedSubInputId) -> Result<Vec<Dimension>> {
        let n = self.named_subinput(named)?;
        let candidates = n
            .entries
            .values()
            .map(|sub| self.subinput_dimensions(*sub))
            .collect::<Result<Vec<_>>>()?;
        broadcast_dimensions(candidates, &format!("NamedSubInput {}", n.key))
    }

    pub(crate) fn subinput_dimensions(&self, sub: SubInputId) -> Result<Vec<Dimension>> {
        match self.subinput(sub)?.link {
            Some(link) => self.view(link).dimensions(),
            None => Ok(Vec::new()),
        }
    }

    fn named_mut(&mut self, id: NamedSubInputId) -> Result<&mut NamedSubInput> {
        self.check_handle(id)?;
        self.named
            .get_mut(&id)
            .ok_or_else(|| PlanError::NotFound(id.to_string()))
    }

    fn new_subinput(&mut self, parent: SubInputParent) -> SubInputId {
        let id = SubInputId::new(self.id(), self.next_index());
        self.subinputs.insert(
            id,
            SubInput {
                parent,
                link: None,
                status: UpdateStatus::default(),
            },
        );
        id
    }

    fn drop_entry(&mut self, entry: InputEntry) {
        match entry {
            InputEntry::Sub(sub) => self.drop_subinput(sub),
            InputEntry::Named(named) => {
                let subs: Vec<SubInputId> = self
                    .named
                    .get(&named)
                    .map(|n| n.entries.values().copied().collect())
                    .unwrap_or_default();
                for sub in subs {
                    self.drop_subinput(sub);
                }
                if let Some(n) = self.named.shift_remove(&named) {
                    if let Some(input) = self.inputs.get_mut(&n.input) {
                        input.entries.retain(|_, e| *e != InputEntry::Named(named));
                    }
                }
            }
        }
    }

    /// Detach a SubInput from its parent and destroy its link.
    pub(crate) fn drop_subinput(&mut self, sub: SubInputId) {
        let Some(removed) = self.subinputs.shift_remove(&sub) else {
            return;
        };
        if let Some(link) = removed.link {
            self.destroy_link(link);
        }
        match removed.parent {
            SubInputParent::Input(input) => {
                if let Some(i) = self.inputs.get_mut(&input) {
                    i.entries.retain(|_, e| *e != InputEntry::Sub(sub));
                }
            }
            SubInputParent::Named(named) => {
                if let Some(n) = self.named.get_mut(&named) {
                    n.entries.retain(|_, s| *s != sub);
                }
            }
        }
        debug!(subinput = %sub, "removed subinput");
    }

    pub(crate) fn refresh_input(&mut self, input: InputId, key: RoundKey, forward: bool, backward: bool) {
        let Ok(i) = self.input(input) else {
            return;
        };
        let node = i.node;
        let entries: Vec<InputEntry> = i.entries.values().copied().collect();

        for entry in entries {
            self.update(entry.into(), Some(key), forward, backward);
        }

        let (valid, messages) = self.evaluate_input(input);
        if let Ok(i) = self.input_mut(input) {
            i.status.set(valid, messages);
        }

        self.update(GraphItem::Node(node), Some(key), forward, backward);
    }

    pub(crate) fn refresh_named(&mut self, named: NamedSubInputId, key: RoundKey, forward: bool, backward: bool) {
        let Ok(n) = self.named_subinput(named) else {
            return;
        };
        let parent = n.input;
        let subs: Vec<SubInputId> = n.entries.values().copied().collect();

        for sub in &subs {
            self.update(GraphItem::SubInput(*sub), Some(key), forward, backward);
        }

        let mut messages = self.entry_messages(subs.iter().map(|s| InputEntry::Sub(*s)));
        if let Err(e) = self.named_dimensions(named) {
            messages.push(e.to_string());
        }
        if let Ok(n) = self.named_mut(named) {
            n.status.set(messages.is_empty(), messages);
        }

        self.update(GraphItem::Input(parent), Some(key), forward, backward);
    }

    pub(crate) fn refresh_subinput(&mut self, sub: SubInputId, key: RoundKey, forward: bool, backward: bool) {
        let Ok(s) = self.subinput(sub) else {
            return;
        };
        let parent = s.parent;

        match s.link {
            None => {
                debug!(subinput = %sub, "no source in this SubInput, removing");
                self.drop_subinput(sub);
            }
            Some(link) => {
                self.update(GraphItem::Link(link), Some(key), false, backward);
                let (valid, messages) = match self.link(link) {
                    Ok(l) if l.status.is_valid() => (true, Vec::new()),
                    Ok(l) => {
                        let mut messages = vec![format!("SubInput source ({}) is not valid", l.name)];
                        messages.extend(l.status.messages.iter().cloned());
                        (false, messages)
                    }
                    Err(e) => (false, vec![e.to_string()]),
                };
                if let Some(s) = self.subinputs.get_mut(&sub) {
                    s.status.set(valid, messages);
                }
            }
        }

        self.update(parent.into(), Some(key), forward, backward);
    }

    fn entry_messages(&self, entries: impl Iterator<Item = InputEntry>) -> Vec<String> {
        let mut messages = Vec::new();
        for entry in entries {
            let status = match entry {
                InputEntry::Sub(sub) => self.subinputs.get(&sub).map(|s| &s.status),
                InputEntry::Named(named) => self.named.get(&named).map(|n| &n.status),
            };
            let Some(status) = status else {
                continue;
            };
            if status.is_valid() {
                continue;
            }
            let fullid = self.fullid(entry.into());
            if status.messages.is_empty() {
                messages.push(format!("SubInput {fullid} is not valid"));
            }
            for message in &status.messages {
                messages.push(format!("SubInput {fullid} is not valid: {message}"));
            }
        }
        messages
    }

    fn evaluate_input(&self, input: InputId) -> (bool, Vec<String>) {
        let i = match self.input(input) {
            Ok(i) => i,
            Err(e) => return (false, vec![e.to_string()]),
        };
        let mut messages = self.entry_messages(i.entries.values().copied());

        let scope = NodeScope::new(self, i.node, None);
        match self.input_cardinality(input, None) {
            Ok(cardinality) => {
                let accepted = match cardinality.as_concrete() {
                    Some(0) if !i.required => Ok(true),
                    _ => i.spec.validate(&scope, None, &cardinality, true),
                };
                match accepted {
                    Ok(true) => {}
                    Ok(false) => {
                        messages.push(format!(
                            "Input \"{}\" cardinality ({cardinality}) is not valid (must be {}, required is {})",
                            i.id, i.spec, i.required
                        ));
                        if let CardinalitySpec::As(target) = &i.spec {
                            if target.index().is_none() {
                                if let Ok(Some(c)) = crate::core::cardinality::CardinalityContext::input_cardinality(
                                    &scope,
                                    target.name(),
                                    None,
                                ) {
                                    messages.push(format!("Target input {} has cardinality {c}", target.name()));
                                }
                            }
                        }
                    }
                    Err(e) => messages.push(format!("Input \"{}\" cardinality cannot be checked: {e}", i.id)),
                }
            }
            Err(e) => messages.push(format!("Input \"{}\" cardinality cannot be determined: {e}", i.id)),
        }

        match self.view(input).size() {
            Err(e) => messages.push(format!("Cannot determine size of Input \"{}\": {e}", i.id)),
            Ok(size) if i.required && is_empty_size(&size) => {
                let sources: Vec<String> = self
                    .sourced_outputs(input)
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|o| self.output(o).ok().and_then(|o| self.node(o.node).ok()))
                    .map(|n| n.id.clone())
                    .collect();
                messages.push(format!(
                    "Required Input \"{}\" cannot have size 0. Input obtained from nodes: {}",
                    i.id,
                    sources.join(", ")
                ));
            }
            Ok(_) => {}
        }

        (messages.is_empty(), messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(sizes: &[(&str, Size)]) -> Vec<Dimension> {
        sizes.iter().map(|(n, s)| Dimension::new(*n, s.clone())).collect()
    }

    #[test]
    fn keys_coerce_numeric_strings() {
        assert_eq!(InputKey::from("3"), InputKey::Index(3));
        assert_eq!(InputKey::from("left"), InputKey::Name("left".into()));
        assert!(InputKey::Index(10) < InputKey::Name("a".into()));
    }

    #[test]
    fn insert_at_moves_later_keys_up() {
        use crate::planning::node::{OutputSpec, SOURCE_OUTPUT, ToolSpec};

        let mut graph = PlanGraph::new("net");
        let tool = ToolSpec::new("sink")
            .with_input(InputSpec::new("in", "Int", "*"))
            .with_output(OutputSpec::new("out", "Int", "1"));
        let source = graph.create_source("Int", "numbers").unwrap();
        let node = graph.create_node(&tool, "sink", NodeKind::Tool).unwrap();
        let input = graph.node_input(node, "in").unwrap();
        let output = graph.node_output(source, SOURCE_OUTPUT).unwrap();
        graph.append(input, output).unwrap();
        graph.append(input, output).unwrap();
        let second = graph.input(input).unwrap().entries()[&InputKey::Index(1)];

        let inserted = graph.insert_at(input, 1).unwrap();
        let entries = graph.input(input).unwrap().entries();
        let keys: Vec<&InputKey> = entries.keys().collect();
        assert_eq!(keys, [&InputKey::Index(0), &InputKey::Index(1), &InputKey::Index(2)]);
        assert!(matches!(entries[&InputKey::Index(1)], InputEntry::Sub(sub) if sub == inserted));
        assert_eq!(entries[&InputKey::Index(2)], second);
    }

    #[test]
    fn broadcast_ignores_trivial_sizes() {
        let a = dims(&[("a", Size::Concrete(3))]);
        let one = dims(&[("c", Size::Concrete(1))]);
        let picked = broadcast_dimensions(vec![one.clone(), a.clone(), Vec::new()], "x").unwrap();
        assert_eq!(picked, a);

        let picked = broadcast_dimensions(vec![Vec::new(), one.clone()], "x").unwrap();
        assert_eq!(picked, one);
        assert!(broadcast_dimensions(vec![], "x").unwrap().is_empty());
    }

    #[test]
    fn broadcast_rejects_concrete_disagreement() {
        let a = dims(&[("a", Size::Concrete(3))]);
        let b = dims(&[("b", Size::Concrete(4))]);
        let err = broadcast_dimensions(vec![a, b], "Input in").unwrap_err();
        assert!(matches!(err, PlanError::SizeMismatch(_)));
    }

    #[test]
    fn broadcast_takes_highest_rank_among_symbolic_sizes() {
        let a = dims(&[("a", Size::symbol("N_a"))]);
        let ab = dims(&[("a", Size::symbol("N_a")), ("b", Size::symbol("N_b"))]);
        let picked = broadcast_dimensions(vec![a, ab.clone()], "x").unwrap();
        assert_eq!(picked, ab);
    }
}
