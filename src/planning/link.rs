// src/planning/link.rs

//! Links: the edge between an Output (or a slice of one) and a SubInput.
//!
//! A link may reshape what flows through it. `collapse` folds source
//! dimensions into the per-sample cardinality, `expand` does the reverse and
//! turns the per-sample cardinality into a new trailing dimension.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::datatype::RawValue;
use crate::core::dimension::{Dimension, HasDimensions, Size};
use crate::core::samples::SampleKey;
use crate::core::source_data::SourceData;
use crate::core::symbolic::Cardinality;
use crate::errors::{PlanError, Result};
use crate::planning::graph::{GraphItem, PlanGraph};
use crate::planning::ids::{LinkId, NodeId, OutputId, SubInputId, SubOutputId};
use crate::planning::session::RoundKey;
use crate::planning::update::{UpdateStatus, Updateable};

/// What a link reads from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LinkSource {
    Output(OutputId),
    SubOutput(SubOutputId),
}

impl From<OutputId> for LinkSource {
    fn from(value: OutputId) -> Self {
        LinkSource::Output(value)
    }
}

impl From<SubOutputId> for LinkSource {
    fn from(value: SubOutputId) -> Self {
        LinkSource::SubOutput(value)
    }
}

impl From<LinkSource> for GraphItem {
    fn from(value: LinkSource) -> Self {
        match value {
            LinkSource::Output(id) => GraphItem::Output(id),
            LinkSource::SubOutput(id) => GraphItem::SubOutput(id),
        }
    }
}

/// A source dimension to collapse, by position (negative counts from the
/// end) or by name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CollapseDim {
    Index(i64),
    Name(String),
}

impl fmt::Display for CollapseDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollapseDim::Index(i) => write!(f, "{i}"),
            CollapseDim::Name(n) => f.write_str(n),
        }
    }
}

impl From<i64> for CollapseDim {
    fn from(value: i64) -> Self {
        CollapseDim::Index(value)
    }
}

impl From<&str> for CollapseDim {
    fn from(value: &str) -> Self {
        value
            .parse::<i64>()
            .map(CollapseDim::Index)
            .unwrap_or_else(|_| CollapseDim::Name(value.to_string()))
    }
}

/// One element of a tuple handed to an input.
#[derive(Clone, Debug, PartialEq)]
pub enum TupleItem {
    Source(LinkSource),
    Value(RawValue),
}

impl From<OutputId> for TupleItem {
    fn from(value: OutputId) -> Self {
        TupleItem::Source(value.into())
    }
}

impl From<SubOutputId> for TupleItem {
    fn from(value: SubOutputId) -> Self {
        TupleItem::Source(value.into())
    }
}

impl From<RawValue> for TupleItem {
    fn from(value: RawValue) -> Self {
        TupleItem::Value(value)
    }
}

impl From<i64> for TupleItem {
    fn from(value: i64) -> Self {
        TupleItem::Value(value.into())
    }
}

impl From<&str> for TupleItem {
    fn from(value: &str) -> Self {
        TupleItem::Value(value.into())
    }
}

/// Anything that can be assigned to an input slot.
#[derive(Clone, Debug, PartialEq)]
pub enum LinkValue {
    Source(LinkSource),
    Data(SourceData),
    Tuple(Vec<TupleItem>),
    Scalar(RawValue),
}

impl From<LinkSource> for LinkValue {
    fn from(value: LinkSource) -> Self {
        LinkValue::Source(value)
    }
}

impl From<OutputId> for LinkValue {
    fn from(value: OutputId) -> Self {
        LinkValue::Source(value.into())
    }
}

impl From<SubOutputId> for LinkValue {
    fn from(value: SubOutputId) -> Self {
        LinkValue::Source(value.into())
    }
}

impl From<SourceData> for LinkValue {
    fn from(value: SourceData) -> Self {
        LinkValue::Data(value)
    }
}

impl From<Vec<TupleItem>> for LinkValue {
    fn from(value: Vec<TupleItem>) -> Self {
        LinkValue::Tuple(value)
    }
}

impl From<RawValue> for LinkValue {
    fn from(value: RawValue) -> Self {
        LinkValue::Scalar(value)
    }
}

impl From<i64> for LinkValue {
    fn from(value: i64) -> Self {
        LinkValue::Scalar(value.into())
    }
}

impl From<&str> for LinkValue {
    fn from(value: &str) -> Self {
        LinkValue::Scalar(value.into())
    }
}

/// Links created by one assignment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Linked {
    Single(LinkId),
    Many(Vec<LinkId>),
}

impl Linked {
    pub fn links(&self) -> Vec<LinkId> {
        match self {
            Linked::Single(link) => vec![*link],
            Linked::Many(links) => links.clone(),
        }
    }

    pub fn single(&self) -> Option<LinkId> {
        match self {
            Linked::Single(link) => Some(*link),
            Linked::Many(links) if links.len() == 1 => links.first().copied(),
            Linked::Many(_) => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Link {
    pub(crate) name: String,
    pub(crate) source: LinkSource,
    pub(crate) target: SubInputId,
    pub(crate) collapse: Vec<CollapseDim>,
    pub(crate) expand: bool,
    pub(crate) status: UpdateStatus,
}

impl Link {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> LinkSource {
        self.source
    }

    pub fn target(&self) -> SubInputId {
        self.target
    }

    pub fn collapse(&self) -> &[CollapseDim] {
        &self.collapse
    }

    pub fn expand(&self) -> bool {
        self.expand
    }

    pub fn valid(&self) -> bool {
        self.status.is_valid()
    }

    pub fn messages(&self) -> &[String] {
        &self.status.messages
    }
}

/// Positions of the collapsed dimensions within `dimensions`.
pub(crate) fn resolve_collapse(dimensions: &[Dimension], collapse: &[CollapseDim]) -> Result<Vec<usize>> {
    let ndims = dimensions.len() as i64;
    collapse
        .iter()
        .map(|dim| match dim {
            CollapseDim::Index(i) => {
                let position = if *i < 0 { i + ndims } else { *i };
                if (0..ndims).contains(&position) {
                    Ok(position as usize)
                } else {
                    Err(PlanError::Index(format!("collapse dimension {i} out of range for {ndims} dimensions")))
                }
            }
            CollapseDim::Name(name) => dimensions
                .iter()
                .position(|d| d.name() == name)
                .ok_or_else(|| PlanError::Key(format!("no dimension named {name} to collapse"))),
        })
        .collect()
}

impl PlanGraph {
    pub fn link(&self, id: LinkId) -> Result<&Link> {
        self.check_handle(id)?;
        self.links
            .get(&id)
            .ok_or_else(|| PlanError::NotFound(format!("{id} in {}", self.name())))
    }

    fn link_mut(&mut self, id: LinkId) -> Result<&mut Link> {
        self.check_handle(id)?;
        self.links
            .get_mut(&id)
            .ok_or_else(|| PlanError::NotFound(id.to_string()))
    }

    pub fn links(&self) -> impl Iterator<Item = (LinkId, &Link)> {
        self.links.iter().map(|(id, l)| (*id, l))
    }

    pub fn link_by_name(&self, name: &str) -> Option<LinkId> {
        self.links.iter().find(|(_, l)| l.name == name).map(|(id, _)| *id)
    }

    /// Node owning the Output a link source belongs to.
    pub fn source_node(&self, source: LinkSource) -> Result<NodeId> {
        Ok(self.output(self.root_output(source)?)?.node)
    }

    /// Node owning the Input a link delivers to.
    pub fn target_node(&self, link: LinkId) -> Result<NodeId> {
        let input = self.subinput_input(self.link(link)?.target)?;
        Ok(self.input(input)?.node)
    }

    /// Connect `source` to the SubInput `target`, replacing its current link.
    pub fn create_link(&mut self, source: LinkSource, target: SubInputId) -> Result<LinkId> {
        let foreign = match source {
            LinkSource::Output(o) => o.graph() != self.id(),
            LinkSource::SubOutput(s) => s.graph() != self.id(),
        };
        if foreign || target.graph() != self.id() {
            return Err(PlanError::ForeignGraph(format!(
                "cannot link {source:?} to {target} in network {}",
                self.name()
            )));
        }
        let source_node = self.source_node(source)?;
        if let Some(previous) = self.subinput(target)?.link {
            self.destroy_link(previous);
        }

        let index = self.next_index();
        let id = LinkId::new(self.id(), index);
        let name = format!("link_{index}");
        self.links.insert(
            id,
            Link {
                name: name.clone(),
                source,
                target,
                collapse: Vec::new(),
                expand: false,
                status: UpdateStatus::default(),
            },
        );
        if let Some(sub) = self.subinputs.get_mut(&target) {
            sub.link = Some(id);
        }
        match source {
            LinkSource::Output(o) => self.output_mut(o)?.listeners.push(id),
            LinkSource::SubOutput(s) => self.suboutput_mut(s)?.listeners.push(id),
        }
        debug!(link = %name, source = %self.fullid(source.into()), target = %self.fullid(target.into()), "created link");

        self.update_many(&[GraphItem::Link(id), GraphItem::Node(source_node)]);
        Ok(id)
    }

    /// Remove a link together with the SubInput it fills.
    pub fn remove_link(&mut self, link: LinkId) -> Result<()> {
        let l = self.link(link)?;
        let target = l.target;
        let source_node = self.source_node(l.source)?;
        let parent = self.subinput(target)?.parent;
        self.drop_subinput(target);
        self.update_many(&[parent.into(), GraphItem::Node(source_node)]);
        Ok(())
    }

    /// Drop a link from the arena and from both of its ends.
    pub(crate) fn destroy_link(&mut self, link: LinkId) {
        let Some(removed) = self.links.shift_remove(&link) else {
            return;
        };
        match removed.source {
            LinkSource::Output(o) => {
                if let Some(output) = self.outputs.get_mut(&o) {
                    output.listeners.retain(|l| *l != link);
                }
            }
            LinkSource::SubOutput(s) => {
                if let Some(sub) = self.suboutputs.get_mut(&s) {
                    sub.listeners.retain(|l| *l != link);
                }
            }
        }
        if let Some(sub) = self.subinputs.get_mut(&removed.target) {
            if sub.link == Some(link) {
                sub.link = None;
            }
        }
        debug!(link = %removed.name, "destroyed link");
    }

    pub fn set_collapse(&mut self, link: LinkId, collapse: Vec<CollapseDim>) -> Result<()> {
        self.link_mut(link)?.collapse = collapse;
        self.update(GraphItem::Link(link), None, true, false);
        Ok(())
    }

    pub fn set_expand(&mut self, link: LinkId, expand: bool) -> Result<()> {
        self.link_mut(link)?.expand = expand;
        self.update(GraphItem::Link(link), None, true, false);
        Ok(())
    }

    /// Cardinality of one sample as it arrives at the target.
    pub fn link_cardinality(&self, link: LinkId, key: Option<&SampleKey>) -> Result<Cardinality> {
        let l = self.link(link)?;
        let base = if l.expand {
            Some(Cardinality::Concrete(1))
        } else {
            self.source_cardinality(l.source, key)?
        };
        let mut cardinality = base.unwrap_or_else(|| Cardinality::symbol(format!("N_{}", l.name)));

        if !l.collapse.is_empty() {
            let dimensions = self.view(l.source).dimensions()?;
            for position in resolve_collapse(&dimensions, &l.collapse)? {
                cardinality = cardinality.multiply(dimensions[position].size().clone().into())?;
            }
        }
        Ok(cardinality)
    }

    /// Reshape the source dimensions the way `link` delivers them.
    pub(crate) fn link_combine_dimensions(&self, link: LinkId, source: Vec<Dimension>) -> Result<Vec<Dimension>> {
        if source.is_empty() {
            return Ok(source);
        }
        let l = self.link(link)?;

        let collapsed = resolve_collapse(&source, &l.collapse)?;
        let mut dimensions: Vec<Dimension> = source
            .iter()
            .enumerate()
            .filter(|(i, _)| !collapsed.contains(i))
            .map(|(_, d)| d.clone())
            .collect();

        if l.expand {
            let output = self.output(self.root_output(l.source)?)?;
            let node = self.node(output.node)?;
            let size = match self.source_cardinality(l.source, None)? {
                Some(Cardinality::Concrete(n)) => Size::Concrete(n),
                Some(Cardinality::Symbol(s)) => Size::Symbolic(s),
                _ => Size::symbol(format!("N_{}_expand", l.name)),
            };
            dimensions.push(Dimension::new(format!("{}__{}", node.id, output.id), size));
        }

        if dimensions.is_empty() {
            let target = self.node(self.target_node(link)?)?;
            dimensions.push(Dimension::new(target.id.as_str(), 1));
        }
        Ok(dimensions)
    }

    pub(crate) fn refresh_link(&mut self, link: LinkId, key: RoundKey, forward: bool, backward: bool) {
        let Ok(l) = self.link(link) else {
            return;
        };
        let source = l.source;

        if backward {
            self.update(source.into(), Some(key), false, backward);
        }

        let (valid, messages) = self.evaluate_link(link);
        if let Ok(l) = self.link_mut(link) {
            l.status.set(valid, messages);
        }

        if forward {
            if let Ok(target) = self.target_node(link) {
                self.update(GraphItem::Node(target), Some(key), forward, false);
            }
        }
    }

    fn evaluate_link(&self, link: LinkId) -> (bool, Vec<String>) {
        let l = match self.link(link) {
            Ok(l) => l,
            Err(e) => return (false, vec![e.to_string()]),
        };
        let mut messages = Vec::new();

        let source_output = self.root_output(l.source).and_then(|o| self.output(o).map(|out| (o, out)));
        let target_input = self.subinput_input(l.target).and_then(|i| self.input(i));
        let (output_id, output) = match source_output {
            Ok(found) => found,
            Err(_) => return (false, vec![format!("[{}] no source set", l.name)]),
        };
        let input = match target_input {
            Ok(found) => found,
            Err(_) => return (false, vec![format!("[{}] no target set", l.name)]),
        };

        let preferred = self.output_preferred_types(output_id).unwrap_or_default();
        if self
            .registry()
            .match_types(&[output.datatype.as_str(), input.datatype.as_str()], &preferred)
            .is_none()
        {
            messages.push(format!(
                "[{}] source and target have non-matching datatypes: source {} and {}",
                l.name, output.datatype, input.datatype
            ));
        }

        if !l.collapse.is_empty() {
            match self.view(l.source).dimensions() {
                Ok(dimensions) => {
                    for dim in &l.collapse {
                        if resolve_collapse(&dimensions, std::slice::from_ref(dim)).is_err() {
                            let size: Vec<String> = dimensions.iter().map(|d| d.size().to_string()).collect();
                            messages.push(format!(
                                "[{}] collapse dimension {dim} invalid index for size ({}) (sourced output: {})",
                                l.name,
                                size.join(", "),
                                self.fullid(l.source.into())
                            ));
                        }
                    }
                }
                Err(e) => messages.push(format!("[{}] cannot determine source dimensions: {e}", l.name)),
            }
        }

        (messages.is_empty(), messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapse_accepts_negative_positions_and_names() {
        let dims = vec![Dimension::new("a", 2), Dimension::new("b", 3), Dimension::new("c", 4)];
        let positions = resolve_collapse(&dims, &[CollapseDim::Index(-1), "b".into()]).unwrap();
        assert_eq!(positions, vec![2, 1]);
        assert!(matches!(resolve_collapse(&dims, &[CollapseDim::Index(3)]), Err(PlanError::Index(_))));
        assert!(matches!(resolve_collapse(&dims, &["z".into()]), Err(PlanError::Key(_))));
    }

    #[test]
    fn linked_reports_single_links() {
        let graph = crate::planning::ids::GraphId::new();
        let a = LinkId::new(graph, 1);
        let b = LinkId::new(graph, 2);
        assert_eq!(Linked::Single(a).single(), Some(a));
        assert_eq!(Linked::Many(vec![a, b]).single(), None);
        assert_eq!(Linked::Many(vec![a, b]).links(), vec![a, b]);
    }
}
