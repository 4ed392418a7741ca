// src/planning/view.rs

//! Borrowed views that give graph items their dimensions.

use crate::core::dimension::{Dimension, ForwardsDimensions, HasDimensions};
use crate::errors::{PlanError, Result};
use crate::planning::graph::{GraphItem, PlanGraph};
use crate::planning::ids::{LinkId, OutputId};
use crate::planning::node::NodeKind;

/// Any graph item, seen through [`HasDimensions`].
#[derive(Clone, Copy, Debug)]
pub struct ItemView<'g> {
    graph: &'g PlanGraph,
    item: GraphItem,
}

impl<'g> ItemView<'g> {
    pub(crate) fn new(graph: &'g PlanGraph, item: GraphItem) -> Self {
        Self { graph, item }
    }

    pub fn item(&self) -> GraphItem {
        self.item
    }
}

impl HasDimensions for ItemView<'_> {
    fn dimensions(&self) -> Result<Vec<Dimension>> {
        let graph = self.graph;
        match self.item {
            GraphItem::Node(id) => graph.node_dimensions(id),
            GraphItem::Input(id) => graph.input_dimensions(id),
            GraphItem::NamedSubInput(id) => graph.named_dimensions(id),
            GraphItem::SubInput(id) => graph.subinput_dimensions(id),
            GraphItem::Output(id) => OutputView { graph, output: id }.dimensions(),
            GraphItem::SubOutput(id) => OutputView {
                graph,
                output: graph.suboutput(id)?.output,
            }
            .dimensions(),
            GraphItem::Link(id) => LinkView { graph, link: id }.dimensions(),
        }
    }
}

/// An Output takes its node's dimensions, reshaped by the node kind.
pub struct OutputView<'g> {
    graph: &'g PlanGraph,
    output: OutputId,
}

impl ForwardsDimensions for OutputView<'_> {
    fn source_dimensions(&self) -> Result<Vec<Dimension>> {
        let output = self.graph.output(self.output)?;
        let node = self.graph.node(output.node)?;
        if node.kind == NodeKind::Macro {
            return node.macro_outputs.get(&output.id).cloned().ok_or_else(|| {
                PlanError::NotFound(format!(
                    "dimensions of output {} of macro node {} (register them first)",
                    output.id, node.id
                ))
            });
        }
        self.graph.node_dimensions(output.node)
    }

    fn combine_dimensions(&self, dimensions: Vec<Dimension>) -> Vec<Dimension> {
        let Ok(output) = self.graph.output(self.output) else {
            return dimensions;
        };
        let advanced = self
            .graph
            .node(output.node)
            .is_ok_and(|n| n.kind == NodeKind::AdvancedFlow);
        if !advanced {
            return dimensions;
        }

        let last = dimensions.len().saturating_sub(1);
        dimensions
            .into_iter()
            .enumerate()
            .map(|(i, d)| {
                if i < last {
                    Dimension::new(format!("{}_{}", d.name(), output.id), d.size().clone())
                } else {
                    d
                }
            })
            .collect()
    }
}

impl HasDimensions for OutputView<'_> {
    fn dimensions(&self) -> Result<Vec<Dimension>> {
        self.forwarded_dimensions()
    }
}

/// A Link takes its source's dimensions, minus collapsed and plus expanded
/// ones.
pub struct LinkView<'g> {
    graph: &'g PlanGraph,
    link: LinkId,
}

impl LinkView<'_> {
    fn combine(&self, dimensions: Vec<Dimension>) -> Result<Vec<Dimension>> {
        self.graph.link_combine_dimensions(self.link, dimensions)
    }
}

impl ForwardsDimensions for LinkView<'_> {
    fn source_dimensions(&self) -> Result<Vec<Dimension>> {
        let source = self.graph.link(self.link)?.source;
        self.graph.view(source).dimensions()
    }

    fn combine_dimensions(&self, dimensions: Vec<Dimension>) -> Vec<Dimension> {
        let fallback = dimensions.clone();
        self.combine(dimensions).unwrap_or(fallback)
    }

    fn forwarded_dimensions(&self) -> Result<Vec<Dimension>> {
        self.combine(self.source_dimensions()?)
    }
}

impl HasDimensions for LinkView<'_> {
    fn dimensions(&self) -> Result<Vec<Dimension>> {
        self.forwarded_dimensions()
    }
}
