// src/planning/scope.rs

//! The [`CardinalityContext`] of a spec that lives on a node's Input or
//! Output.

use crate::core::cardinality::CardinalityContext;
use crate::core::dimension::{HasDimensions, Size};
use crate::core::samples::{SampleItem, SampleKey};
use crate::core::symbolic::Cardinality;
use crate::errors::Result;
use crate::planning::graph::PlanGraph;
use crate::planning::ids::{InputId, NodeId, OutputId};

pub struct NodeScope<'g> {
    graph: &'g PlanGraph,
    node: NodeId,
    output: Option<OutputId>,
}

impl<'g> NodeScope<'g> {
    /// `output` is the Output the evaluated spec belongs to, if any.
    pub fn new(graph: &'g PlanGraph, node: NodeId, output: Option<OutputId>) -> Self {
        Self { graph, node, output }
    }

    fn input(&self, name: &str) -> Option<InputId> {
        self.graph.node_input(self.node, name).ok()
    }
}

impl CardinalityContext for NodeScope<'_> {
    fn input_cardinality(&self, name: &str, key: Option<&SampleKey>) -> Result<Option<Cardinality>> {
        match self.input(name) {
            Some(input) => self.graph.input_cardinality(input, key).map(Some),
            None => Ok(None),
        }
    }

    fn input_items(&self, name: &str) -> Result<Option<Vec<Cardinality>>> {
        match self.input(name) {
            Some(input) => self.graph.input_item_cardinalities(input, None).map(Some),
            None => Ok(None),
        }
    }

    fn input_size(&self, name: &str) -> Result<Option<Vec<Size>>> {
        match self.input(name) {
            Some(input) => self.graph.view(input).size().map(Some),
            None => Ok(None),
        }
    }

    fn has_output(&self, name: &str) -> bool {
        self.graph.node_output(self.node, name).is_ok()
    }

    fn parent_sample(&self, key: &SampleKey) -> Option<&SampleItem> {
        let output = self.output?;
        self.graph.output(output).ok()?.samples.get(key)
    }

    fn output_sample(&self, name: &str, key: &SampleKey) -> Option<&SampleItem> {
        let output = self.graph.node_output(self.node, name).ok()?;
        self.graph.output(output).ok()?.samples.get(key)
    }
}
