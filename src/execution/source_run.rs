// src/execution/source_run.rs

//! Run-time state of source and constant nodes.
//!
//! A run moves through `no data -> data set -> drained`. Setting data fixes
//! the size of the node's dimension; executing it turns every sample into a
//! job. Samples holding a URL need a real job to fetch them, everything else
//! is written straight to the output and recorded as an already finished
//! job.

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::core::datatype::{RawValue, TypedValue};
use crate::core::dimension::Size;
use crate::core::job::{Job, JobState};
use crate::core::samples::{SampleId, SampleIndex, SampleItem};
use crate::core::source_data::SourceData;
use crate::errors::{PlanError, Result};
use crate::planning::graph::{GraphItem, PlanGraph};
use crate::planning::ids::{NodeId, OutputId};
use crate::planning::node::{NodeKind, SOURCE_OUTPUT};
use crate::planning::update::Updateable;

/// Argument name under which a source job receives the value to fetch.
pub const SOURCE_JOB_INPUT: &str = "input";

const FALLBACK_DATATYPE: &str = "String";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceRunState {
    NoData,
    DataSet,
    Drained,
}

#[derive(Clone, Debug)]
pub struct SourceNodeRun {
    node: NodeId,
    node_name: String,
    output: OutputId,
    datatype: String,
    state: SourceRunState,
    samples: IndexMap<SampleId, Vec<TypedValue>>,
    outputsize: Vec<Size>,
    finished: Vec<Job>,
}

impl SourceNodeRun {
    pub fn new(graph: &PlanGraph, node: NodeId) -> Result<Self> {
        let n = graph.node(node)?;
        if !n.kind().is_source_like() {
            return Err(PlanError::Type(format!("node {} is not a source node", n.id())));
        }
        let output = graph.node_output(node, SOURCE_OUTPUT)?;
        Ok(Self {
            node,
            node_name: n.id().to_string(),
            output,
            datatype: graph.output(output)?.datatype().to_string(),
            state: SourceRunState::NoData,
            samples: IndexMap::new(),
            outputsize: Vec::new(),
            finished: Vec::new(),
        })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn state(&self) -> SourceRunState {
        self.state
    }

    pub fn drained(&self) -> bool {
        self.state == SourceRunState::Drained
    }

    pub fn outputsize(&self) -> &[Size] {
        &self.outputsize
    }

    pub fn samples(&self) -> &IndexMap<SampleId, Vec<TypedValue>> {
        &self.samples
    }

    /// Synthetic jobs recorded for samples that needed no fetching.
    pub fn finished_jobs(&self) -> &[Job] {
        &self.finished
    }

    /// Normalise `data` into samples of the output datatype and size the
    /// node's dimension accordingly.
    ///
    /// Values that do not read as the output datatype are kept as `String`.
    pub fn set_data(&mut self, graph: &mut PlanGraph, data: SourceData) -> Result<()> {
        let raw = data.samples()?;
        let mut samples = IndexMap::with_capacity(raw.len());
        for (id, values) in raw {
            let typed = values
                .iter()
                .map(|v| self.wrap_value(graph, v))
                .collect::<Result<Vec<_>>>()?;
            samples.insert(id, typed);
        }

        let size = Size::Concrete(samples.len() as u64);
        if let Some(dimension) = graph.node_mut(self.node)?.source_dimension.as_mut() {
            dimension.set_size(size.clone());
        }
        self.outputsize = vec![size];
        self.samples = samples;
        self.state = SourceRunState::DataSet;
        self.finished.clear();
        debug!(node = %self.node_name, samples = self.samples.len(), "source data set");

        graph.update(GraphItem::Node(self.node), None, true, false);
        Ok(())
    }

    fn wrap_value(&self, graph: &PlanGraph, value: &RawValue) -> Result<TypedValue> {
        match graph.registry().convert(&self.datatype, value) {
            Err(PlanError::Value(reason)) => {
                debug!(node = %self.node_name, %reason, "keeping value as String");
                graph.registry().convert(FALLBACK_DATATYPE, value)
            }
            other => other,
        }
    }

    /// Turn every sample into a job.
    ///
    /// Returns one batch holding the jobs that still have to run, possibly
    /// empty; samples without a URL are stored on the output right away.
    pub fn execute(&mut self, graph: &mut PlanGraph) -> Result<Vec<Vec<Job>>> {
        if self.state == SourceRunState::NoData {
            return Err(PlanError::Value(format!(
                "SourceNodeRun {} has no data set, cannot execute",
                self.node_name
            )));
        }

        let mut pending = Vec::new();
        for (position, (id, values)) in self.samples.iter().enumerate() {
            let index = SampleIndex(vec![position]);
            let fetch = values.iter().any(TypedValue::is_url);
            let job = Job {
                id: format!("{}___{}___{position}", graph.name(), self.node_name),
                node: self.node_name.clone(),
                sample_id: id.clone(),
                sample_index: index.clone(),
                job_data: IndexMap::from([(SOURCE_JOB_INPUT.to_string(), values.clone())]),
                dependencies: Vec::new(),
                datatype: self.datatype.clone(),
                status: if fetch { JobState::Pending } else { JobState::Finished },
            };

            if fetch {
                pending.push(job);
            } else {
                graph.store_output_sample(
                    self.output,
                    SampleItem {
                        index,
                        id: id.clone(),
                        data: values.clone(),
                    },
                )?;
                self.finished.push(job);
            }
        }

        self.state = SourceRunState::Drained;
        info!(
            node = %self.node_name,
            spawned = pending.len(),
            finished = self.finished.len(),
            "source node executed"
        );
        graph.update(GraphItem::Node(self.node), None, true, false);

        Ok(vec![pending])
    }
}

/// A source run that always delivers its node's fixed data.
#[derive(Clone, Debug)]
pub struct ConstantNodeRun {
    run: SourceNodeRun,
}

impl ConstantNodeRun {
    pub fn new(graph: &PlanGraph, node: NodeId) -> Result<Self> {
        let n = graph.node(node)?;
        if n.kind() != NodeKind::Constant {
            return Err(PlanError::Type(format!("node {} is not a constant node", n.id())));
        }
        Ok(Self {
            run: SourceNodeRun::new(graph, node)?,
        })
    }

    /// Re-apply the node's fixed data.
    pub fn set_data(&mut self, graph: &mut PlanGraph) -> Result<()> {
        let data = graph
            .node(self.run.node)?
            .data()
            .cloned()
            .ok_or_else(|| PlanError::Value(format!("constant node {} has no data", self.run.node_name)))?;
        self.run.set_data(graph, data)
    }

    pub fn execute(&mut self, graph: &mut PlanGraph) -> Result<Vec<Vec<Job>>> {
        if self.run.state == SourceRunState::NoData {
            self.set_data(graph)?;
        }
        self.run.execute(graph)
    }

    pub fn run(&self) -> &SourceNodeRun {
        &self.run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dimension::HasDimensions;
    use crate::core::samples::SampleKey;

    #[test]
    fn executing_without_data_is_an_error() {
        let mut graph = PlanGraph::new("net");
        let node = graph.create_source("Int", "numbers").unwrap();
        let mut run = SourceNodeRun::new(&graph, node).unwrap();
        assert!(matches!(run.execute(&mut graph), Err(PlanError::Value(_))));
    }

    #[test]
    fn data_resolves_the_symbolic_dimension() {
        let mut graph = PlanGraph::new("net");
        let node = graph.create_source("Int", "numbers").unwrap();
        let mut run = SourceNodeRun::new(&graph, node).unwrap();
        run.set_data(&mut graph, SourceData::listed([4i64, 5, 6])).unwrap();

        assert_eq!(run.outputsize(), &[Size::Concrete(3)]);
        assert_eq!(graph.view(node).size().unwrap(), vec![Size::Concrete(3)]);
        assert_eq!(run.state(), SourceRunState::DataSet);
    }

    #[test]
    fn replacing_data_shrinks_the_dimension() {
        let mut graph = PlanGraph::new("net");
        let node = graph.create_source("Int", "numbers").unwrap();
        let mut run = SourceNodeRun::new(&graph, node).unwrap();
        run.set_data(&mut graph, SourceData::listed([1i64, 2, 3])).unwrap();
        run.set_data(&mut graph, SourceData::listed([1i64, 2])).unwrap();

        assert_eq!(run.outputsize(), &[Size::Concrete(2)]);
        assert_eq!(graph.view(node).size().unwrap(), vec![Size::Concrete(2)]);
    }

    #[test]
    fn values_of_the_wrong_type_are_kept_as_strings() {
        let mut graph = PlanGraph::new("net");
        let node = graph.create_source("Int", "numbers").unwrap();
        let mut run = SourceNodeRun::new(&graph, node).unwrap();
        let data = SourceData::Scalar(RawValue::String("seven".into()));
        run.set_data(&mut graph, data).unwrap();

        assert_eq!(run.state(), SourceRunState::DataSet);
        let values = run.samples().values().next().unwrap();
        assert_eq!(values[0].datatype, "String");
        assert_eq!(values[0].repr, "seven");
    }

    #[test]
    fn constants_store_their_samples_on_execution() {
        let mut graph = PlanGraph::new("net");
        let node = graph
            .create_constant("Int", SourceData::listed([1i64, 2]), Some("pair"))
            .unwrap();
        let mut run = ConstantNodeRun::new(&graph, node).unwrap();
        let batches = run.execute(&mut graph).unwrap();
        assert_eq!(batches.len(), 1);
        assert!(batches[0].is_empty());
        assert!(run.run().drained());
        assert_eq!(run.run().finished_jobs().len(), 2);

        let output = graph.node_output(node, SOURCE_OUTPUT).unwrap();
        let key = SampleKey::Id(SampleId::single("id_1"));
        assert_eq!(graph.output_sample(output, &key).unwrap().unwrap().data[0].repr, "2");
    }
}
