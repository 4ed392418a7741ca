// src/planning/graph.rs

//! The planning graph: arenas of nodes, inputs, outputs and links, plus the
//! update-round driver that keeps their validity current.

use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, info};

use crate::core::datatype::TypeRegistry;
use crate::errors::{PlanError, Result};
use crate::planning::ids::{
    GraphHandle, GraphId, InputId, LinkId, NamedSubInputId, NodeId, OutputId, SubInputId, SubOutputId,
};
use crate::planning::input::{Input, NamedSubInput, SubInput, SubInputParent};
use crate::planning::link::Link;
use crate::planning::node::Node;
use crate::planning::output::{Output, SubOutput};
use crate::planning::session::{PlanningSession, RoundKey};
use crate::planning::update::{UpdateStatus, Updateable};
use crate::planning::view::ItemView;

/// Any object that takes part in update rounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GraphItem {
    Node(NodeId),
    Input(InputId),
    NamedSubInput(NamedSubInputId),
    SubInput(SubInputId),
    Output(OutputId),
    SubOutput(SubOutputId),
    Link(LinkId),
}

macro_rules! graph_item_from {
    ($($variant:ident($id:ty)),* $(,)?) => {
        $(
            impl From<$id> for GraphItem {
                fn from(value: $id) -> Self {
                    GraphItem::$variant(value)
                }
            }
        )*
    };
}

graph_item_from!(
    Node(NodeId),
    Input(InputId),
    NamedSubInput(NamedSubInputId),
    SubInput(SubInputId),
    Output(OutputId),
    SubOutput(SubOutputId),
    Link(LinkId),
);

#[derive(Debug)]
pub struct PlanGraph {
    id: GraphId,
    name: String,
    session: Arc<PlanningSession>,
    registry: TypeRegistry,
    preferred_types: Option<Vec<String>>,
    updating: bool,
    active_round: Option<RoundKey>,
    next_index: u32,
    pub(crate) nodes: IndexMap<NodeId, Node>,
    pub(crate) inputs: IndexMap<InputId, Input>,
    pub(crate) named: IndexMap<NamedSubInputId, NamedSubInput>,
    pub(crate) subinputs: IndexMap<SubInputId, SubInput>,
    pub(crate) outputs: IndexMap<OutputId, Output>,
    pub(crate) suboutputs: IndexMap<SubOutputId, SubOutput>,
    pub(crate) links: IndexMap<LinkId, Link>,
    /// Items whose dimensions or cardinality are being derived right now.
    deriving: RefCell<HashSet<GraphItem>>,
}

/// Marks an item as being derived until dropped.
pub(crate) struct Deriving<'g> {
    graph: &'g PlanGraph,
    item: GraphItem,
}

impl Drop for Deriving<'_> {
    fn drop(&mut self) {
        self.graph.deriving.borrow_mut().remove(&self.item);
    }
}

impl PlanGraph {
    /// A graph with a session of its own.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_session(name, PlanningSession::new())
    }

    /// A graph whose update rounds are serialised with every other graph
    /// sharing `session`.
    pub fn with_session(name: impl Into<String>, session: Arc<PlanningSession>) -> Self {
        Self {
            id: GraphId::new(),
            name: name.into(),
            session,
            registry: TypeRegistry::new(),
            preferred_types: None,
            updating: true,
            active_round: None,
            next_index: 0,
            nodes: IndexMap::new(),
            inputs: IndexMap::new(),
            named: IndexMap::new(),
            subinputs: IndexMap::new(),
            outputs: IndexMap::new(),
            suboutputs: IndexMap::new(),
            links: IndexMap::new(),
            deriving: RefCell::new(HashSet::new()),
        }
    }

    /// Enter the derivation of `item`. Reaching an item that is already
    /// being derived means the derivation runs around a cycle of links.
    pub(crate) fn derive(&self, item: GraphItem) -> Result<Deriving<'_>> {
        let fresh = self.deriving.borrow_mut().insert(item);
        if !fresh {
            return Err(PlanError::Value(format!("cyclic dependency through {}", self.fullid(item))));
        }
        Ok(Deriving { graph: self, item })
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn next_index(&mut self) -> u32 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    pub(crate) fn check_handle<H: GraphHandle>(&self, handle: H) -> Result<()> {
        if handle.graph_id() == self.id {
            Ok(())
        } else {
            Err(PlanError::ForeignGraph(format!("{handle} does not belong to network {}", self.name)))
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Register a user datatype below `parent`.
    pub fn register_datatype(&mut self, name: &str, parent: &str) -> Result<()> {
        self.registry.register(name, parent)
    }

    pub(crate) fn require_datatype(&self, datatype: &str) -> Result<()> {
        if self.registry.contains(datatype) {
            Ok(())
        } else {
            Err(PlanError::NotFound(format!("datatype {datatype}")))
        }
    }

    pub fn preferred_types(&self) -> Option<&[String]> {
        self.preferred_types.as_deref()
    }

    pub fn set_preferred_types(&mut self, types: Option<Vec<String>>) -> Result<()> {
        if let Some(types) = &types {
            for datatype in types {
                self.require_datatype(datatype)?;
            }
        }
        self.preferred_types = types;
        self.update_all();
        Ok(())
    }

    /// Suspend or resume update rounds. Resuming does not catch up on
    /// missed rounds; call [`PlanGraph::update_all`] for that.
    pub fn set_updating(&mut self, updating: bool) {
        self.updating = updating;
    }

    pub fn is_updating(&self) -> bool {
        self.updating
    }

    /// Borrow any item as a dimension-bearing view.
    pub fn view(&self, item: impl Into<GraphItem>) -> ItemView<'_> {
        ItemView::new(self, item.into())
    }

    /// Slash-separated path of an item, rooted at the graph name.
    pub fn fullid(&self, item: GraphItem) -> String {
        let path = match item {
            GraphItem::Node(id) => self.nodes.get(&id).map(|n| format!("{}/nodelist/{}", self.name, n.id)),
            GraphItem::Input(id) => self
                .inputs
                .get(&id)
                .map(|i| format!("{}/inputs/{}", self.fullid(GraphItem::Node(i.node)), i.id)),
            GraphItem::NamedSubInput(id) => self
                .named
                .get(&id)
                .map(|n| format!("{}/{}", self.fullid(GraphItem::Input(n.input)), n.key)),
            GraphItem::SubInput(id) => self.subinputs.get(&id).map(|s| {
                let key = self
                    .subinput_key(id)
                    .map(|k| k.to_string())
                    .unwrap_or_else(|_| "?".to_string());
                let parent = match s.parent {
                    SubInputParent::Input(input) => GraphItem::Input(input),
                    SubInputParent::Named(named) => GraphItem::NamedSubInput(named),
                };
                format!("{}/{key}", self.fullid(parent))
            }),
            GraphItem::Output(id) => self
                .outputs
                .get(&id)
                .map(|o| format!("{}/outputs/{}", self.fullid(GraphItem::Node(o.node)), o.id)),
            GraphItem::SubOutput(id) => self
                .suboutputs
                .get(&id)
                .map(|s| format!("{}/{}", self.fullid(GraphItem::Output(s.output)), s.index)),
            GraphItem::Link(id) => self.links.get(&id).map(|l| format!("{}/linklist/{}", self.name, l.name)),
        };
        path.unwrap_or_else(|| format!("{}/{item:?}", self.name))
    }

    /// Run one round over several items.
    pub fn update_many(&mut self, items: &[GraphItem]) {
        if !self.updating {
            return;
        }
        if let Some(key) = self.active_round {
            for item in items {
                self.update(*item, Some(key), true, false);
            }
            return;
        }

        let session = Arc::clone(&self.session);
        let _guard = session.lock_round();
        let key = RoundKey::new();
        self.active_round = Some(key);
        debug!(round = %key, items = items.len(), "starting update round");
        for item in items {
            self.update(*item, Some(key), true, false);
        }
        self.active_round = None;
    }

    /// Run one round that visits every node.
    pub fn update_all(&mut self) {
        let nodes: Vec<GraphItem> = self.nodes.keys().map(|id| GraphItem::Node(*id)).collect();
        self.update_many(&nodes);
    }

    /// Node ids in an order where every node comes after the nodes it reads
    /// from.
    pub fn topological_order(&self) -> Result<Vec<NodeId>> {
        let mut graph: DiGraphMap<NodeId, ()> = DiGraphMap::new();
        for id in self.nodes.keys() {
            graph.add_node(*id);
        }
        for id in self.links.keys() {
            let link = &self.links[id];
            let source = self.source_node(link.source)?;
            let target = self.target_node(*id)?;
            graph.add_edge(source, target, ());
        }

        toposort(&graph, None).map_err(|cycle| {
            let node = self
                .nodes
                .get(&cycle.node_id())
                .map(|n| n.id.clone())
                .unwrap_or_else(|| cycle.node_id().to_string());
            PlanError::Value(format!("cycle detected in network {} involving node '{node}'", self.name))
        })
    }

    /// Refresh everything and fail with all collected messages unless every
    /// node is valid and the links form a DAG.
    pub fn check_ready(&mut self) -> Result<()> {
        self.update_all();

        let mut messages: Vec<String> = self
            .nodes
            .values()
            .filter(|n| !n.status.is_valid())
            .flat_map(|n| {
                if n.status.messages.is_empty() {
                    vec![format!("[{}] node is not valid", n.id)]
                } else {
                    n.status.messages.clone()
                }
            })
            .collect();

        if let Err(e) = self.topological_order() {
            messages.push(e.to_string());
        }

        if messages.is_empty() {
            info!(network = %self.name, nodes = self.nodes.len(), "network is ready");
            Ok(())
        } else {
            Err(PlanError::NotReady(messages))
        }
    }

    pub fn is_ready(&mut self) -> bool {
        self.check_ready().is_ok()
    }
}

impl Updateable for PlanGraph {
    type Item = GraphItem;

    fn session(&self) -> Arc<PlanningSession> {
        Arc::clone(&self.session)
    }

    fn updating_enabled(&self) -> bool {
        self.updating
    }

    fn active_round(&self) -> Option<RoundKey> {
        self.active_round
    }

    fn set_active_round(&mut self, key: Option<RoundKey>) {
        self.active_round = key;
    }

    fn status(&self, item: GraphItem) -> Option<&UpdateStatus> {
        match item {
            GraphItem::Node(id) => self.nodes.get(&id).map(|x| &x.status),
            GraphItem::Input(id) => self.inputs.get(&id).map(|x| &x.status),
            GraphItem::NamedSubInput(id) => self.named.get(&id).map(|x| &x.status),
            GraphItem::SubInput(id) => self.subinputs.get(&id).map(|x| &x.status),
            GraphItem::Output(id) => self.outputs.get(&id).map(|x| &x.status),
            GraphItem::SubOutput(id) => self.suboutputs.get(&id).map(|x| &x.status),
            GraphItem::Link(id) => self.links.get(&id).map(|x| &x.status),
        }
    }

    fn status_mut(&mut self, item: GraphItem) -> Option<&mut UpdateStatus> {
        match item {
            GraphItem::Node(id) => self.nodes.get_mut(&id).map(|x| &mut x.status),
            GraphItem::Input(id) => self.inputs.get_mut(&id).map(|x| &mut x.status),
            GraphItem::NamedSubInput(id) => self.named.get_mut(&id).map(|x| &mut x.status),
            GraphItem::SubInput(id) => self.subinputs.get_mut(&id).map(|x| &mut x.status),
            GraphItem::Output(id) => self.outputs.get_mut(&id).map(|x| &mut x.status),
            GraphItem::SubOutput(id) => self.suboutputs.get_mut(&id).map(|x| &mut x.status),
            GraphItem::Link(id) => self.links.get_mut(&id).map(|x| &mut x.status),
        }
    }

    fn refresh(&mut self, item: GraphItem, key: RoundKey, forward: bool, backward: bool) {
        match item {
            GraphItem::Node(id) => self.refresh_node(id, key, forward, backward),
            GraphItem::Input(id) => self.refresh_input(id, key, forward, backward),
            GraphItem::NamedSubInput(id) => self.refresh_named(id, key, forward, backward),
            GraphItem::SubInput(id) => self.refresh_subinput(id, key, forward, backward),
            GraphItem::Output(id) => self.refresh_output(id, key, forward, backward),
            GraphItem::SubOutput(id) => self.refresh_suboutput(id, key, forward, backward),
            GraphItem::Link(id) => self.refresh_link(id, key, forward, backward),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::node::{InputSpec, NodeKind, OutputSpec, SOURCE_OUTPUT, ToolSpec};

    fn passthrough() -> ToolSpec {
        ToolSpec::new("passthrough")
            .with_input(InputSpec::new("x", "Int", "1"))
            .with_output(OutputSpec::new("y", "Int", "1"))
    }

    #[test]
    fn handles_from_another_graph_are_rejected() {
        let mut left = PlanGraph::new("left");
        let mut right = PlanGraph::new("right");
        let source = left.create_source("Int", "numbers").unwrap();
        let sink = right.create_node(&passthrough(), "sink", NodeKind::Tool).unwrap();

        assert!(matches!(right.node(source), Err(PlanError::ForeignGraph(_))));

        let output = left.node_output(source, SOURCE_OUTPUT).unwrap();
        let x = right.node_input(sink, "x").unwrap();
        assert!(matches!(right.append(x, output), Err(PlanError::ForeignGraph(_))));
    }

    #[test]
    fn fullids_follow_the_containment_path() {
        let mut graph = PlanGraph::new("net");
        let source = graph.create_source("Int", "numbers").unwrap();
        let sink = graph.create_node(&passthrough(), "sink", NodeKind::Tool).unwrap();
        let output = graph.node_output(source, SOURCE_OUTPUT).unwrap();
        let x = graph.node_input(sink, "x").unwrap();
        let link = graph.append(x, output).unwrap().single().unwrap();

        assert_eq!(graph.fullid(source.into()), "net/nodelist/numbers");
        assert_eq!(graph.fullid(output.into()), "net/nodelist/numbers/outputs/output");
        assert_eq!(graph.fullid(graph.link(link).unwrap().target().into()), "net/nodelist/sink/inputs/x/0");
        assert!(graph.fullid(link.into()).starts_with("net/linklist/link_"));
    }

    #[test]
    fn cycles_are_reported_by_readiness() {
        let mut graph = PlanGraph::new("net");
        let a = graph.create_node(&passthrough(), "a", NodeKind::Tool).unwrap();
        let b = graph.create_node(&passthrough(), "b", NodeKind::Tool).unwrap();
        let a_out = graph.node_output(a, "y").unwrap();
        let b_out = graph.node_output(b, "y").unwrap();
        let a_in = graph.node_input(a, "x").unwrap();
        let b_in = graph.node_input(b, "x").unwrap();
        graph.append(b_in, a_out).unwrap();
        graph.append(a_in, b_out).unwrap();

        assert!(graph.topological_order().is_err());
        match graph.check_ready() {
            Err(PlanError::NotReady(messages)) => {
                assert!(messages.iter().any(|m| m.contains("cycle detected")));
            }
            other => panic!("expected NotReady, got {other:?}"),
        }
        let input = graph.input(a_in).unwrap();
        assert!(!input.valid());
        assert!(input.messages().iter().any(|m| m.contains("cyclic dependency")));
    }

    #[test]
    fn derivation_marks_are_released() {
        let graph = PlanGraph::new("net");
        let item = GraphItem::Node(NodeId::new(graph.id(), 0));
        {
            let _first = graph.derive(item).unwrap();
            assert!(matches!(graph.derive(item), Err(PlanError::Value(_))));
        }
        assert!(graph.derive(item).is_ok());
    }
}
