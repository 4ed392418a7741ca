// tests/update_protocol.rs

mod common;

use std::sync::Arc;

use common::{fed_node, fixed_tool, init_tracing};
use plangraph::planning::{GraphItem, PlanGraph, PlanningSession, RoundKey, UpdateStatus, Updateable};

/// Two objects that update each other on every refresh.
struct PingPong {
    session: Arc<PlanningSession>,
    updating: bool,
    active: Option<RoundKey>,
    statuses: [UpdateStatus; 2],
    visits: [usize; 2],
}

impl PingPong {
    fn new() -> Self {
        Self {
            session: PlanningSession::new(),
            updating: true,
            active: None,
            statuses: Default::default(),
            visits: [0, 0],
        }
    }
}

impl Updateable for PingPong {
    type Item = usize;

    fn session(&self) -> Arc<PlanningSession> {
        Arc::clone(&self.session)
    }

    fn updating_enabled(&self) -> bool {
        self.updating
    }

    fn active_round(&self) -> Option<RoundKey> {
        self.active
    }

    fn set_active_round(&mut self, key: Option<RoundKey>) {
        self.active = key;
    }

    fn status(&self, item: usize) -> Option<&UpdateStatus> {
        self.statuses.get(item)
    }

    fn status_mut(&mut self, item: usize) -> Option<&mut UpdateStatus> {
        self.statuses.get_mut(item)
    }

    fn refresh(&mut self, item: usize, key: RoundKey, forward: bool, backward: bool) {
        self.visits[item] += 1;
        self.update(1 - item, Some(key), forward, backward);
    }
}

#[test]
fn mutual_updates_terminate_and_visit_each_once() {
    let mut pair = PingPong::new();
    let key = pair.update(0, None, true, true).unwrap();

    assert_eq!(pair.visits, [1, 1]);
    assert_eq!(pair.statuses[0].last_round, Some(key));
    assert_eq!(pair.statuses[1].last_round, Some(key));
    assert_eq!(pair.active_round(), None, "the owner closes its round");
}

#[test]
fn repeating_a_key_is_a_no_op() {
    let mut pair = PingPong::new();
    let key = pair.update(0, None, true, true).unwrap();
    assert_eq!(pair.update(0, Some(key), true, true), Some(key));
    assert_eq!(pair.update(1, Some(key), true, true), Some(key));
    assert_eq!(pair.visits, [1, 1]);

    pair.update(1, None, true, true).unwrap();
    assert_eq!(pair.visits, [2, 2]);
}

#[test]
fn suspended_container_ignores_updates() {
    let mut pair = PingPong::new();
    pair.updating = false;
    assert_eq!(pair.update(0, None, true, true), None);
    assert_eq!(pair.visits, [0, 0]);
    assert_eq!(pair.update(7, None, true, true), None);
}

#[test]
fn graph_update_with_repeated_key_keeps_state() {
    init_tracing();
    let mut graph = PlanGraph::new("net");
    let numbers = graph.create_source("Int", "numbers").unwrap();
    let node = fed_node(&mut graph, numbers, &fixed_tool("double", "2"), "double");
    let input = graph.node_input(node, "in").unwrap();

    let key = graph.update(GraphItem::Node(node), None, true, true).unwrap();
    let before = graph.input(input).unwrap().clone();

    assert_eq!(graph.update(GraphItem::Node(node), Some(key), true, true), Some(key));
    assert_eq!(graph.update(GraphItem::Input(input), Some(key), true, true), Some(key));

    let after = graph.input(input).unwrap();
    assert_eq!(after.valid(), before.valid());
    assert_eq!(after.messages(), before.messages());
}

#[test]
fn graph_rounds_do_not_deadlock_on_a_shared_session() {
    let session = PlanningSession::new();
    let mut first = PlanGraph::with_session("first", Arc::clone(&session));
    let mut second = PlanGraph::with_session("second", session);

    let a = first.create_source("Int", "a").unwrap();
    let b = second.create_source("Int", "b").unwrap();
    first.update_all();
    second.update_all();

    assert!(first.node(a).unwrap().valid());
    assert!(second.node(b).unwrap().valid());
}
