// src/planning/ids.rs

//! Typed handles into a [`PlanGraph`](crate::planning::PlanGraph).
//!
//! Every handle remembers which graph minted it, so that handing a handle
//! from one graph to another is detected instead of silently aliasing.

use std::fmt;

use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphId(Uuid);

impl GraphId {
    pub fn new() -> Self {
        GraphId(Uuid::new_v4())
    }
}

impl Default for GraphId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A handle that knows which graph minted it.
pub trait GraphHandle: Copy + fmt::Display {
    fn graph_id(&self) -> GraphId;
}

macro_rules! graph_handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            graph: GraphId,
            index: u32,
        }

        impl $name {
            pub(crate) fn new(graph: GraphId, index: u32) -> Self {
                Self { graph, index }
            }

            pub fn graph(&self) -> GraphId {
                self.graph
            }
        }

        impl GraphHandle for $name {
            fn graph_id(&self) -> GraphId {
                self.graph
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.index)
            }
        }
    };
}

graph_handle!(NodeId, "node");
graph_handle!(InputId, "input");
graph_handle!(
    /// Handle of a mapping-keyed container of SubInputs.
    NamedSubInputId,
    "named"
);
graph_handle!(SubInputId, "subinput");
graph_handle!(OutputId, "output");
graph_handle!(SubOutputId, "suboutput");
graph_handle!(LinkId, "link");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_remember_their_graph() {
        let a = GraphId::new();
        let b = GraphId::new();
        assert_ne!(a, b);

        let id = NodeId::new(a, 3);
        assert_eq!(id.graph(), a);
        assert_ne!(id, NodeId::new(b, 3));
        assert_eq!(id.to_string(), "node#3");
    }
}
