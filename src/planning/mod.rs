// src/planning/mod.rs

//! The planning graph and its update protocol.

pub mod graph;
pub mod ids;
pub mod input;
pub mod link;
pub mod node;
pub mod output;
pub mod scope;
pub mod session;
pub mod state;
pub mod update;
pub mod view;

pub use graph::{GraphItem, PlanGraph};
pub use ids::{GraphId, InputId, LinkId, NamedSubInputId, NodeId, OutputId, SubInputId, SubOutputId};
pub use input::{Input, InputEntry, InputKey, NamedSubInput, SubInput, SubInputParent, broadcast_dimensions};
pub use link::{CollapseDim, Link, LinkSource, LinkValue, Linked, TupleItem};
pub use node::{DEFAULT_INPUT_GROUP, InputGroup, InputSpec, Node, NodeKind, OutputSpec, SOURCE_OUTPUT, ToolSpec};
pub use output::{Output, OutputIndex, OutputKind, SubOutput};
pub use scope::NodeScope;
pub use session::{PlanningSession, RoundKey};
pub use state::{InputState, OutputState};
pub use update::{UpdateStatus, Updateable};
pub use view::ItemView;
