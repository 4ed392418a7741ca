// src/planning/state.rs

//! Serialisable snapshots of Input and Output settings.
//!
//! Cardinality specs travel as their grammar string and are re-parsed on
//! restore.

use serde::{Deserialize, Serialize};

use crate::core::cardinality::create_cardinality;
use crate::errors::{PlanError, Result};
use crate::planning::graph::{GraphItem, PlanGraph};
use crate::planning::ids::{InputId, OutputId};
use crate::planning::update::Updateable;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputState {
    pub id: String,
    pub datatype: String,
    pub cardinality: String,
    pub required: bool,
    pub input_group: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputState {
    pub id: String,
    pub datatype: String,
    pub cardinality: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_types: Option<Vec<String>>,
}

impl PlanGraph {
    pub fn input_state(&self, input: InputId) -> Result<InputState> {
        let i = self.input(input)?;
        Ok(InputState {
            id: i.id.clone(),
            datatype: i.datatype.clone(),
            cardinality: i.spec.to_string(),
            required: i.required,
            input_group: i.input_group.clone(),
        })
    }

    /// Apply a snapshot to an existing Input with the same id.
    pub fn restore_input_state(&mut self, input: InputId, state: &InputState) -> Result<()> {
        let spec = create_cardinality(&state.cardinality)?;
        self.require_datatype(&state.datatype)?;
        let i = self.input_mut(input)?;
        if i.id != state.id {
            return Err(PlanError::Value(format!("cannot restore state of input {} into {}", state.id, i.id)));
        }
        i.datatype = state.datatype.clone();
        i.spec = spec;
        i.required = state.required;
        i.input_group = state.input_group.clone();
        self.update(GraphItem::Input(input), None, true, false);
        Ok(())
    }

    pub fn output_state(&self, output: OutputId) -> Result<OutputState> {
        let o = self.output(output)?;
        Ok(OutputState {
            id: o.id.clone(),
            datatype: o.datatype.clone(),
            cardinality: o.spec.to_string(),
            preferred_types: o.preferred_types.clone(),
        })
    }

    pub fn restore_output_state(&mut self, output: OutputId, state: &OutputState) -> Result<()> {
        let spec = create_cardinality(&state.cardinality)?;
        self.require_datatype(&state.datatype)?;
        let o = self.output_mut(output)?;
        if o.id != state.id {
            return Err(PlanError::Value(format!("cannot restore state of output {} into {}", state.id, o.id)));
        }
        o.datatype = state.datatype.clone();
        o.spec = spec;
        o.preferred_types = state.preferred_types.clone();
        let node = o.node;
        self.update(GraphItem::Node(node), None, true, false);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cardinality::CardinalitySpec;
    use crate::planning::node::{InputSpec, NodeKind, OutputSpec, ToolSpec};

    fn tool() -> ToolSpec {
        ToolSpec::new("t")
            .with_input(InputSpec::new("x", "Int", "1-*"))
            .with_output(OutputSpec::new("y", "Number", "as:x"))
    }

    #[test]
    fn input_state_survives_a_toml_trip() {
        let mut graph = PlanGraph::new("net");
        let node = graph.create_node(&tool(), "n", NodeKind::Tool).unwrap();
        let x = graph.node_input(node, "x").unwrap();
        graph.set_input_group(x, "pairs").unwrap();

        let state = graph.input_state(x).unwrap();
        let text = toml::to_string(&state).unwrap();
        let back: InputState = toml::from_str(&text).unwrap();
        assert_eq!(back, state);
        assert_eq!(back.cardinality, "1-*");

        let mut other = PlanGraph::new("copy");
        let copy = other.create_node(&tool(), "n", NodeKind::Tool).unwrap();
        let cx = other.node_input(copy, "x").unwrap();
        other.restore_input_state(cx, &back).unwrap();
        assert_eq!(other.input(cx).unwrap().input_group(), "pairs");
        assert_eq!(other.input(cx).unwrap().cardinality_spec(), &CardinalitySpec::Min(1));
    }

    #[test]
    fn restore_reparses_and_checks_the_target() {
        let mut graph = PlanGraph::new("net");
        let node = graph.create_node(&tool(), "n", NodeKind::Tool).unwrap();
        let y = graph.node_output(node, "y").unwrap();

        let mut state = graph.output_state(y).unwrap();
        assert_eq!(state.cardinality, "as:x");

        state.cardinality = "nonsense".into();
        assert!(matches!(graph.restore_output_state(y, &state), Err(PlanError::CardinalityFormat(_))));

        state.cardinality = "2".into();
        state.id = "z".into();
        assert!(matches!(graph.restore_output_state(y, &state), Err(PlanError::Value(_))));
    }
}
