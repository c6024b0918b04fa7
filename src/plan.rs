//! Protocol plan documents: the form an agent proposes a protocol in.
//!
//! ```json
//! {
//!   "name": "dilution",
//!   "containers": [ { "id": "A", "max_volume": {"magnitude": 500, "unit": "uL"}, ... } ],
//!   "steps": [
//!     { "action": { "action_type": "Move", "source": "A", "destination": "B",
//!                   "amount": {"magnitude": 100, "unit": "uL"} } },
//!     { "id": "read", "action": { "action_type": "Measure", "target": "B", "sensor": "volume" },
//!       "depends_on": ["s1"] }
//!   ]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::config::CompilerConfig;
use crate::entity::Container;
use crate::error::{DiagnosticValue, LabResult, PhysicsError};
use crate::graph::{ProtocolGraph, StepSpec};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub action: Action,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl PlanStep {
    pub fn new(action: Action) -> Self {
        Self {
            id: None,
            action,
            depends_on: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolPlan {
    pub name: String,
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
}

fn parse_error(format: &str, message: String) -> PhysicsError {
    PhysicsError::schema(
        format!("failed to parse {format} protocol plan: {message}"),
        DiagnosticValue::text(format),
        "emit a plan with name, containers and steps[{id?, action, depends_on?}]",
    )
}

impl ProtocolPlan {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            containers: Vec::new(),
            steps: Vec::new(),
        }
    }

    pub fn with_container(mut self, container: Container) -> Self {
        self.containers.push(container);
        self
    }

    pub fn with_step(mut self, action: Action) -> Self {
        self.steps.push(PlanStep::new(action));
        self
    }

    pub fn from_json_str(content: &str) -> LabResult<Self> {
        serde_json::from_str(content).map_err(|e| parse_error("JSON", e.to_string()))
    }

    pub fn from_toml_str(content: &str) -> LabResult<Self> {
        toml::from_str(content).map_err(|e| parse_error("TOML", e.message().to_string()))
    }

    /// Load a plan file; `.toml` files are parsed as TOML, anything else as JSON.
    pub fn load(path: &Path) -> LabResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PhysicsError::schema(
                format!("failed to read protocol plan: {e}"),
                DiagnosticValue::text(path.display().to_string()),
                "ensure the plan file exists and is readable",
            )
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            _ => Self::from_json_str(&content),
        }
    }

    pub fn to_json(&self) -> String {
        match serde_json::to_string_pretty(self) {
            Ok(json) => json,
            Err(e) => unreachable!("plan serialization failed: {e}"),
        }
    }

    /// Assemble the graph. Fails with the same errors as
    /// [`ProtocolGraph::add_container`] and [`ProtocolGraph::add_step_with`].
    pub fn build(&self, config: &CompilerConfig) -> LabResult<ProtocolGraph> {
        let mut graph = ProtocolGraph::with_config(self.name.clone(), config.clone());
        for container in &self.containers {
            graph.add_container(container.clone())?;
        }
        for step in &self.steps {
            graph.add_step_with(StepSpec {
                id: step.id.clone(),
                action: step.action.clone(),
                depends_on: step.depends_on.clone(),
            })?;
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const PLAN: &str = r#"{
        "name": "dilution",
        "containers": [
            {"id": "A", "max_volume": {"magnitude": 500, "unit": "uL"},
             "min_temp": {"magnitude": 4, "unit": "C"}, "max_temp": {"magnitude": 100, "unit": "C"},
             "contents": [{"name": "water", "phase": "liquid",
                           "mass": {"magnitude": 150, "unit": "mg"},
                           "volume": {"magnitude": 150, "unit": "uL"}}]},
            {"id": "B", "max_volume": {"magnitude": 500, "unit": "uL"},
             "min_temp": {"magnitude": 4, "unit": "C"}, "max_temp": {"magnitude": 100, "unit": "C"}}
        ],
        "steps": [
            {"action": {"action_type": "Move", "source": "A", "destination": "B",
                        "amount": {"magnitude": 100, "unit": "uL"}}},
            {"id": "read", "action": {"action_type": "Measure", "target": "B", "sensor": "volume"},
             "depends_on": ["s1"]}
        ]
    }"#;

    #[test]
    fn json_plan_builds() {
        let plan = ProtocolPlan::from_json_str(PLAN).unwrap();
        let graph = plan.build(&CompilerConfig::default()).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.step("read").unwrap().depends_on, vec!["s1"]);
    }

    #[test]
    fn json_round_trip() {
        let plan = ProtocolPlan::from_json_str(PLAN).unwrap();
        assert_eq!(ProtocolPlan::from_json_str(&plan.to_json()).unwrap(), plan);
    }

    #[test]
    fn toml_plan() {
        let doc = r#"
            name = "heat"

            [[containers]]
            id = "T"
            max_volume = { magnitude = 200.0, unit = "uL" }
            min_temp = { magnitude = 4.0, unit = "C" }
            max_temp = { magnitude = 100.0, unit = "C" }

            [[steps]]
            action = { action_type = "Transform", target = "T", parameter = "temperature", target_value = { magnitude = 95.0, unit = "C" } }
        "#;
        let plan = ProtocolPlan::from_toml_str(doc).unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert!(plan.build(&CompilerConfig::default()).is_ok());
    }

    #[test]
    fn malformed_plan_is_a_schema_failure() {
        let err = ProtocolPlan::from_json_str(r#"{"name": 3}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaValidationFailure);
    }

    #[test]
    fn build_surfaces_graph_errors() {
        let mut plan = ProtocolPlan::from_json_str(PLAN).unwrap();
        plan.steps[1].depends_on = vec!["later".into()];
        let err = plan.build(&CompilerConfig::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnresolvedDependency);
        assert_eq!(err.step_id(), Some("read"));
    }

    #[test]
    fn load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        std::fs::write(&path, PLAN).unwrap();
        assert_eq!(ProtocolPlan::load(&path).unwrap().name, "dilution");
    }
}
