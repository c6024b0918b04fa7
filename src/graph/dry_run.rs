//! Dry-run evaluation and the validated graph it produces.

use serde::{Deserialize, Serialize};

use super::ProtocolGraph;
use crate::action::{Action, SensorKind};
use crate::entity::Container;
use crate::error::{DiagnosticValue, LabResult};
use crate::ir::IrPayload;
use crate::profile::CapabilityProfile;
use crate::rules::{self, Reading, RuleContext, capability};
use crate::state::Snapshot;

/// A step in evaluation order.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedStep {
    /// 1-based position in evaluation order.
    pub position: usize,
    pub id: String,
    pub action: Action,
    pub depends_on: Vec<String>,
    pub inferred_depends_on: Vec<String>,
}

/// Predicted reading of a `Measure` step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub step_id: String,
    pub container: String,
    pub sensor: SensorKind,
    pub value: DiagnosticValue,
}

impl Measurement {
    fn new(step_id: &str, reading: Reading) -> Self {
        Self {
            step_id: step_id.to_string(),
            container: reading.container,
            sensor: reading.sensor,
            value: reading.value,
        }
    }
}

/// Outcome of a successful dry run. Only a validated graph can be exported.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedGraph {
    name: String,
    steps: Vec<ValidatedStep>,
    initial: Vec<Container>,
    final_state: Snapshot,
    measurements: Vec<Measurement>,
    profile: Option<String>,
}

impl ValidatedGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[ValidatedStep] {
        &self.steps
    }

    /// Step ids in evaluation order.
    pub fn order(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id.as_str()).collect()
    }

    /// Containers as registered, in id order.
    pub fn initial_containers(&self) -> &[Container] {
        &self.initial
    }

    pub fn final_state(&self) -> &Snapshot {
        &self.final_state
    }

    pub fn container(&self, id: &str) -> Option<&Container> {
        self.final_state.get(id)
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    /// Name of the capability profile the run was checked against.
    pub fn profile_name(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    /// Canonical IR of this graph. Serializes the recorded snapshot; nothing
    /// is re-evaluated.
    pub fn export_json(&self) -> IrPayload {
        IrPayload::from_validated(self)
    }
}

impl ProtocolGraph {
    /// Evaluate every step in topological order against a private copy of the
    /// registered containers.
    ///
    /// Halts at the first violation and returns it with the offending step id
    /// attached. The private copy is dropped on failure; the graph and its
    /// registered containers are never modified.
    pub fn dry_run(&self, profile: Option<&CapabilityProfile>) -> LabResult<ValidatedGraph> {
        let span = tracing::info_span!("dry_run", protocol = %self.name());
        let _guard = span.enter();
        tracing::info!(
            steps = self.len(),
            profile = profile.map(|p| p.name.as_str()).unwrap_or("none"),
            "dry run started"
        );

        if let Some(profile) = profile {
            capability::check_step_count(profile, self.len())?;
        }
        let order = self.topological_order()?;

        let mut working: Snapshot = self.initial_state().values().cloned().collect();
        let ctx = RuleContext {
            config: self.config(),
            profile,
        };
        let mut steps = Vec::with_capacity(order.len());
        let mut measurements = Vec::new();

        for (position, idx) in order.into_iter().enumerate() {
            let node = &self.dag()[idx];
            let effect = match rules::evaluate(&node.action, &working, &ctx) {
                Ok(effect) => effect,
                Err(err) => {
                    let err = err.at_step(&node.id);
                    tracing::warn!(
                        step = %node.id,
                        code = err.error_code(),
                        "step rejected: {err}"
                    );
                    return Err(err);
                }
            };
            tracing::debug!(step = %node.id, action = %node.action, "step accepted");

            if let Some(reading) = effect.apply(&mut working) {
                measurements.push(Measurement::new(&node.id, reading));
            }
            steps.push(ValidatedStep {
                position: position + 1,
                id: node.id.clone(),
                action: node.action.clone(),
                depends_on: node.depends_on.clone(),
                inferred_depends_on: node.inferred_depends_on.clone(),
            });
        }

        tracing::info!(steps = steps.len(), "dry run passed");
        Ok(ValidatedGraph {
            name: self.name().to_string(),
            steps,
            initial: self.initial_state().values().cloned().collect(),
            final_state: working,
            measurements,
            profile: profile.map(|p| p.name.clone()),
        })
    }
}
