//! Protocol graph: a DAG of action steps over registered containers.
//!
//! Steps are added in order. Each step depends on
//!
//! - the steps it names explicitly (which must already exist), and
//! - for every container it touches, the most recent earlier step that
//!   touched the same container (inferred read/write ordering).
//!
//! Both kinds of edge point from an earlier step to a later one, so the graph
//! is acyclic by construction; [`ProtocolGraph::dry_run`] still orders it with
//! Kahn's algorithm and reports a cycle rather than trusting that.

pub mod dry_run;
pub mod order;

pub use dry_run::{Measurement, ValidatedGraph, ValidatedStep};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::config::CompilerConfig;
use crate::entity::Container;
use crate::error::{DiagnosticValue, ErrorKind, LabResult, PhysicsError};

/// Why one step must run after another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyEdge {
    /// Named in the later step's `depends_on`.
    Explicit,
    /// Both steps touch the same container.
    Inferred,
}

/// A step as stored in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct StepNode {
    pub id: String,
    pub action: Action,
    /// Explicit dependencies, in insertion order of the steps they name.
    pub depends_on: Vec<String>,
    /// Inferred dependencies not already listed explicitly.
    pub inferred_depends_on: Vec<String>,
}

/// Input to [`ProtocolGraph::add_step_with`].
#[derive(Debug, Clone, PartialEq)]
pub struct StepSpec {
    pub id: Option<String>,
    pub action: Action,
    pub depends_on: Vec<String>,
}

impl StepSpec {
    pub fn new(action: Action) -> Self {
        Self {
            id: None,
            action,
            depends_on: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn after(mut self, step_id: impl Into<String>) -> Self {
        self.depends_on.push(step_id.into());
        self
    }
}

/// A protocol under construction.
#[derive(Clone)]
pub struct ProtocolGraph {
    name: String,
    config: CompilerConfig,
    containers: BTreeMap<String, Container>,
    dag: DiGraph<StepNode, DependencyEdge>,
    step_index: HashMap<String, NodeIndex>,
    last_touch: HashMap<String, NodeIndex>,
}

impl fmt::Debug for ProtocolGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolGraph")
            .field("name", &self.name)
            .field("containers", &self.containers.len())
            .field("steps", &self.dag.node_count())
            .field("edges", &self.dag.edge_count())
            .finish()
    }
}

impl ProtocolGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, CompilerConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: CompilerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            containers: BTreeMap::new(),
            dag: DiGraph::new(),
            step_index: HashMap::new(),
            last_touch: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Register a container. Its initial state is validated immediately.
    pub fn add_container(&mut self, container: Container) -> LabResult<()> {
        container.validate()?;
        if self.containers.contains_key(&container.id) {
            return Err(PhysicsError::schema(
                format!("Container id '{}' is registered twice.", container.id),
                DiagnosticValue::text(container.id.clone()),
                format!("give the second container a different id than '{}'", container.id),
            ));
        }
        tracing::debug!(container = %container.id, "container registered");
        self.containers.insert(container.id.clone(), container);
        Ok(())
    }

    /// Registered containers, in id order, as the caller supplied them.
    pub fn containers(&self) -> impl Iterator<Item = &Container> {
        self.containers.values()
    }

    pub fn container(&self, id: &str) -> Option<&Container> {
        self.containers.get(id)
    }

    /// Append a step with a generated id (`s1`, `s2`, ...) and only inferred
    /// dependencies. Returns the step id.
    pub fn add_step(&mut self, action: Action) -> LabResult<String> {
        self.add_step_with(StepSpec::new(action))
    }

    /// Append a step with an optional explicit id and dependency list.
    pub fn add_step_with(&mut self, spec: StepSpec) -> LabResult<String> {
        let id = spec.id.unwrap_or_else(|| self.next_step_id());

        self.check_step_id(&id)?;
        let explicit = self.resolve_explicit(&id, &spec.depends_on)?;
        self.check_footprint(&id, &spec.action)?;

        let explicit_set: BTreeSet<NodeIndex> = explicit.iter().copied().collect();
        let mut inferred: Vec<NodeIndex> = spec
            .action
            .footprint()
            .into_iter()
            .filter_map(|c| self.last_touch.get(c).copied())
            .filter(|idx| !explicit_set.contains(idx))
            .collect();
        inferred.sort_unstable();
        inferred.dedup();

        let node = StepNode {
            id: id.clone(),
            depends_on: explicit.iter().map(|&i| self.dag[i].id.clone()).collect(),
            inferred_depends_on: inferred.iter().map(|&i| self.dag[i].id.clone()).collect(),
            action: spec.action,
        };
        let footprint: Vec<String> =
            node.action.footprint().into_iter().map(str::to_string).collect();
        let idx = self.dag.add_node(node);
        for dep in explicit {
            self.dag.add_edge(dep, idx, DependencyEdge::Explicit);
        }
        for dep in inferred {
            self.dag.add_edge(dep, idx, DependencyEdge::Inferred);
        }
        for container in footprint {
            self.last_touch.insert(container, idx);
        }
        self.step_index.insert(id.clone(), idx);

        tracing::debug!(step = %id, action = %self.dag[idx].action, "step added");
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.dag.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.dag.node_count() == 0
    }

    pub fn step(&self, id: &str) -> Option<&StepNode> {
        self.step_index.get(id).map(|&idx| &self.dag[idx])
    }

    /// Steps in insertion order.
    pub fn steps(&self) -> impl Iterator<Item = &StepNode> {
        self.dag.node_indices().map(|idx| &self.dag[idx])
    }

    /// Rebuild the graph with every action replaced by `f(action)`, keeping
    /// step ids, explicit dependencies and containers.
    pub fn map_actions(&self, mut f: impl FnMut(&Action) -> Action) -> LabResult<Self> {
        let mut next = Self::with_config(self.name.clone(), self.config.clone());
        next.containers = self.containers.clone();
        for step in self.steps() {
            next.add_step_with(StepSpec {
                id: Some(step.id.clone()),
                action: f(&step.action),
                depends_on: step.depends_on.clone(),
            })?;
        }
        Ok(next)
    }

    pub(crate) fn dag(&self) -> &DiGraph<StepNode, DependencyEdge> {
        &self.dag
    }

    pub(crate) fn initial_state(&self) -> &BTreeMap<String, Container> {
        &self.containers
    }

    /// `s{n}` for the next position, skipping ids the caller already chose.
    fn next_step_id(&self) -> String {
        (self.dag.node_count() + 1..)
            .map(|n| format!("s{n}"))
            .find(|id| !self.step_index.contains_key(id))
            .unwrap_or_default()
    }

    fn known_steps(&self) -> Vec<String> {
        self.steps().map(|s| s.id.clone()).collect()
    }

    fn check_step_id(&self, id: &str) -> LabResult<()> {
        if id.trim().is_empty() {
            return Err(PhysicsError::schema(
                "Step id is empty.",
                DiagnosticValue::text(id),
                "omit the id to get a generated one, or use a non-empty id",
            ));
        }
        if self.step_index.contains_key(id) {
            return Err(PhysicsError::new(
                ErrorKind::InvalidOrdering,
                format!("Step id '{id}' is already used."),
                DiagnosticValue::text(id),
                DiagnosticValue::ids(self.known_steps()),
                format!("use a step id other than '{id}'"),
            )
            .at_step(id));
        }
        Ok(())
    }

    /// Explicit dependencies as node indices, sorted and deduplicated.
    fn resolve_explicit(&self, id: &str, depends_on: &[String]) -> LabResult<Vec<NodeIndex>> {
        if depends_on.iter().any(|d| d == id) {
            return Err(PhysicsError::new(
                ErrorKind::CyclicDependency,
                format!("Step '{id}' depends on itself."),
                DiagnosticValue::ids([id]),
                DiagnosticValue::text("acyclic dependencies"),
                format!("remove '{id}' from its own depends_on"),
            )
            .at_step(id));
        }

        let unknown: Vec<&str> = depends_on
            .iter()
            .filter(|d| !self.step_index.contains_key(d.as_str()))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            let known = self.known_steps();
            return Err(PhysicsError::new(
                ErrorKind::UnresolvedDependency,
                format!("Step '{id}' depends on unknown step(s) [{}].", unknown.join(", ")),
                DiagnosticValue::ids(unknown.iter().copied()),
                DiagnosticValue::ids(known.iter().cloned()),
                format!(
                    "depend only on steps added before '{id}': [{}]",
                    known.join(", ")
                ),
            )
            .at_step(id));
        }

        let mut resolved: Vec<NodeIndex> =
            depends_on.iter().map(|d| self.step_index[d.as_str()]).collect();
        resolved.sort_unstable();
        resolved.dedup();
        Ok(resolved)
    }

    fn check_footprint(&self, id: &str, action: &Action) -> LabResult<()> {
        let missing: Vec<&str> = action
            .footprint()
            .into_iter()
            .filter(|c| !self.containers.contains_key(*c))
            .collect();
        if !missing.is_empty() {
            return Err(PhysicsError::new(
                ErrorKind::UnresolvedDependency,
                format!(
                    "Step '{id}' references unregistered container(s) [{}].",
                    missing.join(", ")
                ),
                DiagnosticValue::ids(missing.iter().copied()),
                DiagnosticValue::ids(self.containers.keys().cloned()),
                format!(
                    "register [{}] with add_container before adding '{id}'",
                    missing.join(", ")
                ),
            )
            .at_step(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::SensorKind;
    use crate::units::{Temperature, Time, Volume};

    fn graph() -> ProtocolGraph {
        let mut g = ProtocolGraph::new("test");
        for id in ["A", "B", "C"] {
            g.add_container(Container::new(
                id,
                Volume::microliters(500.0),
                Temperature::celsius(4.0),
                Temperature::celsius(100.0),
            ))
            .unwrap();
        }
        g
    }

    #[test]
    fn ids_are_generated_in_order() {
        let mut g = graph();
        let a = g.add_step(Action::measure("A", SensorKind::Volume)).unwrap();
        let b = g.add_step(Action::measure("B", SensorKind::Volume)).unwrap();
        assert_eq!((a.as_str(), b.as_str()), ("s1", "s2"));
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn generated_ids_skip_caller_chosen_ones() {
        let mut g = graph();
        g.add_step_with(StepSpec::new(Action::measure("A", SensorKind::Volume)).with_id("s2"))
            .unwrap();
        let next = g.add_step(Action::measure("B", SensorKind::Volume)).unwrap();
        assert_eq!(next, "s3");
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn inferred_dependency_on_last_toucher() {
        let mut g = graph();
        g.add_step(Action::measure("A", SensorKind::Volume)).unwrap();
        g.add_step(Action::measure("B", SensorKind::Volume)).unwrap();
        g.add_step(Action::transfer("A", "B", Volume::microliters(1.0))).unwrap();
        g.add_step(Action::measure("A", SensorKind::Mass)).unwrap();

        assert_eq!(g.step("s3").unwrap().inferred_depends_on, vec!["s1", "s2"]);
        assert_eq!(g.step("s4").unwrap().inferred_depends_on, vec!["s3"]);
    }

    #[test]
    fn explicit_dependency_is_not_repeated_as_inferred() {
        let mut g = graph();
        g.add_step(Action::measure("A", SensorKind::Volume)).unwrap();
        g.add_step_with(StepSpec::new(Action::measure("A", SensorKind::Mass)).after("s1"))
            .unwrap();
        let s2 = g.step("s2").unwrap();
        assert_eq!(s2.depends_on, vec!["s1"]);
        assert!(s2.inferred_depends_on.is_empty());
        assert_eq!(g.dag().edge_count(), 1);
    }

    #[test]
    fn forward_reference_is_unresolved() {
        let mut g = graph();
        let err = g
            .add_step_with(
                StepSpec::new(Action::combine("C", "vortex", Time::seconds(5.0))).after("s2"),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnresolvedDependency);
        assert_eq!(err.step_id(), Some("s1"));
        assert!(g.is_empty());
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut g = graph();
        let err = g
            .add_step_with(
                StepSpec::new(Action::measure("A", SensorKind::Volume)).with_id("x").after("x"),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CyclicDependency);
    }

    #[test]
    fn duplicate_step_id() {
        let mut g = graph();
        g.add_step(Action::measure("A", SensorKind::Volume)).unwrap();
        let err = g
            .add_step_with(StepSpec::new(Action::measure("B", SensorKind::Volume)).with_id("s1"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOrdering);
    }

    #[test]
    fn unknown_container() {
        let mut g = graph();
        let err = g.add_step(Action::measure("Z", SensorKind::Volume)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnresolvedDependency);
        assert_eq!(err.actual_value(), &DiagnosticValue::ids(["Z"]));
    }

    #[test]
    fn duplicate_container() {
        let mut g = graph();
        let again = g.container("A").unwrap().clone();
        assert_eq!(
            g.add_container(again).unwrap_err().kind(),
            ErrorKind::SchemaValidationFailure
        );
    }

    #[test]
    fn map_actions_keeps_structure() {
        let mut g = graph();
        g.add_step(Action::transfer("A", "B", Volume::microliters(1.0))).unwrap();
        g.add_step_with(StepSpec::new(Action::measure("C", SensorKind::Volume)).after("s1"))
            .unwrap();
        let doubled = g
            .map_actions(|a| match a {
                Action::Move { source, destination, amount } => {
                    Action::transfer(source.clone(), destination.clone(), *amount * 2.0)
                }
                other => other.clone(),
            })
            .unwrap();
        assert_eq!(doubled.step("s2").unwrap().depends_on, vec!["s1"]);
        assert_eq!(
            doubled.step("s1").unwrap().action,
            Action::transfer("A", "B", Volume::microliters(2.0))
        );
    }
}
