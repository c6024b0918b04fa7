//! Working entity state for one dry run.
//!
//! A [`Snapshot`] is an arena of containers keyed by id. The graph clones its
//! registered containers into a fresh snapshot at the start of every dry run
//! and drops it on failure, so rollback is structural.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::Container;
use crate::error::{DiagnosticValue, ErrorKind, LabResult, PhysicsError};
use crate::units::{Mass, MassUnit};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    containers: BTreeMap<String, Container>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn container(&self, id: &str) -> LabResult<&Container> {
        self.containers.get(id).ok_or_else(|| {
            PhysicsError::new(
                ErrorKind::UnresolvedDependency,
                format!("Container '{id}' is not part of the working state."),
                DiagnosticValue::text(id),
                DiagnosticValue::ids(self.containers.keys().cloned()),
                format!("register container '{id}' before referencing it"),
            )
        })
    }

    pub fn get(&self, id: &str) -> Option<&Container> {
        self.containers.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.containers.contains_key(id)
    }

    /// Insert or replace a container by id.
    pub fn put(&mut self, container: Container) {
        self.containers.insert(container.id.clone(), container);
    }

    /// Containers in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Container> {
        self.containers.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.containers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// Total mass across every container, in milligrams.
    pub fn total_mass(&self) -> Mass {
        self.containers
            .values()
            .fold(Mass::zero(MassUnit::Milligram), |acc, c| acc + c.total_mass())
    }

    pub fn into_containers(self) -> Vec<Container> {
        self.containers.into_values().collect()
    }
}

impl FromIterator<Container> for Snapshot {
    fn from_iter<I: IntoIterator<Item = Container>>(iter: I) -> Self {
        let mut snap = Self::new();
        for c in iter {
            snap.put(c);
        }
        snap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Matter;
    use crate::units::{Temperature, Volume};

    fn container(id: &str, mg: f64) -> Container {
        Container::new(
            id,
            Volume::microliters(500.0),
            Temperature::celsius(4.0),
            Temperature::celsius(100.0),
        )
        .with_matter(Matter::liquid("water", Mass::milligrams(mg), Volume::microliters(mg)))
    }

    #[test]
    fn iteration_is_id_ordered() {
        let snap: Snapshot = [container("b", 1.0), container("a", 2.0)].into_iter().collect();
        assert_eq!(snap.ids().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(snap.total_mass(), Mass::milligrams(3.0));
    }

    #[test]
    fn missing_container_is_unresolved() {
        let snap = Snapshot::new();
        assert_eq!(snap.container("x").unwrap_err().kind(), ErrorKind::UnresolvedDependency);
    }

    #[test]
    fn put_replaces_by_id() {
        let mut snap: Snapshot = [container("a", 1.0)].into_iter().collect();
        snap.put(container("a", 9.0));
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.total_mass(), Mass::milligrams(9.0));
    }
}
