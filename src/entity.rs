//! Physical entities: matter and the containers that hold it.
//!
//! Entities are plain values. Evaluation never edits a caller's container in
//! place; rules produce replacement values that the working
//! [`Snapshot`](crate::state::Snapshot) swaps in.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DiagnosticValue, ErrorKind, LabResult, PhysicsError};
use crate::ir::canonical::stable_id;
use crate::units::{Mass, MassUnit, Temperature, Volume, VolumeUnit};

/// Room temperature, used when a document omits a temperature.
pub const AMBIENT_TEMP_C: f64 = 25.0;

/// Volumetric expansion coefficient of water near room temperature, 1/K.
pub const WATER_EXPANSION_COEFFICIENT: f64 = 2.14e-4;

fn ambient() -> Temperature {
    Temperature::celsius(AMBIENT_TEMP_C)
}

fn water_expansion() -> f64 {
    WATER_EXPANSION_COEFFICIENT
}

/// Phase of a quantity of matter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Solid,
    Liquid,
    Gas,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Solid => "solid",
            Self::Liquid => "liquid",
            Self::Gas => "gas",
        })
    }
}

// ---------------------------------------------------------------------------
// Matter
// ---------------------------------------------------------------------------

/// A named quantity of one material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matter {
    pub name: String,
    pub phase: Phase,
    pub mass: Mass,
    pub volume: Volume,
    #[serde(default = "ambient")]
    pub temperature: Temperature,
    /// Component mass fractions, when the matter is a known mixture.
    #[serde(default)]
    pub composition: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub cas_number: Option<String>,
    #[serde(default)]
    pub flash_point: Option<Temperature>,
    #[serde(default = "water_expansion")]
    pub thermal_expansion_coefficient: f64,
    #[serde(default)]
    pub hazard_tags: BTreeSet<String>,
    /// Hazard tags this matter must never share a container with.
    #[serde(default)]
    pub incompatible_with: BTreeSet<String>,
}

impl Matter {
    pub fn new(name: impl Into<String>, phase: Phase, mass: Mass, volume: Volume) -> Self {
        Self {
            name: name.into(),
            phase,
            mass,
            volume,
            temperature: ambient(),
            composition: None,
            cas_number: None,
            flash_point: None,
            thermal_expansion_coefficient: WATER_EXPANSION_COEFFICIENT,
            hazard_tags: BTreeSet::new(),
            incompatible_with: BTreeSet::new(),
        }
    }

    /// Liquid shorthand used throughout tests and demos.
    pub fn liquid(name: impl Into<String>, mass: Mass, volume: Volume) -> Self {
        Self::new(name, Phase::Liquid, mass, volume)
    }

    pub fn with_temperature(mut self, temperature: Temperature) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_cas_number(mut self, cas: impl Into<String>) -> Self {
        self.cas_number = Some(cas.into());
        self
    }

    pub fn with_flash_point(mut self, flash_point: Temperature) -> Self {
        self.flash_point = Some(flash_point);
        self
    }

    pub fn with_expansion_coefficient(mut self, alpha: f64) -> Self {
        self.thermal_expansion_coefficient = alpha;
        self
    }

    pub fn with_composition(mut self, composition: BTreeMap<String, f64>) -> Self {
        self.composition = Some(composition);
        self
    }

    pub fn with_hazard(mut self, tag: impl Into<String>) -> Self {
        self.hazard_tags.insert(tag.into().to_lowercase());
        self
    }

    pub fn incompatible_with(mut self, tag: impl Into<String>) -> Self {
        self.incompatible_with.insert(tag.into().to_lowercase());
        self
    }

    /// Stable identifier derived from the material name.
    pub fn id(&self) -> String {
        stable_id("matter", &self.name)
    }

    /// Whether `other` is the same material in the same phase.
    pub fn same_material(&self, other: &Matter) -> bool {
        self.phase == other.phase && self.name.trim().eq_ignore_ascii_case(other.name.trim())
    }

    /// Whether this matter and `other` may share a container.
    ///
    /// Returns the offending hazard tag when they may not.
    pub fn conflict_with(&self, other: &Matter) -> Option<String> {
        self.incompatible_with
            .intersection(&other.hazard_tags)
            .chain(other.incompatible_with.intersection(&self.hazard_tags))
            .next()
            .cloned()
    }

    fn validate(&self, container: &str) -> LabResult<()> {
        let finite = self.mass.is_finite()
            && self.volume.is_finite()
            && self.temperature.is_finite()
            && self.thermal_expansion_coefficient.is_finite()
            && self.flash_point.is_none_or(|t| t.is_finite());
        if !finite {
            return Err(PhysicsError::schema(
                format!("Matter '{}' in container '{container}' has a non-finite field.", self.name),
                DiagnosticValue::text(self.name.clone()),
                "use finite magnitudes for mass, volume and temperature",
            ));
        }
        if self.mass.magnitude() < 0.0 || self.volume.magnitude() < 0.0 {
            return Err(PhysicsError::schema(
                format!(
                    "Matter '{}' in container '{container}' has a negative mass or volume.",
                    self.name
                ),
                DiagnosticValue::text(self.name.clone()),
                "use non-negative mass and volume",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

/// A vessel with capacity and temperature limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    #[serde(default)]
    pub label: String,
    pub max_volume: Volume,
    pub min_temp: Temperature,
    pub max_temp: Temperature,
    #[serde(default)]
    pub contents: Vec<Matter>,
    #[serde(default = "ambient")]
    pub current_temp: Temperature,
}

impl Container {
    pub fn new(
        id: impl Into<String>,
        max_volume: Volume,
        min_temp: Temperature,
        max_temp: Temperature,
    ) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            max_volume,
            min_temp,
            max_temp,
            contents: Vec::new(),
            current_temp: ambient(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_matter(mut self, matter: Matter) -> Self {
        self.contents.push(matter);
        self
    }

    pub fn with_temperature(mut self, temperature: Temperature) -> Self {
        self.current_temp = temperature;
        self
    }

    /// Sum of content volumes, in the unit of `max_volume`.
    pub fn current_volume(&self) -> Volume {
        self.contents
            .iter()
            .fold(Volume::zero(self.max_volume.unit()), |acc, m| acc + m.volume)
    }

    /// Sum of content masses, in milligrams.
    pub fn total_mass(&self) -> Mass {
        self.contents
            .iter()
            .fold(Mass::zero(MassUnit::Milligram), |acc, m| acc + m.mass)
    }

    /// Volume that can still be added, in the unit of `max_volume`.
    pub fn headroom(&self) -> Volume {
        let free = self.max_volume - self.current_volume();
        if free.magnitude() > 0.0 { free } else { Volume::zero(self.max_volume.unit()) }
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// Union of hazard tags over all contents.
    pub fn hazard_tags(&self) -> BTreeSet<&str> {
        self.contents
            .iter()
            .flat_map(|m| m.hazard_tags.iter().map(String::as_str))
            .collect()
    }

    /// Check the container's own invariants: well-formed fields, contents
    /// within capacity, temperature within bounds.
    pub fn validate(&self) -> LabResult<()> {
        if self.id.trim().is_empty() {
            return Err(PhysicsError::schema(
                "Container id is empty.",
                DiagnosticValue::text(""),
                "give every container a non-empty id",
            ));
        }
        let finite = self.max_volume.is_finite()
            && self.min_temp.is_finite()
            && self.max_temp.is_finite()
            && self.current_temp.is_finite();
        if !finite || self.max_volume.magnitude() <= 0.0 {
            return Err(PhysicsError::schema(
                format!("Container '{}' has a non-finite or non-positive limit.", self.id),
                self.max_volume,
                "use a finite positive max_volume and finite temperature bounds",
            ));
        }
        if self.min_temp > self.max_temp {
            return Err(PhysicsError::schema(
                format!("Container '{}' has min_temp above max_temp.", self.id),
                self.min_temp,
                format!("set min_temp <= {}", self.max_temp),
            ));
        }
        for matter in &self.contents {
            matter.validate(&self.id)?;
        }

        let held = self.current_volume();
        if held > self.max_volume {
            return Err(PhysicsError::new(
                ErrorKind::VolumeOverflow,
                format!("Container '{}' starts above its capacity.", self.id),
                held,
                self.max_volume,
                format!("reduce initial contents of '{}' to <= {}", self.id, self.max_volume),
            ));
        }
        if self.current_temp > self.max_temp || self.current_temp < self.min_temp {
            return Err(PhysicsError::new(
                ErrorKind::ThermalLimitExceeded,
                format!("Container '{}' starts outside its temperature range.", self.id),
                self.current_temp,
                if self.current_temp > self.max_temp { self.max_temp } else { self.min_temp },
                format!(
                    "set the initial temperature of '{}' within [{}, {}]",
                    self.id, self.min_temp, self.max_temp
                ),
            ));
        }
        Ok(())
    }
}

/// Volume in microliters, the unit used for mixing arithmetic.
pub(crate) fn microliters(v: Volume) -> f64 {
    v.value_in(VolumeUnit::Microliter)
}
