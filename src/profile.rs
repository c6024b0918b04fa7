//! Capability profiles: declared limits of an execution target.
//!
//! A profile is read-only input. It bounds what a device can do regardless of
//! whether the physics would allow more: a liquid handler with a 1 mL
//! pipette cannot move 5 mL even into a 50 mL flask.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::action::ActionKind;
use crate::error::{DiagnosticValue, LabResult, PhysicsError};
use crate::units::{Temperature, Volume};

const LIQUID_HANDLER: &str = include_str!("../data/profiles/liquid-handler.toml");
const THERMAL_BLOCK: &str = include_str!("../data/profiles/thermal-block.toml");

/// Names of the profiles compiled into the crate.
pub const BUNDLED_PROFILES: &[&str] = &["liquid-handler", "thermal-block"];

fn default_max_steps() -> usize {
    200
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityProfile {
    pub name: String,
    /// Largest volume a single `Move` may transfer.
    pub max_volume: Volume,
    /// Largest vessel the target can hold, if limited.
    #[serde(default)]
    pub max_vessel_volume: Option<Volume>,
    pub max_temp: Temperature,
    #[serde(default)]
    pub min_temp: Option<Temperature>,
    /// Action kinds the target executes. Empty means all.
    #[serde(default)]
    pub supported_actions: BTreeSet<ActionKind>,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Hazard tags the target must never handle.
    #[serde(default)]
    pub blocked_hazard_classes: BTreeSet<String>,
}

impl CapabilityProfile {
    pub fn new(name: impl Into<String>, max_volume: Volume, max_temp: Temperature) -> Self {
        Self {
            name: name.into(),
            max_volume,
            max_vessel_volume: None,
            max_temp,
            min_temp: None,
            supported_actions: BTreeSet::new(),
            max_steps: default_max_steps(),
            blocked_hazard_classes: BTreeSet::new(),
        }
    }

    pub fn supports(&self, kind: ActionKind) -> bool {
        self.supported_actions.is_empty() || self.supported_actions.contains(&kind)
    }

    pub fn blocks(&self, tag: &str) -> bool {
        self.blocked_hazard_classes
            .iter()
            .any(|blocked| blocked.eq_ignore_ascii_case(tag))
    }

    /// One of the [`BUNDLED_PROFILES`].
    pub fn bundled(name: &str) -> LabResult<Self> {
        let content = match name {
            "liquid-handler" => LIQUID_HANDLER,
            "thermal-block" => THERMAL_BLOCK,
            other => {
                return Err(PhysicsError::schema(
                    format!("unknown bundled capability profile '{other}'"),
                    DiagnosticValue::text(other),
                    format!("use one of: {}", BUNDLED_PROFILES.join(", ")),
                ));
            }
        };
        Self::from_toml_str(content)
    }

    pub fn from_toml_str(content: &str) -> LabResult<Self> {
        let profile: Self = toml::from_str(content).map_err(|e| {
            PhysicsError::schema(
                format!("failed to parse capability profile: {}", e.message()),
                DiagnosticValue::text("profile"),
                "check the TOML syntax and fields of the capability profile",
            )
        })?;
        profile.check()?;
        Ok(profile)
    }

    pub fn load(path: &Path) -> LabResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PhysicsError::schema(
                format!("failed to read capability profile: {e}"),
                DiagnosticValue::text(path.display().to_string()),
                "ensure the profile file exists and is readable",
            )
        })?;
        Self::from_toml_str(&content)
    }

    /// Resolve a bundled name first, then a file path.
    pub fn resolve(name_or_path: &str) -> LabResult<Self> {
        if BUNDLED_PROFILES.contains(&name_or_path) {
            Self::bundled(name_or_path)
        } else {
            Self::load(Path::new(name_or_path))
        }
    }

    fn check(&self) -> LabResult<()> {
        if !self.max_volume.is_positive() {
            return Err(PhysicsError::schema(
                format!("profile '{}' has a non-positive max_volume", self.name),
                self.max_volume,
                "set max_volume to a positive finite volume",
            ));
        }
        if let Some(vessel) = self.max_vessel_volume
            && !vessel.is_positive()
        {
            return Err(PhysicsError::schema(
                format!("profile '{}' has a non-positive max_vessel_volume", self.name),
                vessel,
                "set max_vessel_volume to a positive finite volume or omit it",
            ));
        }
        if !self.max_temp.is_finite() || self.min_temp.is_some_and(|t| !t.is_finite() || t > self.max_temp) {
            return Err(PhysicsError::schema(
                format!("profile '{}' has an invalid temperature range", self.name),
                self.max_temp,
                "use finite temperatures with min_temp <= max_temp",
            ));
        }
        Ok(())
    }
}
