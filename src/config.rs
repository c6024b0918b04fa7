//! Compiler tuning knobs.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::entity::{AMBIENT_TEMP_C, WATER_EXPANSION_COEFFICIENT};
use crate::error::{DiagnosticValue, LabResult, PhysicsError};

fn default_mass_rel_tolerance() -> f64 {
    1e-9
}
fn default_max_ramp_rate() -> f64 {
    10.0
}
fn default_reference_temp() -> f64 {
    AMBIENT_TEMP_C
}
fn default_expansion() -> f64 {
    WATER_EXPANSION_COEFFICIENT
}
fn default_residual_epsilon() -> f64 {
    1e-9
}

/// Numeric tolerances and physical constants used by the rule engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Relative tolerance for mass conservation (default: 1e-9).
    #[serde(default = "default_mass_rel_tolerance")]
    pub mass_rel_tolerance: f64,
    /// Maximum heating or cooling rate in °C/s when a duration is given.
    #[serde(default = "default_max_ramp_rate")]
    pub max_ramp_rate_c_per_s: f64,
    /// Temperature at which declared volumes are measured, °C.
    #[serde(default = "default_reference_temp")]
    pub reference_temp_c: f64,
    /// Expansion coefficient used when no matter declares one, 1/K.
    #[serde(default = "default_expansion")]
    pub default_expansion_coefficient: f64,
    /// Residual volume below which a drained matter entry is dropped,
    /// in the matter's own unit.
    #[serde(default = "default_residual_epsilon")]
    pub residual_volume_epsilon: f64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            mass_rel_tolerance: default_mass_rel_tolerance(),
            max_ramp_rate_c_per_s: default_max_ramp_rate(),
            reference_temp_c: default_reference_temp(),
            default_expansion_coefficient: default_expansion(),
            residual_volume_epsilon: default_residual_epsilon(),
        }
    }
}

impl CompilerConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> LabResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| {
            PhysicsError::schema(
                format!("failed to parse compiler config: {}", e.message()),
                DiagnosticValue::text("config"),
                "check the TOML syntax and key names of the compiler config",
            )
        })?;
        config.check()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> LabResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PhysicsError::schema(
                format!("failed to read compiler config: {e}"),
                DiagnosticValue::text(path.display().to_string()),
                "ensure the config file exists and is readable",
            )
        })?;
        Self::from_toml_str(&content)
    }

    fn check(&self) -> LabResult<()> {
        let fields = [
            ("mass_rel_tolerance", self.mass_rel_tolerance),
            ("max_ramp_rate_c_per_s", self.max_ramp_rate_c_per_s),
            ("default_expansion_coefficient", self.default_expansion_coefficient),
            ("residual_volume_epsilon", self.residual_volume_epsilon),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(PhysicsError::schema(
                    format!("compiler config field '{name}' must be finite and non-negative"),
                    value,
                    format!("set {name} to a finite value >= 0"),
                ));
            }
        }
        if !self.reference_temp_c.is_finite() {
            return Err(PhysicsError::schema(
                "compiler config field 'reference_temp_c' must be finite",
                self.reference_temp_c,
                "set reference_temp_c to a finite temperature in C",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(CompilerConfig::from_toml_str("").unwrap(), CompilerConfig::default());
    }

    #[test]
    fn partial_override() {
        let cfg = CompilerConfig::from_toml_str("max_ramp_rate_c_per_s = 2.5\n").unwrap();
        assert_eq!(cfg.max_ramp_rate_c_per_s, 2.5);
        assert_eq!(cfg.mass_rel_tolerance, 1e-9);
    }

    #[test]
    fn malformed_toml_is_schema_failure() {
        let err = CompilerConfig::from_toml_str("mass_rel_tolerance = [").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaValidationFailure);
    }

    #[test]
    fn negative_tolerance_is_rejected() {
        let err = CompilerConfig::from_toml_str("mass_rel_tolerance = -1.0").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaValidationFailure);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labgraph.toml");
        std::fs::write(&path, "reference_temp_c = 20.0\n").unwrap();
        assert_eq!(CompilerConfig::load(&path).unwrap().reference_temp_c, 20.0);
        assert!(CompilerConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
