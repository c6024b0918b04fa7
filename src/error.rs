//! Structured violation taxonomy for protocol compilation.
//!
//! Every caller-triggerable failure in labgraph is a [`PhysicsError`]: a closed
//! set of variants that all carry the same field set. The miette `help` of each
//! variant is the variant's own `remediation_hint`, so the terminal rendering
//! and the machine-readable [`ErrorReport`] are derived from one value.
//!
//! Remediation hints are always produced by `format!` over the violated rule's
//! parameters (see [`crate::rules`]), never by free text generation, so an
//! automated correction loop can rely on their shape.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::units::{Quantity, Unit};

/// Version of the [`ErrorReport`] wire contract.
pub const ERROR_CONTRACT_VERSION: &str = "1.0.0";

/// Value attached to a violation as its `actual_value` or `limit_value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiagnosticValue {
    /// A physical quantity with its unit symbol.
    Measured { magnitude: f64, unit: String },
    /// A dimensionless number (counts, rates, ratios).
    Number(f64),
    /// A token such as an action name or expected bound description.
    Text(String),
    /// A list of identifiers (step ids, container ids, tags).
    Ids(Vec<String>),
}

impl DiagnosticValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Ids(ids.into_iter().map(Into::into).collect())
    }

    /// Numeric magnitude, if this value carries one.
    pub fn magnitude(&self) -> Option<f64> {
        match self {
            Self::Measured { magnitude, .. } => Some(*magnitude),
            Self::Number(n) => Some(*n),
            Self::Text(_) | Self::Ids(_) => None,
        }
    }
}

impl<U: Unit> From<Quantity<U>> for DiagnosticValue {
    fn from(q: Quantity<U>) -> Self {
        Self::Measured {
            magnitude: q.magnitude(),
            unit: q.unit().symbol().to_string(),
        }
    }
}

impl From<f64> for DiagnosticValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<usize> for DiagnosticValue {
    fn from(n: usize) -> Self {
        Self::Number(n as f64)
    }
}

impl std::fmt::Display for DiagnosticValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Measured { magnitude, unit } => write!(f, "{magnitude} {unit}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Ids(ids) => write!(f, "[{}]", ids.join(", ")),
        }
    }
}

// ---------------------------------------------------------------------------
// Physics errors
// ---------------------------------------------------------------------------

/// A single invariant violation. Evaluation halts at the first one.
#[derive(Debug, Clone, PartialEq, Error, Diagnostic)]
pub enum PhysicsError {
    #[error("{description}")]
    #[diagnostic(code(labgraph::volume::overflow), help("{remediation_hint}"))]
    VolumeOverflow {
        description: String,
        actual_value: DiagnosticValue,
        limit_value: DiagnosticValue,
        remediation_hint: String,
        step_id: Option<String>,
    },

    #[error("{description}")]
    #[diagnostic(code(labgraph::thermal::limit_exceeded), help("{remediation_hint}"))]
    ThermalLimitExceeded {
        description: String,
        actual_value: DiagnosticValue,
        limit_value: DiagnosticValue,
        remediation_hint: String,
        step_id: Option<String>,
    },

    #[error("{description}")]
    #[diagnostic(code(labgraph::mass::conservation), help("{remediation_hint}"))]
    MassConservationViolation {
        description: String,
        actual_value: DiagnosticValue,
        limit_value: DiagnosticValue,
        remediation_hint: String,
        step_id: Option<String>,
    },

    #[error("{description}")]
    #[diagnostic(code(labgraph::ordering::invalid), help("{remediation_hint}"))]
    InvalidOrdering {
        description: String,
        actual_value: DiagnosticValue,
        limit_value: DiagnosticValue,
        remediation_hint: String,
        step_id: Option<String>,
    },

    #[error("{description}")]
    #[diagnostic(code(labgraph::compatibility::incompatible), help("{remediation_hint}"))]
    IncompatibleMaterials {
        description: String,
        actual_value: DiagnosticValue,
        limit_value: DiagnosticValue,
        remediation_hint: String,
        step_id: Option<String>,
    },

    #[error("{description}")]
    #[diagnostic(code(labgraph::capability::bound_exceeded), help("{remediation_hint}"))]
    CapabilityBoundExceeded {
        description: String,
        actual_value: DiagnosticValue,
        limit_value: DiagnosticValue,
        remediation_hint: String,
        step_id: Option<String>,
    },

    #[error("{description}")]
    #[diagnostic(code(labgraph::graph::unresolved_dependency), help("{remediation_hint}"))]
    UnresolvedDependency {
        description: String,
        actual_value: DiagnosticValue,
        limit_value: DiagnosticValue,
        remediation_hint: String,
        step_id: Option<String>,
    },

    #[error("{description}")]
    #[diagnostic(code(labgraph::graph::cyclic_dependency), help("{remediation_hint}"))]
    CyclicDependency {
        description: String,
        actual_value: DiagnosticValue,
        limit_value: DiagnosticValue,
        remediation_hint: String,
        step_id: Option<String>,
    },

    #[error("{description}")]
    #[diagnostic(code(labgraph::schema::validation), help("{remediation_hint}"))]
    SchemaValidationFailure {
        description: String,
        actual_value: DiagnosticValue,
        limit_value: DiagnosticValue,
        remediation_hint: String,
        step_id: Option<String>,
    },
}

/// Discriminant of [`PhysicsError`], used for construction and tallies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorKind {
    VolumeOverflow,
    ThermalLimitExceeded,
    MassConservationViolation,
    InvalidOrdering,
    IncompatibleMaterials,
    CapabilityBoundExceeded,
    UnresolvedDependency,
    CyclicDependency,
    SchemaValidationFailure,
}

impl ErrorKind {
    /// Stable, versioned error code.
    pub fn error_code(self) -> &'static str {
        match self {
            Self::VolumeOverflow => "VOL_001",
            Self::ThermalLimitExceeded => "THM_001",
            Self::MassConservationViolation => "MAS_001",
            Self::InvalidOrdering => "ORD_001",
            Self::IncompatibleMaterials => "CMP_001",
            Self::CapabilityBoundExceeded => "CAP_001",
            Self::UnresolvedDependency => "DEP_001",
            Self::CyclicDependency => "DEP_002",
            Self::SchemaValidationFailure => "SCH_001",
        }
    }

    /// Family of the violated constraint.
    pub fn constraint_type(self) -> &'static str {
        match self {
            Self::VolumeOverflow => "volume",
            Self::ThermalLimitExceeded => "thermal",
            Self::MassConservationViolation => "mass_balance",
            Self::InvalidOrdering => "ordering",
            Self::IncompatibleMaterials => "compatibility",
            Self::CapabilityBoundExceeded => "capability",
            Self::UnresolvedDependency | Self::CyclicDependency => "dependency",
            Self::SchemaValidationFailure => "schema",
        }
    }
}

/// Borrowed view of the shared field set of a [`PhysicsError`].
#[derive(Debug, Clone, Copy)]
pub struct ViolationRef<'a> {
    pub description: &'a str,
    pub actual_value: &'a DiagnosticValue,
    pub limit_value: &'a DiagnosticValue,
    pub remediation_hint: &'a str,
    pub step_id: Option<&'a str>,
}

impl PhysicsError {
    /// Build a violation of the given kind. `step_id` is attached later by the
    /// graph with [`PhysicsError::at_step`].
    pub fn new(
        kind: ErrorKind,
        description: impl Into<String>,
        actual_value: impl Into<DiagnosticValue>,
        limit_value: impl Into<DiagnosticValue>,
        remediation_hint: impl Into<String>,
    ) -> Self {
        let description = description.into();
        let actual_value = actual_value.into();
        let limit_value = limit_value.into();
        let remediation_hint = remediation_hint.into();
        let step_id = None;
        match kind {
            ErrorKind::VolumeOverflow => Self::VolumeOverflow {
                description,
                actual_value,
                limit_value,
                remediation_hint,
                step_id,
            },
            ErrorKind::ThermalLimitExceeded => Self::ThermalLimitExceeded {
                description,
                actual_value,
                limit_value,
                remediation_hint,
                step_id,
            },
            ErrorKind::MassConservationViolation => Self::MassConservationViolation {
                description,
                actual_value,
                limit_value,
                remediation_hint,
                step_id,
            },
            ErrorKind::InvalidOrdering => Self::InvalidOrdering {
                description,
                actual_value,
                limit_value,
                remediation_hint,
                step_id,
            },
            ErrorKind::IncompatibleMaterials => Self::IncompatibleMaterials {
                description,
                actual_value,
                limit_value,
                remediation_hint,
                step_id,
            },
            ErrorKind::CapabilityBoundExceeded => Self::CapabilityBoundExceeded {
                description,
                actual_value,
                limit_value,
                remediation_hint,
                step_id,
            },
            ErrorKind::UnresolvedDependency => Self::UnresolvedDependency {
                description,
                actual_value,
                limit_value,
                remediation_hint,
                step_id,
            },
            ErrorKind::CyclicDependency => Self::CyclicDependency {
                description,
                actual_value,
                limit_value,
                remediation_hint,
                step_id,
            },
            ErrorKind::SchemaValidationFailure => Self::SchemaValidationFailure {
                description,
                actual_value,
                limit_value,
                remediation_hint,
                step_id,
            },
        }
    }

    /// Shorthand for a [`ErrorKind::SchemaValidationFailure`] raised by a
    /// document parser.
    pub fn schema(
        description: impl Into<String>,
        actual: impl Into<DiagnosticValue>,
        hint: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorKind::SchemaValidationFailure,
            description,
            actual,
            DiagnosticValue::text("valid document"),
            hint,
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::VolumeOverflow { .. } => ErrorKind::VolumeOverflow,
            Self::ThermalLimitExceeded { .. } => ErrorKind::ThermalLimitExceeded,
            Self::MassConservationViolation { .. } => ErrorKind::MassConservationViolation,
            Self::InvalidOrdering { .. } => ErrorKind::InvalidOrdering,
            Self::IncompatibleMaterials { .. } => ErrorKind::IncompatibleMaterials,
            Self::CapabilityBoundExceeded { .. } => ErrorKind::CapabilityBoundExceeded,
            Self::UnresolvedDependency { .. } => ErrorKind::UnresolvedDependency,
            Self::CyclicDependency { .. } => ErrorKind::CyclicDependency,
            Self::SchemaValidationFailure { .. } => ErrorKind::SchemaValidationFailure,
        }
    }

    pub fn error_code(&self) -> &'static str {
        self.kind().error_code()
    }

    pub fn constraint_type(&self) -> &'static str {
        self.kind().constraint_type()
    }

    pub fn violation(&self) -> ViolationRef<'_> {
        match self {
            Self::VolumeOverflow {
                description,
                actual_value,
                limit_value,
                remediation_hint,
                step_id,
            }
            | Self::ThermalLimitExceeded {
                description,
                actual_value,
                limit_value,
                remediation_hint,
                step_id,
            }
            | Self::MassConservationViolation {
                description,
                actual_value,
                limit_value,
                remediation_hint,
                step_id,
            }
            | Self::InvalidOrdering {
                description,
                actual_value,
                limit_value,
                remediation_hint,
                step_id,
            }
            | Self::IncompatibleMaterials {
                description,
                actual_value,
                limit_value,
                remediation_hint,
                step_id,
            }
            | Self::CapabilityBoundExceeded {
                description,
                actual_value,
                limit_value,
                remediation_hint,
                step_id,
            }
            | Self::UnresolvedDependency {
                description,
                actual_value,
                limit_value,
                remediation_hint,
                step_id,
            }
            | Self::CyclicDependency {
                description,
                actual_value,
                limit_value,
                remediation_hint,
                step_id,
            }
            | Self::SchemaValidationFailure {
                description,
                actual_value,
                limit_value,
                remediation_hint,
                step_id,
            } => ViolationRef {
                description,
                actual_value,
                limit_value,
                remediation_hint,
                step_id: step_id.as_deref(),
            },
        }
    }

    pub fn actual_value(&self) -> &DiagnosticValue {
        self.violation().actual_value
    }

    pub fn limit_value(&self) -> &DiagnosticValue {
        self.violation().limit_value
    }

    pub fn remediation_hint(&self) -> &str {
        self.violation().remediation_hint
    }

    pub fn step_id(&self) -> Option<&str> {
        self.violation().step_id
    }

    /// Attach the id of the node that produced this violation.
    pub fn at_step(mut self, id: &str) -> Self {
        match &mut self {
            Self::VolumeOverflow { step_id, .. }
            | Self::ThermalLimitExceeded { step_id, .. }
            | Self::MassConservationViolation { step_id, .. }
            | Self::InvalidOrdering { step_id, .. }
            | Self::IncompatibleMaterials { step_id, .. }
            | Self::CapabilityBoundExceeded { step_id, .. }
            | Self::UnresolvedDependency { step_id, .. }
            | Self::CyclicDependency { step_id, .. }
            | Self::SchemaValidationFailure { step_id, .. } => {
                *step_id = Some(id.to_string());
            }
        }
        self
    }

    /// Wire form consumed by agent correction loops.
    pub fn to_report(&self) -> ErrorReport {
        let v = self.violation();
        ErrorReport {
            error_contract_version: ERROR_CONTRACT_VERSION.to_string(),
            error_code: self.error_code().to_string(),
            constraint_type: self.constraint_type().to_string(),
            description: v.description.to_string(),
            actual_value: v.actual_value.clone(),
            limit_value: v.limit_value.clone(),
            remediation_hint: v.remediation_hint.to_string(),
            step_id: v.step_id.map(str::to_string),
        }
    }
}

/// Versioned, serializable error envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub error_contract_version: String,
    pub error_code: String,
    pub constraint_type: String,
    pub description: String,
    pub actual_value: DiagnosticValue,
    pub limit_value: DiagnosticValue,
    pub remediation_hint: String,
    pub step_id: Option<String>,
}

impl ErrorReport {
    /// Canonical JSON rendering (sorted keys, compact separators).
    pub fn to_agent_payload(&self) -> String {
        match serde_json::to_value(self) {
            Ok(value) => crate::ir::canonical::to_canonical_string(&value),
            // Every field is a plain string, number or list; serialization cannot fail.
            Err(e) => unreachable!("error report serialization failed: {e}"),
        }
    }
}

impl From<&PhysicsError> for ErrorReport {
    fn from(err: &PhysicsError) -> Self {
        err.to_report()
    }
}

/// Convenience alias for functions returning labgraph results.
pub type LabResult<T> = std::result::Result<T, PhysicsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Volume;

    fn overflow() -> PhysicsError {
        PhysicsError::new(
            ErrorKind::VolumeOverflow,
            "Source A holds less than requested.",
            Volume::microliters(150.0),
            Volume::microliters(200.0),
            "reduce requested volume to <= 150 uL",
        )
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(overflow().error_code(), "VOL_001");
        assert_eq!(overflow().constraint_type(), "volume");
        assert_eq!(ErrorKind::CyclicDependency.error_code(), "DEP_002");
        assert_eq!(ErrorKind::CyclicDependency.constraint_type(), "dependency");
    }

    #[test]
    fn new_round_trips_kind() {
        let kinds = [
            ErrorKind::VolumeOverflow,
            ErrorKind::ThermalLimitExceeded,
            ErrorKind::MassConservationViolation,
            ErrorKind::InvalidOrdering,
            ErrorKind::IncompatibleMaterials,
            ErrorKind::CapabilityBoundExceeded,
            ErrorKind::UnresolvedDependency,
            ErrorKind::CyclicDependency,
            ErrorKind::SchemaValidationFailure,
        ];
        for kind in kinds {
            let err = PhysicsError::new(kind, "d", 1.0, 2.0, "h");
            assert_eq!(err.kind(), kind);
        }
    }

    #[test]
    fn step_id_is_attached() {
        let err = overflow().at_step("s3");
        assert_eq!(err.step_id(), Some("s3"));
        assert_eq!(err.to_report().step_id.as_deref(), Some("s3"));
    }

    #[test]
    fn help_is_the_remediation_hint() {
        let err = overflow();
        let help = err.help().map(|h| h.to_string());
        assert_eq!(help.as_deref(), Some("reduce requested volume to <= 150 uL"));
        assert_eq!(format!("{err}"), "Source A holds less than requested.");
    }

    #[test]
    fn agent_payload_is_canonical() {
        let payload = overflow().to_report().to_agent_payload();
        assert!(payload.starts_with(r#"{"actual_value":{"magnitude":150.0,"unit":"uL"}"#));
        assert!(payload.contains(r#""error_code":"VOL_001""#));
        assert!(payload.contains(r#""error_contract_version":"1.0.0""#));

        let back: ErrorReport = serde_json::from_str(&payload).unwrap();
        assert_eq!(back, overflow().to_report());
    }
}
