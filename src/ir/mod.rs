//! Canonical intermediate representation of a validated protocol.
//!
//! The IR is the only artifact the compiler hands downstream. It is built
//! from a [`ValidatedGraph`], rendered with the canonical JSON encoder in
//! [`canonical`] and addressed by the SHA-256 of its canonical bytes with the
//! `content_hash` field left out.
//!
//! ```text
//! ValidatedGraph ──export_json──▶ IrPayload ──to_canonical_bytes──▶ bytes
//!                                     ▲                               │
//!                                     └──────────── load_ir ──────────┘
//! ```

pub mod canonical;
pub mod load;

pub use canonical::{ContentHash, content_hash, stable_id};
pub use load::{load_ir, load_ir_file, load_ir_str};

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::Action;
use crate::entity::{Container, Phase};
use crate::error::{DiagnosticValue, ERROR_CONTRACT_VERSION, ErrorKind, LabResult, PhysicsError};
use crate::graph::{Measurement, ValidatedGraph};

/// Current IR document version.
pub const IR_VERSION: &str = "1.2.0";
/// Current field-set version.
pub const SCHEMA_VERSION: &str = "1.2.0";
/// Previous version, still accepted by [`load_ir`].
pub const LEGACY_IR_VERSION: &str = "1.1.0";
/// Version of the validator that produced a payload.
pub const VALIDATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One step in evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrNode {
    /// 1-based position in evaluation order.
    pub step: usize,
    pub step_id: String,
    pub action: Action,
    pub depends_on: Vec<String>,
    pub inferred_depends_on: Vec<String>,
}

/// A distinct material appearing in the initial containers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialRef {
    pub id: String,
    pub name: String,
    pub phase: Phase,
    pub cas_number: Option<String>,
    pub hazard_tags: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrReferences {
    /// Initial containers, in id order.
    pub containers: Vec<Container>,
    /// Materials, in id order.
    pub materials: Vec<MaterialRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrProvenance {
    pub validator_version: String,
    pub error_contract_version: String,
    pub capability_profile: Option<String>,
}

/// The exported document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrPayload {
    pub ir_version: String,
    pub schema_version: String,
    pub protocol_id: String,
    pub protocol_name: String,
    pub nodes: Vec<IrNode>,
    pub references: IrReferences,
    /// Containers after the last step, in id order.
    pub final_state: Vec<Container>,
    pub measurements: Vec<Measurement>,
    pub provenance: IrProvenance,
    pub content_hash: ContentHash,
}

/// Short description of a payload for audit logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceSummary {
    pub content_hash: ContentHash,
    pub ir_version: String,
    pub schema_version: String,
    pub step_count: usize,
}

fn json_value<T: Serialize>(value: &T) -> Value {
    match serde_json::to_value(value) {
        Ok(v) => v,
        // IR types only contain string-keyed maps, strings and numbers.
        Err(e) => unreachable!("IR serialization failed: {e}"),
    }
}

/// Canonical bytes of a JSON object with its `content_hash` field removed.
pub(crate) fn hashable_bytes(mut value: Value) -> Vec<u8> {
    if let Value::Object(map) = &mut value {
        map.remove("content_hash");
    }
    canonical::to_canonical_bytes(&value)
}

impl IrPayload {
    pub fn from_validated(graph: &ValidatedGraph) -> Self {
        let nodes = graph
            .steps()
            .iter()
            .map(|s| IrNode {
                step: s.position,
                step_id: s.id.clone(),
                action: s.action.clone(),
                depends_on: s.depends_on.clone(),
                inferred_depends_on: s.inferred_depends_on.clone(),
            })
            .collect();

        let mut materials = BTreeMap::new();
        for matter in graph.initial_containers().iter().flat_map(|c| &c.contents) {
            materials.entry(matter.id()).or_insert_with(|| MaterialRef {
                id: matter.id(),
                name: matter.name.clone(),
                phase: matter.phase,
                cas_number: matter.cas_number.clone(),
                hazard_tags: matter.hazard_tags.clone(),
            });
        }

        let mut payload = Self {
            ir_version: IR_VERSION.to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            protocol_id: stable_id("protocol", graph.name()),
            protocol_name: graph.name().to_string(),
            nodes,
            references: IrReferences {
                containers: graph.initial_containers().to_vec(),
                materials: materials.into_values().collect(),
            },
            final_state: graph.final_state().iter().cloned().collect(),
            measurements: graph.measurements().to_vec(),
            provenance: IrProvenance {
                validator_version: VALIDATOR_VERSION.to_string(),
                error_contract_version: ERROR_CONTRACT_VERSION.to_string(),
                capability_profile: graph.profile_name().map(str::to_string),
            },
            content_hash: ContentHash::of(&[]),
        };
        payload.content_hash = payload.compute_hash();
        tracing::info!(
            protocol = %payload.protocol_name,
            steps = payload.nodes.len(),
            hash = %payload.content_hash,
            "IR exported"
        );
        payload
    }

    /// Hash of the canonical payload without its `content_hash` field.
    pub fn compute_hash(&self) -> ContentHash {
        ContentHash::of(&hashable_bytes(json_value(self)))
    }

    pub fn to_canonical_bytes(&self) -> Vec<u8> {
        canonical::to_canonical_bytes(&json_value(self))
    }

    pub fn to_canonical_string(&self) -> String {
        canonical::to_canonical_string(&json_value(self))
    }

    /// Re-derive the hash and compare it with the stored one.
    pub fn verify(&self) -> LabResult<()> {
        let derived = self.compute_hash();
        if derived != self.content_hash {
            return Err(PhysicsError::new(
                ErrorKind::SchemaValidationFailure,
                "IR content hash does not match its contents.",
                DiagnosticValue::text(self.content_hash.to_string()),
                DiagnosticValue::text(derived.to_string()),
                "re-export the protocol; the payload was modified after export",
            ));
        }
        Ok(())
    }

    pub fn summary(&self) -> ProvenanceSummary {
        ProvenanceSummary {
            content_hash: self.content_hash,
            ir_version: self.ir_version.clone(),
            schema_version: self.schema_version.clone(),
            step_count: self.nodes.len(),
        }
    }
}

/// Canonical bytes of a validated graph.
pub fn serialize(graph: &ValidatedGraph) -> Vec<u8> {
    graph.export_json().to_canonical_bytes()
}

/// Content hash of canonical bytes.
pub fn hash(bytes: &[u8]) -> ContentHash {
    content_hash(bytes)
}

/// Inverse of [`serialize`]: parse, upgrade and verify a payload.
pub fn deserialize(bytes: &[u8]) -> LabResult<IrPayload> {
    load_ir(bytes)
}
