//! Loading IR documents back: version normalization, structural checks and
//! hash verification.
//!
//! Version 1.1.0 documents name the node list `steps`. They are checked
//! against their own hash first, then renamed, restamped with the current
//! versions and rehashed.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde_json::{Map, Value};

use super::{IR_VERSION, IrPayload, LEGACY_IR_VERSION, SCHEMA_VERSION, hashable_bytes};
use crate::error::{DiagnosticValue, ErrorKind, LabResult, PhysicsError};
use crate::ir::canonical::ContentHash;

pub fn load_ir(bytes: &[u8]) -> LabResult<IrPayload> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| {
        PhysicsError::schema(
            format!("IR document is not valid JSON: {e}"),
            DiagnosticValue::text("document"),
            "pass the canonical JSON produced by export",
        )
    })?;
    let Value::Object(map) = value else {
        return Err(PhysicsError::schema(
            "IR document is not a JSON object.",
            DiagnosticValue::text("document"),
            "pass the canonical JSON produced by export",
        ));
    };

    let version = map
        .get("ir_version")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let (map, upgraded) = match version.as_str() {
        IR_VERSION => (map, false),
        LEGACY_IR_VERSION => (upgrade_legacy(map)?, true),
        other => {
            return Err(PhysicsError::new(
                ErrorKind::SchemaValidationFailure,
                format!("Unsupported ir_version '{other}'."),
                DiagnosticValue::text(other),
                DiagnosticValue::ids([IR_VERSION, LEGACY_IR_VERSION]),
                format!("re-export with ir_version {IR_VERSION}"),
            ));
        }
    };

    let mut payload: IrPayload = serde_json::from_value(Value::Object(map)).map_err(|e| {
        PhysicsError::schema(
            format!("IR document does not match schema {SCHEMA_VERSION}: {e}"),
            DiagnosticValue::text(version.clone()),
            "re-export the protocol with this validator version",
        )
    })?;
    check_structure(&payload)?;

    if upgraded {
        payload.content_hash = payload.compute_hash();
        tracing::info!(from = LEGACY_IR_VERSION, to = IR_VERSION, "IR upgraded");
    } else {
        payload.verify()?;
    }
    Ok(payload)
}

pub fn load_ir_str(content: &str) -> LabResult<IrPayload> {
    load_ir(content.as_bytes())
}

pub fn load_ir_file(path: &Path) -> LabResult<IrPayload> {
    let bytes = std::fs::read(path).map_err(|e| {
        PhysicsError::schema(
            format!("failed to read IR file: {e}"),
            DiagnosticValue::text(path.display().to_string()),
            "ensure the IR file exists and is readable",
        )
    })?;
    load_ir(&bytes)
}

fn upgrade_legacy(mut map: Map<String, Value>) -> LabResult<Map<String, Value>> {
    let stored = map.get("content_hash").and_then(Value::as_str).map(str::to_string);
    let derived = ContentHash::of(&hashable_bytes(Value::Object(map.clone())));
    if stored.as_deref() != Some(derived.to_string().as_str()) {
        return Err(PhysicsError::new(
            ErrorKind::SchemaValidationFailure,
            "Legacy IR content hash does not match its contents.",
            DiagnosticValue::text(stored.unwrap_or_default()),
            DiagnosticValue::text(derived.to_string()),
            "re-export the protocol; the payload was modified after export",
        ));
    }

    if !map.contains_key("nodes")
        && let Some(steps) = map.remove("steps")
    {
        map.insert("nodes".to_string(), steps);
    }
    map.insert("ir_version".to_string(), Value::from(IR_VERSION));
    map.insert("schema_version".to_string(), Value::from(SCHEMA_VERSION));
    Ok(map)
}

fn structure_error(description: String, actual: DiagnosticValue, hint: &str) -> PhysicsError {
    PhysicsError::new(
        ErrorKind::SchemaValidationFailure,
        description,
        actual,
        DiagnosticValue::text("well-formed IR"),
        hint,
    )
}

/// Steps numbered 1..=n, unique ids, dependencies only on earlier steps,
/// actions only on referenced containers.
fn check_structure(payload: &IrPayload) -> LabResult<()> {
    if payload.schema_version != SCHEMA_VERSION {
        return Err(structure_error(
            format!("Unsupported schema_version '{}'.", payload.schema_version),
            DiagnosticValue::text(payload.schema_version.clone()),
            "re-export the protocol with this validator version",
        ));
    }

    let containers: BTreeSet<&str> =
        payload.references.containers.iter().map(|c| c.id.as_str()).collect();
    let mut seen: HashMap<&str, usize> = HashMap::new();

    for (i, node) in payload.nodes.iter().enumerate() {
        if node.step != i + 1 {
            return Err(structure_error(
                format!("Node '{}' has step {} at position {}.", node.step_id, node.step, i + 1),
                node.step.into(),
                "number nodes contiguously from 1 in evaluation order",
            ));
        }
        if seen.insert(node.step_id.as_str(), node.step).is_some() {
            return Err(structure_error(
                format!("Step id '{}' appears twice.", node.step_id),
                DiagnosticValue::text(node.step_id.clone()),
                "give every node a unique step_id",
            ));
        }
        for dep in node.depends_on.iter().chain(&node.inferred_depends_on) {
            if !seen.get(dep.as_str()).is_some_and(|&s| s < node.step) {
                return Err(structure_error(
                    format!("Node '{}' depends on '{dep}', which does not precede it.", node.step_id),
                    DiagnosticValue::ids([dep.as_str()]),
                    "list only earlier steps as dependencies",
                ));
            }
        }
        let missing: Vec<&str> = node
            .action
            .footprint()
            .into_iter()
            .filter(|c| !containers.contains(c))
            .collect();
        if !missing.is_empty() {
            return Err(structure_error(
                format!("Node '{}' references unknown containers.", node.step_id),
                DiagnosticValue::ids(missing),
                "include every referenced container in references.containers",
            ));
        }
    }

    let final_ids: BTreeSet<&str> = payload.final_state.iter().map(|c| c.id.as_str()).collect();
    if final_ids != containers {
        return Err(structure_error(
            "final_state and references.containers list different containers.".to_string(),
            DiagnosticValue::ids(final_ids.iter().copied()),
            "export final_state for exactly the referenced containers",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::canonical::to_canonical_string;
    use crate::ir::tests::validated;

    fn current() -> IrPayload {
        validated().export_json()
    }

    fn as_value(ir: &IrPayload) -> Value {
        serde_json::to_value(ir).unwrap()
    }

    /// Rehash an edited document so only the structural check can fail.
    fn rehashed(mut value: Value) -> Vec<u8> {
        let hash = ContentHash::of(&hashable_bytes(value.clone()));
        value["content_hash"] = Value::from(hash.to_string());
        to_canonical_string(&value).into_bytes()
    }

    #[test]
    fn current_version_loads() {
        let ir = current();
        assert_eq!(load_ir(&ir.to_canonical_bytes()).unwrap(), ir);
    }

    #[test]
    fn tampering_is_detected() {
        let ir = current();
        let text = ir.to_canonical_string().replace("\"magnitude\":100.0", "\"magnitude\":90.0");
        assert_ne!(text, ir.to_canonical_string());
        let err = load_ir_str(&text).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaValidationFailure);
        assert!(err.to_string().contains("hash"));
    }

    #[test]
    fn legacy_documents_are_upgraded() {
        let ir = current();
        let mut legacy = as_value(&ir);
        let map = legacy.as_object_mut().unwrap();
        let nodes = map.remove("nodes").unwrap();
        map.insert("steps".into(), nodes);
        map.insert("ir_version".into(), Value::from(LEGACY_IR_VERSION));
        map.insert("schema_version".into(), Value::from(LEGACY_IR_VERSION));

        let upgraded = load_ir(&rehashed(legacy)).unwrap();
        assert_eq!(upgraded, ir);
    }

    #[test]
    fn tampered_legacy_document_is_rejected() {
        let mut legacy = as_value(&current());
        legacy["ir_version"] = Value::from(LEGACY_IR_VERSION);
        let err = load_ir(&serde_json::to_vec(&legacy).unwrap()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaValidationFailure);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut v = as_value(&current());
        v["ir_version"] = Value::from("0.9.0");
        let err = load_ir(&rehashed(v)).unwrap_err();
        assert!(err.remediation_hint().contains(IR_VERSION));
    }

    #[test]
    fn forward_dependency_is_rejected() {
        let mut v = as_value(&current());
        v["nodes"][0]["depends_on"] = serde_json::json!(["s2"]);
        let err = load_ir(&rehashed(v)).unwrap_err();
        assert!(err.to_string().contains("does not precede"));
    }

    #[test]
    fn gap_in_step_numbers_is_rejected() {
        let mut v = as_value(&current());
        v["nodes"][1]["step"] = Value::from(3);
        assert!(load_ir(&rehashed(v)).is_err());
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(load_ir(b"[1,2,3]").is_err());
        assert!(load_ir(b"{not json").is_err());
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("protocol.ir.json");
        let ir = current();
        std::fs::write(&path, ir.to_canonical_bytes()).unwrap();
        assert_eq!(load_ir_file(&path).unwrap(), ir);
    }
}
