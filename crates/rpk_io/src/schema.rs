//! Published artifact schemas (JSON Schema draft 2020-12) and structural
//! validation.
//!
//! Schemas are addressed as `schemas/rpk-<major>.<minor>.schema.json` and
//! embedded at compile time. The reader accepts any minor under a known
//! major; an unknown major is rejected with a typed error that points the
//! caller at migration.

use jsonschema::{Draft, JSONSchema};
use once_cell::sync::Lazy;
use serde_json::Value;

use crate::IoError;

pub const CURRENT_MAJOR: u64 = 1;
pub const CURRENT_VERSION: &str = "1.0";

/// Source of the current published schema.
pub const SCHEMA_1_0_SRC: &str = include_str!("../../../schemas/rpk-1.0.schema.json");

static SCHEMA_1_0: Lazy<JSONSchema> = Lazy::new(|| {
    let doc: Value =
        serde_json::from_str(SCHEMA_1_0_SRC).expect("embedded schema is valid JSON");
    JSONSchema::options()
        .with_draft(Draft::Draft202012)
        .compile(&doc)
        .expect("embedded schema compiles")
});

/// Parse `MAJOR.MINOR` out of an envelope version string.
pub fn parse_version(version: &str) -> Result<(u64, u64), IoError> {
    let (major, minor) = version.split_once('.').ok_or_else(|| bad_version(version))?;
    let major: u64 = major.parse().map_err(|_| bad_version(version))?;
    let minor: u64 = minor.parse().map_err(|_| bad_version(version))?;
    Ok((major, minor))
}

fn bad_version(version: &str) -> IoError {
    IoError::SchemaViolation {
        pointer: "/version".to_string(),
        msg: format!("version must be MAJOR.MINOR, got {version:?}"),
    }
}

/// Extract and check the envelope version, then validate the whole document
/// against the schema selected by it.
pub fn validate_envelope_value(value: &Value) -> Result<(), IoError> {
    let version = value
        .get("version")
        .and_then(Value::as_str)
        .ok_or_else(|| IoError::SchemaViolation {
            pointer: "/version".to_string(),
            msg: "missing or non-string version".to_string(),
        })?;
    let (major, _minor) = parse_version(version)?;
    if major != CURRENT_MAJOR {
        return Err(IoError::UnknownMajor {
            found: version.to_string(),
        });
    }
    // Any 1.y validates against the 1.0 schema; additive minors pass
    // because the schema keeps additionalProperties open.
    if let Err(errors) = SCHEMA_1_0.validate(value) {
        if let Some(first) = errors.into_iter().next() {
            return Err(IoError::SchemaViolation {
                pointer: first.instance_path.to_string(),
                msg: first.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_envelope() -> Value {
        json!({
            "version": "1.0",
            "metadata": {"run_id": "run-x", "created_at": "2026-01-01T00:00:00Z"},
            "payload": {"run": {
                "id": "run-x",
                "timestamp": "2026-01-01T00:00:00Z",
                "environment_fingerprint": {},
                "runtime_versions": {},
                "steps": []
            }},
            "checksum": format!("sha256:{}", "0".repeat(64))
        })
    }

    #[test]
    fn minimal_envelope_validates() {
        validate_envelope_value(&minimal_envelope()).unwrap();
    }

    #[test]
    fn unknown_minor_accepted() {
        let mut v = minimal_envelope();
        v["version"] = json!("1.7");
        v["minor_extension"] = json!({"anything": true});
        validate_envelope_value(&v).unwrap();
    }

    #[test]
    fn unknown_major_rejected() {
        let mut v = minimal_envelope();
        v["version"] = json!("2.0");
        let err = validate_envelope_value(&v).unwrap_err();
        assert_eq!(err.code(), "unknown_major");
    }

    #[test]
    fn missing_checksum_is_schema_violation() {
        let mut v = minimal_envelope();
        v.as_object_mut().unwrap().remove("checksum");
        let err = validate_envelope_value(&v).unwrap_err();
        assert_eq!(err.code(), "schema_violation");
    }

    #[test]
    fn bad_step_type_is_schema_violation() {
        let mut v = minimal_envelope();
        v["payload"]["run"]["steps"] = json!([{
            "id": "step-000001",
            "type": "model.stream",
            "input": null,
            "output": null,
            "metadata": {},
            "hash": format!("sha256:{}", "0".repeat(64))
        }]);
        let err = validate_envelope_value(&v).unwrap_err();
        assert_eq!(err.code(), "schema_violation");
    }

    #[test]
    fn version_parse_shapes() {
        assert_eq!(parse_version("1.0").unwrap(), (1, 0));
        assert_eq!(parse_version("0.9").unwrap(), (0, 9));
        assert!(parse_version("1").is_err());
        assert!(parse_version("one.zero").is_err());
    }
}
