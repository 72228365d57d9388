//! SHA-256 content addressing over **canonical JSON** bytes.
//!
//! Deterministic: same canonical structure ⇒ same lowercase 64-hex across
//! OS/arch. All digests carry the `sha256:` prefix via `Sha256Digest`.

use digest::Digest;
use serde_json::{Map, Value};
use sha2::Sha256;

use rpk_core::ids::Sha256Digest;
use rpk_core::step::StepType;
use rpk_core::volatile::strip_volatile;

use crate::canonical::to_canonical_bytes;
use crate::IoError;

/// Lowercase 64-hex SHA-256 of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// `sha256:`-prefixed digest of a value's canonical bytes.
pub fn digest_value(value: &Value) -> Result<Sha256Digest, IoError> {
    let bytes = to_canonical_bytes(value)?;
    Ok(Sha256Digest::from_hex(&sha256_hex(&bytes)).expect("sha256_hex emits 64 lowercase hex"))
}

/// Step hash: canonical bytes of `{input, metadata_hashable, output, type}`
/// where `metadata_hashable` is `metadata` with the volatile denylist removed
/// at all depths.
pub fn step_hash(
    step_type: StepType,
    input: &Value,
    output: &Value,
    metadata: &Value,
) -> Result<Sha256Digest, IoError> {
    let mut m = Map::new();
    m.insert("input".to_string(), input.clone());
    m.insert("metadata_hashable".to_string(), strip_volatile(metadata));
    m.insert("output".to_string(), output.clone());
    m.insert("type".to_string(), Value::String(step_type.as_str().to_string()));
    digest_value(&Value::Object(m))
}

/// Artifact checksum: canonical bytes of `{metadata, payload, version}`
/// (`checksum` and `signature` excluded by construction).
pub fn artifact_checksum(
    version: &str,
    metadata: &Value,
    payload: &Value,
) -> Result<Sha256Digest, IoError> {
    let mut m = Map::new();
    m.insert("metadata".to_string(), metadata.clone());
    m.insert("payload".to_string(), payload.clone());
    m.insert("version".to_string(), Value::String(version.to_string()));
    digest_value(&Value::Object(m))
}

/// Canonical bytes signed by the optional envelope MAC:
/// `{checksum, metadata, payload, version}`.
pub fn signing_input(
    version: &str,
    metadata: &Value,
    payload: &Value,
    checksum: &Sha256Digest,
) -> Result<Vec<u8>, IoError> {
    let mut m = Map::new();
    m.insert("checksum".to_string(), Value::String(checksum.as_str().to_string()));
    m.insert("metadata".to_string(), metadata.clone());
    m.insert("payload".to_string(), payload.clone());
    m.insert("version".to_string(), Value::String(version.to_string()));
    to_canonical_bytes(&Value::Object(m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_hash_ignores_volatile_metadata() {
        let input = json!({"prompt": "hi"});
        let output = json!({"assistant_message": "hello"});
        let quiet = json!({"model": "m1"});
        let noisy = json!({"model": "m1", "duration_ms": 812, "created_at": "2026-01-01T00:00:00Z"});

        let a = step_hash(StepType::ModelResponse, &input, &output, &quiet).unwrap();
        let b = step_hash(StepType::ModelResponse, &input, &output, &noisy).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn step_hash_sensitive_to_type_and_content() {
        let input = json!({"prompt": "hi"});
        let output = json!({"assistant_message": "hello"});
        let meta = json!({});

        let a = step_hash(StepType::ModelResponse, &input, &output, &meta).unwrap();
        let b = step_hash(StepType::ToolResponse, &input, &output, &meta).unwrap();
        let c = step_hash(
            StepType::ModelResponse,
            &input,
            &json!({"assistant_message": "hola"}),
            &meta,
        )
        .unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn checksum_is_stable_across_key_insertion_order() {
        let m1 = json!({"run_id": "r", "created_at": "t"});
        let m2 = json!({"created_at": "t", "run_id": "r"});
        let payload = json!({"run": {"steps": []}});
        assert_eq!(
            artifact_checksum("1.0", &m1, &payload).unwrap(),
            artifact_checksum("1.0", &m2, &payload).unwrap()
        );
    }
}
