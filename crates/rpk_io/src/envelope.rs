//! The on-disk artifact envelope: build, write, read, verify.
//!
//! Write path: build envelope → compute checksum → optionally sign → emit
//! canonical JSON bytes → atomic replace. Read path: strict parse →
//! structural validation → checksum verify → signature verify (per policy)
//! → typed `Run`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use rpk_core::ids::Sha256Digest;
use rpk_core::run::Run;

use crate::canonical::{parse_strict, to_canonical_bytes, write_bytes_atomic};
use crate::hasher::artifact_checksum;
use crate::schema::{validate_envelope_value, CURRENT_VERSION};
use crate::signature::{sign, verify, Signature, SigningKey};
use crate::IoError;

/// Conventional artifact extension.
pub const ARTIFACT_EXTENSION: &str = "rpk";

/// Envelope payload; `run` is the only member today, additive fields ride
/// along untyped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub run: Run,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// The on-disk container.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: String,
    pub metadata: Map<String, Value>,
    pub payload: Payload,
    pub checksum: Sha256Digest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

/// A read, verified artifact.
#[derive(Clone, Debug, PartialEq)]
pub struct Artifact {
    pub envelope: Envelope,
}

impl Artifact {
    pub fn run(&self) -> &Run {
        &self.envelope.payload.run
    }

    pub fn into_run(self) -> Run {
        self.envelope.payload.run
    }

    pub fn version(&self) -> &str {
        &self.envelope.version
    }
}

/// Signature handling on read.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SignaturePolicy {
    /// Ignore signatures entirely.
    Skip,
    /// Verify when both a signature and a key are available.
    #[default]
    IfPresent,
    /// Demand a signature and a key; fail otherwise.
    Require,
}

#[derive(Debug, Default)]
pub struct ReadOptions {
    pub signature: SignaturePolicy,
    pub key: Option<SigningKey>,
}

/// Build an envelope around a finalized run: stamp metadata, compute the
/// checksum, optionally sign.
pub fn build_envelope(
    run: Run,
    extra_metadata: Map<String, Value>,
    key: Option<&SigningKey>,
) -> Result<Envelope, IoError> {
    let mut metadata = Map::new();
    metadata.insert(
        "run_id".to_string(),
        Value::String(run.id.as_str().to_string()),
    );
    metadata.insert(
        "created_at".to_string(),
        Value::String(run.timestamp.clone()),
    );
    for (k, v) in extra_metadata {
        metadata.entry(k).or_insert(v);
    }

    let payload = Payload {
        run,
        extra: BTreeMap::new(),
    };
    let metadata_value = Value::Object(metadata.clone());
    let payload_value =
        serde_json::to_value(&payload).map_err(|e| IoError::MalformedPayload(e.to_string()))?;
    let checksum = artifact_checksum(CURRENT_VERSION, &metadata_value, &payload_value)?;
    let signature = match key {
        Some(k) => Some(sign(
            CURRENT_VERSION,
            &metadata_value,
            &payload_value,
            &checksum,
            k,
        )?),
        None => None,
    };

    Ok(Envelope {
        version: CURRENT_VERSION.to_string(),
        metadata,
        payload,
        checksum,
        signature,
    })
}

/// Emit canonical bytes and replace `path` atomically.
pub fn write_envelope(path: &Path, envelope: &Envelope) -> Result<(), IoError> {
    let value =
        serde_json::to_value(envelope).map_err(|e| IoError::MalformedPayload(e.to_string()))?;
    let bytes = to_canonical_bytes(&value)?;
    write_bytes_atomic(path, &bytes)
}

/// Read and fully verify an artifact with default options.
pub fn read_artifact(path: &Path) -> Result<Artifact, IoError> {
    read_artifact_with(path, &ReadOptions::default())
}

/// Read and fully verify an artifact.
pub fn read_artifact_with(path: &Path, opts: &ReadOptions) -> Result<Artifact, IoError> {
    let bytes = fs::read(path)
        .map_err(|e| IoError::Path(format!("cannot read {}: {e}", path.display())))?;
    let value = parse_strict(&bytes)?;
    let envelope = verify_envelope_value(&value, opts)?;
    Ok(Artifact { envelope })
}

/// Verification order: schema shape → checksum → signature. Shared with the
/// migration reader, which re-enters with an already parsed document.
pub(crate) fn verify_envelope_value(
    value: &Value,
    opts: &ReadOptions,
) -> Result<Envelope, IoError> {
    validate_envelope_value(value)?;

    // Shapes below are guaranteed by the schema.
    let version = value["version"].as_str().unwrap_or_default().to_string();
    let stored = value["checksum"].as_str().unwrap_or_default();
    let computed = artifact_checksum(&version, &value["metadata"], &value["payload"])?;
    if stored != computed.as_str() {
        return Err(IoError::ChecksumMismatch {
            stored: stored.to_string(),
            computed: computed.as_str().to_string(),
        });
    }

    let signature_value = value.get("signature");
    match opts.signature {
        SignaturePolicy::Skip => {}
        SignaturePolicy::IfPresent | SignaturePolicy::Require => {
            let signature: Option<Signature> = match signature_value {
                Some(sv) => Some(
                    serde_json::from_value(sv.clone())
                        .map_err(|e| IoError::MalformedPayload(e.to_string()))?,
                ),
                None => None,
            };
            match (signature, &opts.key, opts.signature) {
                (None, _, SignaturePolicy::Require) => return Err(IoError::SignatureMissing),
                (Some(_), None, SignaturePolicy::Require) => return Err(IoError::KeyMissing),
                (Some(sig), Some(key), _) => verify(
                    &version,
                    &value["metadata"],
                    &value["payload"],
                    &computed,
                    &sig,
                    key,
                )?,
                // Signed artifact, unkeyed reader, verification not demanded.
                _ => {}
            }
        }
    }

    serde_json::from_value(value.clone()).map_err(|e| IoError::MalformedPayload(e.to_string()))
}
