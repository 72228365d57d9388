//! Schema migration: prior majors → the current published schema.
//!
//! Supported transitions: `0.9 → 1.0` (field mapping) and `1.y → 1.0`
//! (canonical rewrite). Every step hash is recomputed from canonical
//! content; hashes that already matched are counted as preserved.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use rpk_core::ids::{RunId, StepId};
use rpk_core::run::Run;
use rpk_core::step::{Step, StepType};

use crate::canonical::parse_strict;
use crate::envelope::{build_envelope, verify_envelope_value, write_envelope, ReadOptions};
use crate::hasher::step_hash;
use crate::schema::{parse_version, CURRENT_VERSION};
use crate::signature::SigningKey;
use crate::IoError;

/// Outcome summary emitted next to the migrated artifact.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MigrationSummary {
    pub status: String,
    pub source_version: String,
    pub target_version: String,
    pub migration_status: String,
    pub preserved_step_hashes: u64,
    pub recomputed_step_hashes: u64,
}

/// Migrate `source` to the current schema, writing the result to `out`.
pub fn migrate_artifact(
    source: &Path,
    out: &Path,
    key: Option<&SigningKey>,
) -> Result<MigrationSummary, IoError> {
    let bytes = fs::read(source)
        .map_err(|e| IoError::Path(format!("cannot read {}: {e}", source.display())))?;
    let value = parse_strict(&bytes).map_err(|e| match e {
        IoError::InvalidJson(msg) => IoError::MalformedPayload(msg),
        other => other,
    })?;

    let version = value
        .get("version")
        .and_then(Value::as_str)
        .ok_or_else(|| IoError::MalformedPayload("missing envelope version".to_string()))?
        .to_string();
    let (major, _minor) = parse_version(&version)
        .map_err(|_| IoError::UnsupportedVersion(version.clone()))?;

    let (run, metadata, migration_status) = match (major, version.as_str()) {
        (0, "0.9") => {
            let (run, metadata) = read_legacy_0_9(&value)?;
            (run, metadata, "migrated")
        }
        (1, _) => {
            let envelope = verify_envelope_value(&value, &ReadOptions::default())?;
            (envelope.payload.run, envelope.metadata, "rewritten")
        }
        _ => return Err(IoError::UnsupportedVersion(version)),
    };

    let (run, preserved, recomputed) = rehash_steps(run)?;

    let mut extra_metadata = metadata;
    extra_metadata.insert(
        "migrated_from".to_string(),
        Value::String(version.clone()),
    );
    let envelope = build_envelope(run, extra_metadata, key)?;
    write_envelope(out, &envelope)?;

    Ok(MigrationSummary {
        status: "ok".to_string(),
        source_version: version,
        target_version: CURRENT_VERSION.to_string(),
        migration_status: migration_status.to_string(),
        preserved_step_hashes: preserved,
        recomputed_step_hashes: recomputed,
    })
}

/// Recompute every step hash; count sources that already matched.
fn rehash_steps(mut run: Run) -> Result<(Run, u64, u64), IoError> {
    let mut preserved = 0u64;
    let mut recomputed = 0u64;
    for step in &mut run.steps {
        let fresh = step_hash(step.step_type, &step.input, &step.output, &step.metadata)
            .map_err(|e| IoError::RecomputeFailed {
                step_id: step.id.as_str().to_string(),
                msg: e.to_string(),
            })?;
        if fresh == step.hash {
            preserved += 1;
        } else {
            recomputed += 1;
            step.hash = fresh;
        }
    }
    Ok((run, preserved, recomputed))
}

/* ------------------------------ 0.9 reader ------------------------------- */

// 0.9 wire shape, accepted permissively: unknown fields ride along into the
// current model, absent optionals default.
#[derive(Deserialize)]
struct LegacyEnvelope {
    #[allow(dead_code)]
    version: String,
    #[serde(default)]
    metadata: Map<String, Value>,
    payload: LegacyPayload,
    // 0.9 used the same checksum scheme over its own field names; verified
    // against the unmapped document when present.
    #[serde(default)]
    checksum: Option<String>,
}

#[derive(Deserialize)]
struct LegacyPayload {
    run: LegacyRun,
}

#[derive(Deserialize)]
struct LegacyRun {
    id: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    env_fingerprint: BTreeMap<String, Value>,
    #[serde(default)]
    runtime: BTreeMap<String, String>,
    #[serde(default)]
    steps: Vec<LegacyStep>,
}

#[derive(Deserialize)]
struct LegacyStep {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    step_type: String,
    #[serde(default)]
    request: Value,
    #[serde(default)]
    response: Value,
    #[serde(default)]
    metadata: Value,
    #[serde(default)]
    step_hash: Option<String>,
}

fn read_legacy_0_9(value: &Value) -> Result<(Run, Map<String, Value>), IoError> {
    let legacy: LegacyEnvelope = serde_json::from_value(value.clone())
        .map_err(|e| IoError::MalformedPayload(e.to_string()))?;

    if let Some(stored) = legacy.checksum.as_deref() {
        let computed = crate::hasher::artifact_checksum(
            "0.9",
            value.get("metadata").unwrap_or(&Value::Null),
            value.get("payload").unwrap_or(&Value::Null),
        )?;
        if stored != computed.as_str() {
            return Err(IoError::ChecksumMismatch {
                stored: stored.to_string(),
                computed: computed.as_str().to_string(),
            });
        }
    }

    let run_id: RunId = legacy
        .payload
        .run
        .id
        .parse()
        .map_err(|_| IoError::MalformedPayload(format!("bad run id {:?}", legacy.payload.run.id)))?;
    let timestamp = legacy
        .payload
        .run
        .timestamp
        .or_else(|| {
            legacy
                .metadata
                .get("created_at")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .ok_or_else(|| IoError::MalformedPayload("missing run timestamp".to_string()))?;

    let mut steps = Vec::with_capacity(legacy.payload.run.steps.len());
    for (i, legacy_step) in legacy.payload.run.steps.into_iter().enumerate() {
        let step_type: StepType = legacy_step.step_type.parse().map_err(|_| {
            IoError::MalformedPayload(format!("bad step type {:?}", legacy_step.step_type))
        })?;
        let id = match legacy_step.id.as_deref() {
            Some(raw) => raw
                .parse()
                .unwrap_or_else(|_| StepId::from_index(i as u64 + 1)),
            None => StepId::from_index(i as u64 + 1),
        };
        let metadata = match legacy_step.metadata {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        // Carry the source hash through; rehash_steps decides preserved vs
        // recomputed against canonical content.
        let hash = match legacy_step.step_hash.as_deref() {
            Some(h) => h.parse().map_err(|_| {
                IoError::MalformedPayload(format!("bad step hash {h:?}"))
            })?,
            None => step_hash(step_type, &legacy_step.request, &legacy_step.response, &metadata)?,
        };
        steps.push(Step {
            id,
            step_type,
            input: legacy_step.request,
            output: legacy_step.response,
            metadata,
            hash,
            extra: BTreeMap::new(),
        });
    }

    let run = Run {
        id: run_id,
        timestamp,
        environment_fingerprint: legacy.payload.run.env_fingerprint,
        runtime_versions: legacy.payload.run.runtime,
        steps,
        extra: BTreeMap::new(),
    };
    Ok((run, legacy.metadata))
}
