//! Bundle: re-emit an artifact under a (stricter) redaction profile.
//!
//! The output is replay-compatible: step hashes are recomputed over the
//! masked content so the new artifact verifies as-is.

use std::path::Path;

use serde_json::Value;

use rpk_core::policy::RedactionPolicy;
use rpk_core::run::Run;
use rpk_io::envelope::{build_envelope, read_artifact, write_envelope};
use rpk_io::hasher::step_hash;
use rpk_io::signature::SigningKey;
use rpk_redact::RedactionEngine;

use crate::CaptureError;

/// Re-emit `source` with `policy` applied on top of the defaults.
pub fn bundle_artifact(
    source: &Path,
    out: &Path,
    policy: &RedactionPolicy,
    key: Option<&SigningKey>,
) -> Result<Run, CaptureError> {
    let engine = RedactionEngine::compile(policy)?;
    let envelope = read_artifact(source)?.envelope;
    let mut metadata = envelope.metadata;
    let mut run = envelope.payload.run;

    for step in &mut run.steps {
        step.input = engine.redact(&step.input);
        step.output = engine.redact(&step.output);
        step.metadata = engine.redact(&step.metadata);
        step.hash = step_hash(step.step_type, &step.input, &step.output, &step.metadata)?;
    }
    metadata.insert(
        "bundle_of".to_string(),
        Value::String(run.id.as_str().to_string()),
    );
    metadata.insert(
        "redaction_policy_version".to_string(),
        Value::String(engine.version().to_string()),
    );

    let envelope = build_envelope(run.clone(), metadata, key)?;
    write_envelope(out, &envelope)?;
    tracing::debug!(run_id = %run.id, "bundle written");
    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::CaptureScope;
    use rpk_core::policy::InterceptionPolicy;
    use serde_json::{json, Map};

    #[test]
    fn bundle_masks_and_stays_verifiable() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.rpk");
        let out = dir.path().join("b.rpk");

        let scope = CaptureScope::open_at(
            "2026-02-22T00:00:00Z",
            Map::new(),
            InterceptionPolicy::default(),
            &RedactionPolicy::default(),
        )
        .unwrap();
        scope
            .record_tool_call(
                json!({"tool": "mailer", "args": {"note": "release plan for ops@example.com"}}),
                json!({"ok": true}),
                json!({}),
            )
            .unwrap();
        scope.close_and_write(&src, None).unwrap();

        // Stricter profile: mask the whole args object by path.
        let policy = RedactionPolicy {
            version: "bundle-strict".to_string(),
            extra_sensitive_path_patterns: vec!["^/args$".to_string()],
            ..Default::default()
        };
        bundle_artifact(&src, &out, &policy, None).unwrap();

        let bundled = read_artifact(&out).unwrap();
        assert_eq!(
            bundled.run().steps[0].input["args"],
            json!(rpk_redact::REDACTED)
        );
        assert_eq!(
            bundled.envelope.metadata["redaction_policy_version"],
            json!("bundle-strict")
        );
        // Hashes verify against the masked content.
        let step = &bundled.run().steps[0];
        assert_eq!(
            step.hash,
            step_hash(step.step_type, &step.input, &step.output, &step.metadata).unwrap()
        );
    }
}
