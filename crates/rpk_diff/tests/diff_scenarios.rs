//! End-to-end diff scenarios over real artifacts.

use std::fs;

use serde_json::{json, Map};

use rpk_core::policy::{InterceptionPolicy, RedactionPolicy};
use rpk_capture::CaptureScope;
use rpk_diff::{diff_artifacts, DeltaKind, DiffOptions, StepStatus};

const CLOCK: &str = "2026-02-22T00:00:00Z";

/// Record a five-step run: steps 0..=3 are fixed, step 4 (the second model
/// response) carries `answer`.
fn record_run(path: &std::path::Path, answer: &str) {
    let scope = CaptureScope::open_at(
        CLOCK,
        Map::new(),
        InterceptionPolicy::default(),
        &RedactionPolicy::default(),
    )
    .unwrap();
    scope
        .record_prompt_render(json!({"template": "t"}), json!({"text": "rendered"}), json!({}))
        .unwrap();
    scope
        .record_model_call(
            json!({"messages": [{"role": "user", "content": "outline"}]}),
            json!({"text": "stable"}),
            json!({"model": "demo-model"}),
        )
        .unwrap();
    scope
        .record_model_call(
            json!({"messages": [{"role": "user", "content": "answer"}]}),
            json!({"assistant_message": answer}),
            json!({"model": "demo-model"}),
        )
        .unwrap();
    scope.close_and_write(path, None).unwrap();
}

#[test]
fn first_divergence_lands_on_the_changed_step() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.rpk");
    let b = dir.path().join("b.rpk");
    // Steps 0..=3 identical; step 4 (output.final) differs.
    record_run(&a, "answer one");
    record_run(&b, "answer two");

    let d = diff_artifacts(&a, &b, &DiffOptions::default()).unwrap();
    assert_eq!(d.entries.len(), 5);
    let fd = d.first_divergence.unwrap();
    assert_eq!(fd.index, 4);
    assert_eq!(fd.status, StepStatus::Changed);

    let entry = &d.entries[4];
    let delta = entry
        .deltas
        .iter()
        .find(|delta| delta.path == "/output/assistant_message")
        .expect("assistant_message delta present");
    assert_eq!(delta.kind, DeltaKind::Replaced);
    assert_json_diff::assert_json_eq!(
        serde_json::to_value(delta).unwrap(),
        json!({
            "path": "/output/assistant_message",
            "kind": "replaced",
            "before": "answer one",
            "after": "answer two"
        })
    );
}

#[test]
fn self_diff_of_an_artifact_is_clean() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.rpk");
    record_run(&a, "same");
    let d = diff_artifacts(&a, &a, &DiffOptions::default()).unwrap();
    assert!(d.is_identical());
    assert!(d.entries.iter().all(|e| e.status == StepStatus::Identical));
}

#[test]
fn locator_is_symmetric() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.rpk");
    let b = dir.path().join("b.rpk");
    record_run(&a, "x");
    record_run(&b, "y");
    let ab = diff_artifacts(&a, &b, &DiffOptions::default()).unwrap();
    let ba = diff_artifacts(&b, &a, &DiffOptions::default()).unwrap();
    assert_eq!(
        ab.first_divergence.unwrap().index,
        ba.first_divergence.unwrap().index
    );
}

#[test]
fn tampered_artifact_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.rpk");
    let b = dir.path().join("b.rpk");
    record_run(&a, "x");
    record_run(&b, "x");

    // Flip one payload byte on disk.
    let mut bytes = fs::read(&b).unwrap();
    let needle = b"stable";
    let pos = bytes
        .windows(needle.len())
        .position(|w| w == needle)
        .expect("payload text present");
    bytes[pos] = b'x';
    fs::write(&b, &bytes).unwrap();

    let err = diff_artifacts(&a, &b, &DiffOptions::default()).unwrap_err();
    assert_eq!(err.code(), "checksum_mismatch");
}
