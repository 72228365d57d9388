//! End-to-end replay scenarios: determinism, hybrid substitution, the
//! offline guard, and nondeterminism guardrails.

use std::collections::BTreeSet;
use std::fs;
use std::net::TcpStream;
use std::path::Path;

use serde_json::{json, Map, Value};

use rpk_core::policy::{
    HybridReplayPolicy, InterceptionPolicy, NondeterminismMode, RedactionPolicy, ReplayConfig,
};
use rpk_core::step::StepType;
use rpk_capture::demo::record_demo;
use rpk_capture::CaptureScope;
use rpk_io::envelope::read_artifact;
use rpk_replay::guard::OutboundAdapter;
use rpk_replay::{replay_hybrid, replay_stub, ReplayError, ReplayOptions};

const CLOCK: &str = "2026-02-22T00:00:00Z";

fn opts(seed: u64) -> ReplayOptions {
    ReplayOptions::new(ReplayConfig {
        seed,
        fixed_clock: CLOCK.to_string(),
    })
}

#[test]
fn replay_is_byte_identical_for_identical_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.rpk");
    let b = dir.path().join("b.rpk");
    let c = dir.path().join("c.rpk");
    record_demo(&a, 7, Some(CLOCK), None).unwrap();

    let s1 = replay_stub(&a, &b, &opts(7), None).unwrap();
    let s2 = replay_stub(&a, &c, &opts(7), None).unwrap();

    assert_eq!(fs::read(&b).unwrap(), fs::read(&c).unwrap());
    assert_eq!(s1.run_id, s2.run_id);
    assert_eq!(s1.replay_of.as_str(), read_artifact(&a).unwrap().run().id.as_str());

    // The replay artifact itself verifies end to end.
    let replayed = read_artifact(&b).unwrap();
    assert_eq!(replayed.envelope.metadata["replay_of"], json!(s1.replay_of.as_str()));
    assert_eq!(replayed.envelope.metadata["seed"], json!(7));
    assert_eq!(replayed.run().timestamp, CLOCK);
}

#[test]
fn replay_changes_with_seed_but_stays_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.rpk");
    record_demo(&a, 7, Some(CLOCK), None).unwrap();

    let b = dir.path().join("b.rpk");
    let c = dir.path().join("c.rpk");
    let s_b = replay_stub(&a, &b, &opts(7), None).unwrap();
    let s_c = replay_stub(&a, &c, &opts(8), None).unwrap();
    // Different seed → different derived run id → different bytes.
    assert_ne!(s_b.run_id, s_c.run_id);
    assert_ne!(fs::read(&b).unwrap(), fs::read(&c).unwrap());
}

/// A transport that would open a real socket if the guard let it through.
struct MisWiredAdapter;

impl OutboundAdapter for MisWiredAdapter {
    fn fetch(&self, _url: &str) -> Result<Value, ReplayError> {
        // Never reached under replay: the guard rejects first. If it ever
        // were reached, the connect attempt would surface as a test failure.
        let _ = TcpStream::connect("203.0.113.1:443");
        panic!("outbound adapter invoked during offline replay");
    }
}

fn record_run_with_missing_response(path: &Path) {
    let scope = CaptureScope::open_at(
        CLOCK,
        Map::new(),
        InterceptionPolicy::default(),
        &RedactionPolicy::default(),
    )
    .unwrap();
    // A model.response with no recorded output: the stub references a
    // response that only a live call could produce.
    scope
        .record_model_call(
            json!({"messages": [{"role": "user", "content": "hi"}]}),
            Value::Null,
            json!({"model": "demo-model", "url": "https://api.model.example/v1"}),
        )
        .unwrap();
    scope.close_and_write(path, None).unwrap();
}

#[test]
fn miswired_adapter_is_blocked_and_no_output_is_produced() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.rpk");
    let out = dir.path().join("b.rpk");
    record_run_with_missing_response(&a);

    let err = replay_stub(&a, &out, &opts(7), Some(&MisWiredAdapter)).unwrap_err();
    assert_eq!(err.code(), "network_attempt_blocked");
    match err {
        ReplayError::NetworkAttemptBlocked { host } => {
            assert_eq!(host, "api.model.example")
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!out.exists(), "failed replay must not leave an artifact");
}

#[test]
fn missing_response_without_adapter_stubs_through() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.rpk");
    let out = dir.path().join("b.rpk");
    record_run_with_missing_response(&a);

    replay_stub(&a, &out, &opts(7), None).unwrap();
    let replayed = read_artifact(&out).unwrap();
    assert!(replayed.run().steps[1].output.is_null());
}

fn two_runs_differing_at_final_output(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let mk = |path: &Path, answer: &str| {
        let scope = CaptureScope::open_at(
            CLOCK,
            Map::new(),
            InterceptionPolicy::default(),
            &RedactionPolicy::default(),
        )
        .unwrap();
        scope
            .record_model_call(
                json!({"messages": [{"role": "user", "content": "q"}]}),
                json!({"assistant_message": answer}),
                json!({"model": "demo-model"}),
            )
            .unwrap();
        scope
            .record_final_output(json!({"assistant_message": answer}), json!({}))
            .unwrap();
        scope.close_and_write(path, None).unwrap();
    };
    let a = dir.join("primary.rpk");
    let b = dir.join("rerun.rpk");
    mk(&a, "first answer");
    mk(&b, "second answer");
    (a, b)
}

#[test]
fn hybrid_substitutes_selected_step_types() {
    let dir = tempfile::tempdir().unwrap();
    let (primary, rerun) = two_runs_differing_at_final_output(dir.path());
    let out = dir.path().join("hybrid.rpk");

    let policy = HybridReplayPolicy {
        rerun_step_types: [StepType::ModelResponse].into_iter().collect::<BTreeSet<_>>(),
        ..Default::default()
    };
    replay_hybrid(&primary, &rerun, &out, &opts(7), &policy).unwrap();

    let run = read_artifact(&out).unwrap().into_run();
    // model.response came from the rerun source, output.final from primary.
    assert_eq!(
        run.steps[1].output["assistant_message"],
        json!("second answer")
    );
    assert_eq!(
        run.steps[2].output["assistant_message"],
        json!("first answer")
    );
    // Substituted steps re-hash over the new content.
    let step = &run.steps[1];
    let expected = rpk_io::hasher::step_hash(
        step.step_type,
        &step.input,
        &step.output,
        &step.metadata,
    )
    .unwrap();
    assert_eq!(step.hash, expected);
}

#[test]
fn hybrid_substitutes_selected_step_ids() {
    let dir = tempfile::tempdir().unwrap();
    let (primary, rerun) = two_runs_differing_at_final_output(dir.path());
    let out = dir.path().join("hybrid.rpk");

    let policy = HybridReplayPolicy {
        rerun_step_ids: ["step-000003".parse().unwrap()].into_iter().collect(),
        ..Default::default()
    };
    replay_hybrid(&primary, &rerun, &out, &opts(7), &policy).unwrap();

    let run = read_artifact(&out).unwrap().into_run();
    assert_eq!(
        run.steps[2].output["assistant_message"],
        json!("second answer")
    );
}

#[test]
fn strict_alignment_rejects_count_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let (primary, _) = two_runs_differing_at_final_output(dir.path());

    // A rerun source with a different shape.
    let rerun = dir.path().join("short.rpk");
    let scope = CaptureScope::open_at(
        CLOCK,
        Map::new(),
        InterceptionPolicy::default(),
        &RedactionPolicy::default(),
    )
    .unwrap();
    scope
        .record_final_output(json!({"assistant_message": "only"}), json!({}))
        .unwrap();
    scope.close_and_write(&rerun, None).unwrap();

    let out = dir.path().join("hybrid.rpk");
    let policy = HybridReplayPolicy {
        rerun_step_types: [StepType::ModelResponse].into_iter().collect::<BTreeSet<_>>(),
        strict_alignment: true,
        ..Default::default()
    };
    let err = replay_hybrid(&primary, &rerun, &out, &opts(7), &policy).unwrap_err();
    assert_eq!(err.code(), "hybrid_alignment_mismatch");
    assert!(!out.exists());
}

#[test]
fn redacted_artifact_replays_byte_identically() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.rpk");
    let scope = CaptureScope::open_at(
        CLOCK,
        Map::new(),
        InterceptionPolicy::default(),
        &RedactionPolicy::default(),
    )
    .unwrap();
    scope
        .record_model_call(
            json!({"messages": [{"role": "user", "content": "hi"}]}),
            json!({"assistant_message": "hello"}),
            json!({"model": "demo-model", "authorization": "Bearer sk-ABCDEFGH12345678"}),
        )
        .unwrap();
    scope.close_and_write(&a, None).unwrap();

    // The secret never reaches disk; the masked literal does.
    let raw = fs::read_to_string(&a).unwrap();
    assert!(!raw.contains("sk-ABCDEFGH12345678"));
    assert!(raw.contains("[REDACTED]"));

    // Replay of the redacted artifact succeeds and is reproducible.
    let b = dir.path().join("b.rpk");
    let c = dir.path().join("c.rpk");
    replay_stub(&a, &b, &opts(7), None).unwrap();
    replay_stub(&a, &c, &opts(7), None).unwrap();
    assert_eq!(fs::read(&b).unwrap(), fs::read(&c).unwrap());
    assert!(!fs::read_to_string(&b).unwrap().contains("sk-ABCDEFGH12345678"));
}

#[test]
fn nondeterminism_fail_aborts_warn_records() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.rpk");
    let scope = CaptureScope::open_at(
        CLOCK,
        Map::new(),
        InterceptionPolicy::default(),
        &RedactionPolicy::default(),
    )
    .unwrap();
    scope
        .record_tool_call(
            json!({"tool": "sampler"}),
            json!({"value": 4}),
            json!({"rng_source": "os"}),
        )
        .unwrap();
    scope.close_and_write(&a, None).unwrap();

    let out = dir.path().join("fail.rpk");
    let mut o = opts(7);
    o.nondeterminism = NondeterminismMode::Fail;
    let err = replay_stub(&a, &out, &o, None).unwrap_err();
    assert_eq!(err.code(), "nondeterminism_detected");
    assert!(!out.exists());

    let out = dir.path().join("warn.rpk");
    let mut o = opts(7);
    o.nondeterminism = NondeterminismMode::Warn;
    let summary = replay_stub(&a, &out, &o, None).unwrap();
    assert_eq!(summary.findings.len(), 1);
    let replayed = read_artifact(&out).unwrap();
    assert!(replayed
        .envelope
        .metadata
        .contains_key("nondeterminism_findings"));
}
