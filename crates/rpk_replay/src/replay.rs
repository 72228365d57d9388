//! Stub and hybrid replay.
//!
//! Both modes read via `rpk_io`, rebuild the run deterministically from
//! `(source, seed, fixed_clock)`, and write a new artifact atomically. The
//! output file appears only after every check has passed; failures leave no
//! partial artifact behind.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use rpk_core::hooks::HookSet;
use rpk_core::ids::RunId;
use rpk_core::policy::{HybridReplayPolicy, NondeterminismMode, ReplayConfig};
use rpk_core::run::Run;
use rpk_core::step::{Step, StepType};
use rpk_io::envelope::{build_envelope, read_artifact, write_envelope};
use rpk_io::hasher::{sha256_hex, step_hash};
use rpk_io::signature::SigningKey;

use crate::guard::{self, guarded_fetch, OutboundAdapter};
use crate::nondet::{scan_run, NondetFinding};
use crate::ReplayError;

/// Inputs shared by both replay modes.
pub struct ReplayOptions {
    pub config: ReplayConfig,
    pub nondeterminism: NondeterminismMode,
    pub signing_key: Option<SigningKey>,
    pub hooks: Option<Arc<HookSet>>,
}

impl ReplayOptions {
    pub fn new(config: ReplayConfig) -> Self {
        Self {
            config,
            nondeterminism: NondeterminismMode::Off,
            signing_key: None,
            hooks: None,
        }
    }
}

/// What a completed replay produced.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplaySummary {
    pub run_id: RunId,
    pub replay_of: RunId,
    pub step_count: usize,
    pub findings: Vec<NondetFinding>,
}

/// Stub replay: re-emit recorded outputs unchanged under the pinned clock
/// and seed. Byte-identical output for identical `(source, seed,
/// fixed_clock)`.
///
/// `adapter` is the live-transport seam; replay itself never invokes real
/// side effects, so any adapter reaching for the network trips the guard
/// and aborts before a socket opens.
pub fn replay_stub(
    source: &Path,
    out: &Path,
    opts: &ReplayOptions,
    adapter: Option<&dyn OutboundAdapter>,
) -> Result<ReplaySummary, ReplayError> {
    let _guard = guard::install();

    let source_run = read_artifact(source)?.into_run();
    if let Some(hooks) = &opts.hooks {
        hooks.replay_start(source_run.id.as_str());
    }
    let findings = run_guardrail(&source_run, opts.nondeterminism)?;

    let mut steps = Vec::with_capacity(source_run.steps.len());
    for step in &source_run.steps {
        // A recorded response without an output would need a live call to
        // fill; under replay that path must die at the guard.
        if step.output.is_null() && step.step_type == StepType::ModelResponse {
            if let Some(adapter) = adapter {
                let url = stub_fetch_url(step);
                let fetched = guarded_fetch(adapter, &url)?;
                let mut filled = step.clone();
                filled.output = fetched;
                filled.hash = step_hash(
                    filled.step_type,
                    &filled.input,
                    &filled.output,
                    &filled.metadata,
                )?;
                steps.push(filled);
                continue;
            }
        }
        steps.push(step.clone());
    }

    write_replay(source_run, steps, out, opts, &findings, None)
}

/// Hybrid replay: substitute outputs from `rerun_from` for steps selected
/// by the policy; everything else stubs from the primary source.
pub fn replay_hybrid(
    source: &Path,
    rerun_from: &Path,
    out: &Path,
    opts: &ReplayOptions,
    policy: &HybridReplayPolicy,
) -> Result<ReplaySummary, ReplayError> {
    let _guard = guard::install();

    let source_run = read_artifact(source)?.into_run();
    let rerun_run = read_artifact(rerun_from)?.into_run();
    if let Some(hooks) = &opts.hooks {
        hooks.replay_start(source_run.id.as_str());
    }
    let findings = run_guardrail(&source_run, opts.nondeterminism)?;

    if policy.strict_alignment {
        if source_run.steps.len() != rerun_run.steps.len() {
            return Err(ReplayError::AlignmentMismatch {
                index: source_run.steps.len().min(rerun_run.steps.len()),
                detail: format!(
                    "step counts disagree: {} vs {}",
                    source_run.steps.len(),
                    rerun_run.steps.len()
                ),
            });
        }
        for (i, (a, b)) in source_run
            .steps
            .iter()
            .zip(rerun_run.steps.iter())
            .enumerate()
        {
            if a.step_type != b.step_type {
                return Err(ReplayError::AlignmentMismatch {
                    index: i,
                    detail: format!(
                        "step types disagree: {} vs {}",
                        a.step_type, b.step_type
                    ),
                });
            }
        }
    }

    let mut steps = Vec::with_capacity(source_run.steps.len());
    for (i, step) in source_run.steps.iter().enumerate() {
        if !policy.wants_rerun(&step.id, step.step_type) {
            steps.push(step.clone());
            continue;
        }
        let rerun_step = rerun_run.steps.get(i).ok_or_else(|| {
            ReplayError::AlignmentMismatch {
                index: i,
                detail: "rerun source has no step at this index".to_string(),
            }
        })?;
        let mut substituted = step.clone();
        substituted.output = rerun_step.output.clone();
        substituted.hash = step_hash(
            substituted.step_type,
            &substituted.input,
            &substituted.output,
            &substituted.metadata,
        )?;
        steps.push(substituted);
    }

    let rerun_id = rerun_run.id.clone();
    write_replay(source_run, steps, out, opts, &findings, Some(rerun_id))
}

/* ------------------------------ internals -------------------------------- */

fn run_guardrail(
    run: &Run,
    mode: NondeterminismMode,
) -> Result<Vec<NondetFinding>, ReplayError> {
    if mode == NondeterminismMode::Off {
        return Ok(Vec::new());
    }
    let findings = scan_run(run);
    match mode {
        NondeterminismMode::Fail if !findings.is_empty() => {
            Err(ReplayError::NondeterminismDetected(findings.len()))
        }
        _ => {
            for finding in &findings {
                tracing::warn!(
                    location = %finding.location,
                    key = %finding.key,
                    "nondeterminism indicator"
                );
            }
            Ok(findings)
        }
    }
}

/// Assemble the replay run and write the artifact. Everything observable is
/// a function of `(source, seed, fixed_clock)`.
fn write_replay(
    source_run: Run,
    steps: Vec<Step>,
    out: &Path,
    opts: &ReplayOptions,
    findings: &[NondetFinding],
    rerun_source: Option<RunId>,
) -> Result<ReplaySummary, ReplayError> {
    let replay_of = source_run.id.clone();
    let run_id = derive_replay_run_id(&replay_of, &opts.config)?;
    let step_count = steps.len();

    let run = Run {
        id: run_id.clone(),
        timestamp: opts.config.fixed_clock.clone(),
        environment_fingerprint: source_run.environment_fingerprint,
        runtime_versions: source_run.runtime_versions,
        steps,
        extra: source_run.extra,
    };

    let mut metadata = Map::new();
    metadata.insert(
        "replay_of".to_string(),
        Value::String(replay_of.as_str().to_string()),
    );
    metadata.insert("seed".to_string(), json!(opts.config.seed));
    metadata.insert(
        "fixed_clock".to_string(),
        Value::String(opts.config.fixed_clock.clone()),
    );
    if let Some(rerun) = &rerun_source {
        metadata.insert(
            "rerun_source".to_string(),
            Value::String(rerun.as_str().to_string()),
        );
    }
    if !findings.is_empty() {
        metadata.insert(
            "nondeterminism_findings".to_string(),
            serde_json::to_value(findings)
                .map_err(|e| rpk_io::IoError::MalformedPayload(e.to_string()))?,
        );
    }

    let envelope = build_envelope(run.clone(), metadata, opts.signing_key.as_ref())?;
    write_envelope(out, &envelope)?;
    tracing::debug!(run_id = %run.id, steps = step_count, "replay artifact written");
    if let Some(hooks) = &opts.hooks {
        hooks.replay_end(&run);
    }

    Ok(ReplaySummary {
        run_id,
        replay_of,
        step_count,
        findings: findings.to_vec(),
    })
}

/// `run-<compact fixed_clock>-<hex8>` where the digest covers
/// `{source_run_id, seed, fixed_clock}`.
fn derive_replay_run_id(
    source_run_id: &RunId,
    config: &ReplayConfig,
) -> Result<RunId, ReplayError> {
    let doc = json!({
        "fixed_clock": config.fixed_clock,
        "seed": config.seed,
        "source_run_id": source_run_id.as_str(),
    });
    let bytes = rpk_io::canonical::to_canonical_bytes(&doc)?;
    let digest = sha256_hex(&bytes);
    let compact: String = config
        .fixed_clock
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    Ok(RunId::derive(&compact, &digest[..8]))
}

/// Where a missing model response would have been fetched from.
fn stub_fetch_url(step: &Step) -> String {
    step.metadata
        .get("url")
        .or_else(|| step.input.get("url"))
        .and_then(Value::as_str)
        .unwrap_or("https://model.invalid/v1/complete")
        .to_string()
}
