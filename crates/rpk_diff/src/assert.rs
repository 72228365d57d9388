//! Assertion semantics over the diff: pass/fail, drift gates, and the
//! slowdown gate.

use serde::Serialize;
use serde_json::Value;

use rpk_core::run::Run;
use rpk_core::volatile::strip_volatile;

use crate::diff::{diff_runs, DiffOptions, DiffResult, FirstDivergence};

/// Metadata keys the slowdown gate reads, in lookup order.
const TIMING_KEYS: &[&str] = &["duration_ms", "latency_ms", "wall_time_ms", "elapsed_ms"];

#[derive(Clone, Debug)]
pub struct AssertOptions {
    /// Also fail on fingerprint/runtime mismatch and per-step metadata drift.
    pub strict: bool,
    /// Aggregate slowdown threshold in percent; `None` disables the gate.
    pub slowdown_threshold_pct: Option<f64>,
    pub max_changes_per_step: usize,
}

impl Default for AssertOptions {
    fn default() -> Self {
        Self {
            strict: false,
            slowdown_threshold_pct: None,
            max_changes_per_step: 32,
        }
    }
}

/// Run-level drift found by strict mode.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DriftReport {
    /// Keys whose values differ between the two `environment_fingerprint`s.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub environment_mismatches: Vec<String>,
    /// Keys whose values differ between the two `runtime_versions` maps.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub runtime_mismatches: Vec<String>,
    /// Steps whose raw metadata drifted while their hashes still matched
    /// (volatile-key drift; anything else already counts as divergence).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metadata_drift_steps: Vec<usize>,
}

impl DriftReport {
    pub fn is_empty(&self) -> bool {
        self.environment_mismatches.is_empty()
            && self.runtime_mismatches.is_empty()
            && self.metadata_drift_steps.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PerformanceReport {
    /// `ok`, `slowdown`, or `missing_metrics`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_ratio: Option<f64>,
    pub threshold_pct: f64,
    pub samples: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct AssertReport {
    /// `pass` or `fail`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_divergence: Option<FirstDivergence>,
    pub diff: DiffResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drift: Option<DriftReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<PerformanceReport>,
}

impl AssertReport {
    pub fn passed(&self) -> bool {
        self.status == "pass"
    }
}

/// Pass iff there is no divergence under the selected rules.
pub fn assert_run(baseline: &Run, candidate: &Run, opts: &AssertOptions) -> AssertReport {
    let diff = diff_runs(
        baseline,
        candidate,
        &DiffOptions {
            first_only: false,
            max_changes_per_step: opts.max_changes_per_step,
            strict: opts.strict,
        },
    );

    let mut failed = !diff.is_identical();

    let drift = if opts.strict {
        let report = collect_drift(baseline, candidate);
        if !report.is_empty() {
            failed = true;
        }
        Some(report)
    } else {
        None
    };

    let performance = opts
        .slowdown_threshold_pct
        .map(|threshold| slowdown_gate(baseline, candidate, threshold));
    if let Some(perf) = &performance {
        if perf.status != "ok" {
            failed = true;
        }
    }

    AssertReport {
        status: if failed { "fail" } else { "pass" }.to_string(),
        first_divergence: diff.first_divergence,
        diff,
        drift,
        performance,
    }
}

fn collect_drift(baseline: &Run, candidate: &Run) -> DriftReport {
    let mut report = DriftReport::default();

    let env_keys: std::collections::BTreeSet<&String> = baseline
        .environment_fingerprint
        .keys()
        .chain(candidate.environment_fingerprint.keys())
        .collect();
    for key in env_keys {
        if baseline.environment_fingerprint.get(key.as_str())
            != candidate.environment_fingerprint.get(key.as_str())
        {
            report.environment_mismatches.push(key.to_string());
        }
    }

    let rt_keys: std::collections::BTreeSet<&String> = baseline
        .runtime_versions
        .keys()
        .chain(candidate.runtime_versions.keys())
        .collect();
    for key in rt_keys {
        if baseline.runtime_versions.get(key.as_str())
            != candidate.runtime_versions.get(key.as_str())
        {
            report.runtime_mismatches.push(key.to_string());
        }
    }

    // Volatile-key drift: raw metadata differs while the hashable view
    // (and therefore the step hash) still matches.
    for (i, (b, c)) in baseline.steps.iter().zip(candidate.steps.iter()).enumerate() {
        if b.hash == c.hash
            && b.metadata != c.metadata
            && strip_volatile(&b.metadata) == strip_volatile(&c.metadata)
        {
            report.metadata_drift_steps.push(i);
        }
    }

    report
}

/// Per-step candidate/baseline timing ratios, aggregated as the mean.
fn slowdown_gate(baseline: &Run, candidate: &Run, threshold_pct: f64) -> PerformanceReport {
    let mut ratios = Vec::new();
    for (b, c) in baseline.steps.iter().zip(candidate.steps.iter()) {
        if let (Some(base), Some(cand)) = (timing_of(&b.metadata), timing_of(&c.metadata)) {
            if base > 0.0 {
                ratios.push(cand / base);
            }
        }
    }

    if ratios.is_empty() {
        return PerformanceReport {
            status: "missing_metrics".to_string(),
            mean_ratio: None,
            threshold_pct,
            samples: 0,
        };
    }

    let mean = ratios.iter().sum::<f64>() / ratios.len() as f64;
    let status = if (mean - 1.0) * 100.0 > threshold_pct {
        "slowdown"
    } else {
        "ok"
    };
    PerformanceReport {
        status: status.to_string(),
        mean_ratio: Some(mean),
        threshold_pct,
        samples: ratios.len(),
    }
}

fn timing_of(metadata: &Value) -> Option<f64> {
    TIMING_KEYS
        .iter()
        .find_map(|key| metadata.get(*key))
        .and_then(Value::as_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpk_core::ids::StepId;
    use rpk_core::step::{Step, StepType};
    use rpk_io::hasher::step_hash;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn step(index: u64, output: Value, metadata: Value) -> Step {
        let input = json!({});
        let hash = step_hash(StepType::ToolResponse, &input, &output, &metadata).unwrap();
        Step {
            id: StepId::from_index(index),
            step_type: StepType::ToolResponse,
            input,
            output,
            metadata,
            hash,
            extra: BTreeMap::new(),
        }
    }

    fn run(steps: Vec<Step>) -> Run {
        Run {
            id: "run-assert".parse().unwrap(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            environment_fingerprint: [("os".to_string(), json!("linux"))].into_iter().collect(),
            runtime_versions: [("replaykit".to_string(), "0.1.0".to_string())]
                .into_iter()
                .collect(),
            steps,
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn identical_runs_pass() {
        let r = run(vec![step(1, json!({"ok": true}), json!({}))]);
        let report = assert_run(&r, &r, &AssertOptions::default());
        assert!(report.passed());
        assert!(report.first_divergence.is_none());
    }

    #[test]
    fn divergence_fails_with_payload() {
        let a = run(vec![step(1, json!({"v": 1}), json!({}))]);
        let b = run(vec![step(1, json!({"v": 2}), json!({}))]);
        let report = assert_run(&a, &b, &AssertOptions::default());
        assert!(!report.passed());
        assert_eq!(report.first_divergence.unwrap().index, 0);
    }

    #[test]
    fn strict_flags_environment_drift() {
        let a = run(vec![]);
        let mut b = run(vec![]);
        b.environment_fingerprint
            .insert("os".to_string(), json!("macos"));
        let lax = assert_run(&a, &b, &AssertOptions::default());
        assert!(lax.passed());

        let strict = assert_run(
            &a,
            &b,
            &AssertOptions {
                strict: true,
                ..Default::default()
            },
        );
        assert!(!strict.passed());
        assert_eq!(
            strict.drift.unwrap().environment_mismatches,
            vec!["os".to_string()]
        );
    }

    #[test]
    fn strict_flags_volatile_metadata_drift() {
        let a = run(vec![step(1, json!({"ok": true}), json!({"duration_ms": 10}))]);
        let b = run(vec![step(1, json!({"ok": true}), json!({"duration_ms": 80}))]);
        let strict = assert_run(
            &a,
            &b,
            &AssertOptions {
                strict: true,
                ..Default::default()
            },
        );
        assert!(!strict.passed());
        assert_eq!(strict.drift.unwrap().metadata_drift_steps, vec![0]);
    }

    #[test]
    fn slowdown_gate_trips_over_threshold() {
        let a = run(vec![
            step(1, json!({"ok": true}), json!({"duration_ms": 100})),
            step(2, json!({"ok": true}), json!({"duration_ms": 100})),
        ]);
        let b = run(vec![
            step(1, json!({"ok": true}), json!({"duration_ms": 180})),
            step(2, json!({"ok": true}), json!({"duration_ms": 160})),
        ]);
        let report = assert_run(
            &a,
            &b,
            &AssertOptions {
                slowdown_threshold_pct: Some(50.0),
                ..Default::default()
            },
        );
        assert!(!report.passed());
        let perf = report.performance.unwrap();
        assert_eq!(perf.status, "slowdown");
        assert_eq!(perf.samples, 2);

        // Under the threshold the same comparison passes.
        let lenient = assert_run(
            &a,
            &b,
            &AssertOptions {
                slowdown_threshold_pct: Some(90.0),
                ..Default::default()
            },
        );
        assert!(lenient.passed());
        assert_eq!(lenient.performance.unwrap().status, "ok");
    }

    #[test]
    fn slowdown_gate_without_metrics_fails() {
        let a = run(vec![step(1, json!({"ok": true}), json!({}))]);
        let report = assert_run(
            &a,
            &a,
            &AssertOptions {
                slowdown_threshold_pct: Some(10.0),
                ..Default::default()
            },
        );
        assert!(!report.passed());
        assert_eq!(report.performance.unwrap().status, "missing_metrics");
    }
}
