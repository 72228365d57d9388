//! The linear step-index diff.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use rpk_core::hooks::HookSet;
use rpk_core::ids::StepId;
use rpk_core::run::Run;
use rpk_core::step::{Step, StepType};
use rpk_core::volatile::strip_volatile;
use rpk_io::envelope::read_artifact;

use crate::DiffError;

/// Per-index classification.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Identical,
    MissingLeft,
    MissingRight,
    Changed,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaKind {
    Added,
    Removed,
    Replaced,
}

/// One field-level difference inside a changed step.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldDelta {
    /// JSON pointer rooted at `/input`, `/output`, or `/metadata`.
    pub path: String,
    pub kind: DeltaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
}

/// High-signal fields extracted for human-readable output.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StepContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<Value>,
}

impl StepContext {
    fn extract(primary: Option<&Step>, secondary: Option<&Step>) -> Self {
        let mut ctx = StepContext::default();
        for step in [primary, secondary].into_iter().flatten() {
            for source in [&step.metadata, &step.input] {
                ctx.model = ctx.model.take().or_else(|| pick(source, "model"));
                ctx.provider = ctx.provider.take().or_else(|| pick(source, "provider"));
                ctx.tool = ctx.tool.take().or_else(|| pick(source, "tool"));
                ctx.method = ctx.method.take().or_else(|| pick(source, "method"));
                ctx.url = ctx.url.take().or_else(|| pick(source, "url"));
                ctx.temperature = ctx.temperature.take().or_else(|| pick(source, "temperature"));
                ctx.max_tokens = ctx.max_tokens.take().or_else(|| pick(source, "max_tokens"));
            }
        }
        ctx
    }

    pub fn is_empty(&self) -> bool {
        self.model.is_none()
            && self.provider.is_none()
            && self.tool.is_none()
            && self.method.is_none()
            && self.url.is_none()
            && self.temperature.is_none()
            && self.max_tokens.is_none()
    }
}

fn pick(source: &Value, key: &str) -> Option<Value> {
    source.get(key).cloned()
}

/// One compared index.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DiffEntry {
    pub index: usize,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_id: Option<StepId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_id: Option<StepId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_type: Option<StepType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_type: Option<StepType>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deltas: Vec<FieldDelta>,
    /// True when the per-step delta cap cut the list short.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deltas_truncated: bool,
    #[serde(skip_serializing_if = "StepContext::is_empty")]
    pub context: StepContext,
}

/// Root-cause pointer: the smallest non-identical index.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct FirstDivergence {
    pub index: usize,
    pub status: StepStatus,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DiffResult {
    pub left_run_id: String,
    pub right_run_id: String,
    pub entries: Vec<DiffEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_divergence: Option<FirstDivergence>,
    pub identical: usize,
    pub changed: usize,
    pub missing_left: usize,
    pub missing_right: usize,
}

impl DiffResult {
    pub fn is_identical(&self) -> bool {
        self.first_divergence.is_none()
    }
}

#[derive(Clone, Debug)]
pub struct DiffOptions {
    /// Stop scanning after the first divergence (its entry is still emitted).
    pub first_only: bool,
    /// Field-delta cap per changed step.
    pub max_changes_per_step: usize,
    /// Compare volatile (denylisted) metadata keys too.
    pub strict: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            first_only: false,
            max_changes_per_step: 32,
            strict: false,
        }
    }
}

/// Pure single-pass diff over step indices.
pub fn diff_runs(left: &Run, right: &Run, opts: &DiffOptions) -> DiffResult {
    diff_runs_with_hooks(left, right, opts, None)
}

pub fn diff_runs_with_hooks(
    left: &Run,
    right: &Run,
    opts: &DiffOptions,
    hooks: Option<&HookSet>,
) -> DiffResult {
    if let Some(hooks) = hooks {
        hooks.diff_start(left.id.as_str(), right.id.as_str());
    }

    let max = left.steps.len().max(right.steps.len());
    let mut entries = Vec::with_capacity(max);
    let mut first_divergence = None;
    let (mut identical, mut changed, mut missing_left, mut missing_right) = (0, 0, 0, 0);

    for index in 0..max {
        let l = left.steps.get(index);
        let r = right.steps.get(index);
        let entry = classify(index, l, r, opts);
        match entry.status {
            StepStatus::Identical => identical += 1,
            StepStatus::Changed => changed += 1,
            StepStatus::MissingLeft => missing_left += 1,
            StepStatus::MissingRight => missing_right += 1,
        }
        let diverged = entry.status != StepStatus::Identical;
        if diverged && first_divergence.is_none() {
            first_divergence = Some(FirstDivergence {
                index,
                status: entry.status,
            });
        }
        entries.push(entry);
        if diverged && opts.first_only {
            break;
        }
    }

    if let Some(hooks) = hooks {
        hooks.diff_end(entries.len());
    }

    DiffResult {
        left_run_id: left.id.as_str().to_string(),
        right_run_id: right.id.as_str().to_string(),
        entries,
        first_divergence,
        identical,
        changed,
        missing_left,
        missing_right,
    }
}

/// Read, verify, and diff two artifacts. Refuses to run against an artifact
/// that fails integrity checks.
pub fn diff_artifacts(
    left: &Path,
    right: &Path,
    opts: &DiffOptions,
) -> Result<DiffResult, DiffError> {
    let left_run = read_artifact(left)?.into_run();
    let right_run = read_artifact(right)?.into_run();
    Ok(diff_runs(&left_run, &right_run, opts))
}

/* ------------------------------ internals -------------------------------- */

fn classify(
    index: usize,
    left: Option<&Step>,
    right: Option<&Step>,
    opts: &DiffOptions,
) -> DiffEntry {
    let status = match (left, right) {
        (Some(l), Some(r)) => {
            if l.step_type == r.step_type && l.hash == r.hash {
                StepStatus::Identical
            } else {
                StepStatus::Changed
            }
        }
        (Some(_), None) => StepStatus::MissingRight,
        (None, Some(_)) => StepStatus::MissingLeft,
        (None, None) => unreachable!("index bounded by max(len, len)"),
    };

    let mut deltas = Vec::new();
    let mut truncated = false;
    if let (StepStatus::Changed, Some(l), Some(r)) = (status, left, right) {
        let mut budget = Budget {
            out: &mut deltas,
            cap: opts.max_changes_per_step,
            truncated: &mut truncated,
        };
        collect_deltas("/input", &l.input, &r.input, &mut budget);
        collect_deltas("/output", &l.output, &r.output, &mut budget);
        if opts.strict {
            collect_deltas("/metadata", &l.metadata, &r.metadata, &mut budget);
        } else {
            // Non-semantic keys (the hashing denylist) are ignored.
            collect_deltas(
                "/metadata",
                &strip_volatile(&l.metadata),
                &strip_volatile(&r.metadata),
                &mut budget,
            );
        }
    }

    DiffEntry {
        index,
        status,
        left_id: left.map(|s| s.id.clone()),
        right_id: right.map(|s| s.id.clone()),
        left_type: left.map(|s| s.step_type),
        right_type: right.map(|s| s.step_type),
        deltas,
        deltas_truncated: truncated,
        context: StepContext::extract(left, right),
    }
}

struct Budget<'a> {
    out: &'a mut Vec<FieldDelta>,
    cap: usize,
    truncated: &'a mut bool,
}

impl Budget<'_> {
    fn push(&mut self, delta: FieldDelta) {
        if self.out.len() >= self.cap {
            *self.truncated = true;
            return;
        }
        self.out.push(delta);
    }
}

/// Recurse over canonical values in traversal order (sorted keys, array
/// index order) and record added/removed/replaced leaves.
fn collect_deltas(path: &str, left: &Value, right: &Value, budget: &mut Budget<'_>) {
    if left == right {
        return;
    }
    match (left, right) {
        (Value::Object(a), Value::Object(b)) => {
            let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
            for key in keys {
                let child = format!("{path}/{}", escape_token(key));
                match (a.get(key.as_str()), b.get(key.as_str())) {
                    (Some(l), Some(r)) => collect_deltas(&child, l, r, budget),
                    (Some(l), None) => budget.push(FieldDelta {
                        path: child,
                        kind: DeltaKind::Removed,
                        before: Some(l.clone()),
                        after: None,
                    }),
                    (None, Some(r)) => budget.push(FieldDelta {
                        path: child,
                        kind: DeltaKind::Added,
                        before: None,
                        after: Some(r.clone()),
                    }),
                    (None, None) => unreachable!("key drawn from union"),
                }
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            for i in 0..a.len().max(b.len()) {
                let child = format!("{path}/{i}");
                match (a.get(i), b.get(i)) {
                    (Some(l), Some(r)) => collect_deltas(&child, l, r, budget),
                    (Some(l), None) => budget.push(FieldDelta {
                        path: child,
                        kind: DeltaKind::Removed,
                        before: Some(l.clone()),
                        after: None,
                    }),
                    (None, Some(r)) => budget.push(FieldDelta {
                        path: child,
                        kind: DeltaKind::Added,
                        before: None,
                        after: Some(r.clone()),
                    }),
                    (None, None) => unreachable!("index drawn from max"),
                }
            }
        }
        _ => budget.push(FieldDelta {
            path: path.to_string(),
            kind: DeltaKind::Replaced,
            before: Some(left.clone()),
            after: Some(right.clone()),
        }),
    }
}

/// JSON-pointer token escaping (`~` → `~0`, `/` → `~1`).
fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpk_io::hasher::step_hash;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn step(index: u64, step_type: StepType, output: Value, metadata: Value) -> Step {
        let input = json!({"q": index});
        let hash = step_hash(step_type, &input, &output, &metadata).unwrap();
        Step {
            id: StepId::from_index(index),
            step_type,
            input,
            output,
            metadata,
            hash,
            extra: BTreeMap::new(),
        }
    }

    fn run(steps: Vec<Step>) -> Run {
        Run {
            id: "run-test".parse().unwrap(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            environment_fingerprint: BTreeMap::new(),
            runtime_versions: BTreeMap::new(),
            steps,
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn self_diff_is_all_identical() {
        let r = run(vec![
            step(1, StepType::ModelRequest, json!({"a": 1}), json!({})),
            step(2, StepType::ModelResponse, json!({"b": 2}), json!({})),
        ]);
        let d = diff_runs(&r, &r, &DiffOptions::default());
        assert!(d.is_identical());
        assert_eq!(d.identical, 2);
        assert!(d.entries.iter().all(|e| e.status == StepStatus::Identical));
    }

    #[test]
    fn volatile_metadata_drift_is_identical_unless_strict() {
        let a = run(vec![step(
            1,
            StepType::ToolResponse,
            json!({"ok": true}),
            json!({"duration_ms": 10}),
        )]);
        let b = run(vec![step(
            1,
            StepType::ToolResponse,
            json!({"ok": true}),
            json!({"duration_ms": 99}),
        )]);
        let d = diff_runs(&a, &b, &DiffOptions::default());
        assert!(d.is_identical());

        let strict = diff_runs(
            &a,
            &b,
            &DiffOptions {
                strict: true,
                ..Default::default()
            },
        );
        // Hashes agree (volatile keys are stripped before hashing), but
        // strict mode still surfaces the raw metadata drift.
        assert_eq!(strict.entries[0].status, StepStatus::Identical);
        assert!(strict.is_identical());
    }

    #[test]
    fn changed_step_reports_pointer_deltas() {
        let a = run(vec![step(
            1,
            StepType::OutputFinal,
            json!({"assistant_message": "first", "shared": 1}),
            json!({}),
        )]);
        let b = run(vec![step(
            1,
            StepType::OutputFinal,
            json!({"assistant_message": "second", "shared": 1, "extra": true}),
            json!({}),
        )]);
        let d = diff_runs(&a, &b, &DiffOptions::default());
        let entry = &d.entries[0];
        assert_eq!(entry.status, StepStatus::Changed);
        assert_eq!(
            entry.deltas,
            vec![
                FieldDelta {
                    path: "/output/assistant_message".to_string(),
                    kind: DeltaKind::Replaced,
                    before: Some(json!("first")),
                    after: Some(json!("second")),
                },
                FieldDelta {
                    path: "/output/extra".to_string(),
                    kind: DeltaKind::Added,
                    before: None,
                    after: Some(json!(true)),
                },
            ]
        );
    }

    #[test]
    fn missing_steps_classified_per_side() {
        let a = run(vec![
            step(1, StepType::ModelRequest, json!({}), json!({})),
            step(2, StepType::ModelResponse, json!({}), json!({})),
        ]);
        let b = run(vec![step(1, StepType::ModelRequest, json!({}), json!({}))]);
        let d = diff_runs(&a, &b, &DiffOptions::default());
        assert_eq!(d.entries[1].status, StepStatus::MissingRight);
        assert_eq!(d.first_divergence.unwrap().index, 1);

        let rev = diff_runs(&b, &a, &DiffOptions::default());
        assert_eq!(rev.entries[1].status, StepStatus::MissingLeft);
        // Symmetric locator.
        assert_eq!(
            d.first_divergence.unwrap().index,
            rev.first_divergence.unwrap().index
        );
    }

    #[test]
    fn first_only_stops_after_divergence() {
        let mk = |msg: &str| {
            run(vec![
                step(1, StepType::ModelRequest, json!({}), json!({})),
                step(2, StepType::ModelResponse, json!({"m": msg}), json!({})),
                step(3, StepType::OutputFinal, json!({"m": msg}), json!({})),
            ])
        };
        let d = diff_runs(
            &mk("a"),
            &mk("b"),
            &DiffOptions {
                first_only: true,
                ..Default::default()
            },
        );
        assert_eq!(d.first_divergence.unwrap().index, 1);
        // The divergent entry is emitted, scanning stops there.
        assert_eq!(d.entries.len(), 2);
        assert_eq!(d.entries.last().unwrap().status, StepStatus::Changed);
    }

    #[test]
    fn delta_cap_truncates_with_flag() {
        let big = |seed: i64| {
            let obj: serde_json::Map<String, Value> = (0..50)
                .map(|i| (format!("k{i:02}"), json!(i * seed)))
                .collect();
            run(vec![step(1, StepType::ToolResponse, Value::Object(obj), json!({}))])
        };
        let d = diff_runs(
            &big(1),
            &big(2),
            &DiffOptions {
                max_changes_per_step: 5,
                ..Default::default()
            },
        );
        let entry = &d.entries[0];
        assert_eq!(entry.deltas.len(), 5);
        assert!(entry.deltas_truncated);
    }

    #[test]
    fn context_extraction_rides_along() {
        let a = run(vec![step(
            1,
            StepType::ModelResponse,
            json!({"t": "x"}),
            json!({"model": "demo-model", "temperature": 0.0, "max_tokens": 64}),
        )]);
        let b = run(vec![step(
            1,
            StepType::ModelResponse,
            json!({"t": "y"}),
            json!({"model": "demo-model", "temperature": 0.0, "max_tokens": 64}),
        )]);
        let d = diff_runs(&a, &b, &DiffOptions::default());
        let ctx = &d.entries[0].context;
        assert_eq!(ctx.model, Some(json!("demo-model")));
        assert_eq!(ctx.max_tokens, Some(json!(64)));
    }

    #[test]
    fn hooks_see_diff_lifecycle() {
        use rpk_core::hooks::LifecycleHooks;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        struct Observer {
            entries: Arc<AtomicUsize>,
        }
        impl LifecycleHooks for Observer {
            fn name(&self) -> &str {
                "observer"
            }
            fn on_diff_end(&self, entry_count: usize) {
                self.entries.store(entry_count, Ordering::SeqCst);
            }
        }

        let seen = Arc::new(AtomicUsize::new(0));
        let mut hooks = HookSet::new();
        hooks
            .register(Box::new(Observer {
                entries: seen.clone(),
            }))
            .unwrap();
        let r = run(vec![step(1, StepType::OutputFinal, json!({}), json!({}))]);
        diff_runs_with_hooks(&r, &r, &DiffOptions::default(), Some(&hooks));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(hooks.take_diagnostics().is_empty());
    }

    #[test]
    fn diff_output_is_stable() {
        let a = run(vec![step(1, StepType::OutputFinal, json!({"m": "x"}), json!({}))]);
        let b = run(vec![step(1, StepType::OutputFinal, json!({"m": "y"}), json!({}))]);
        let d1 = serde_json::to_value(diff_runs(&a, &b, &DiffOptions::default())).unwrap();
        let d2 = serde_json::to_value(diff_runs(&a, &b, &DiffOptions::default())).unwrap();
        assert_eq!(d1, d2);
    }
}
