//! Nondeterminism guardrails: scan artifacts for indicators of unseeded
//! randomness or unstable time reads, discovered via run/step metadata keys.

use serde::Serialize;
use serde_json::Value;

use rpk_core::run::Run;

/// Metadata keys that mark a nondeterministic input, at any depth.
pub const INDICATOR_KEYS: &[&str] = &["unseeded_rng", "os_entropy", "wall_clock_read"];

/// Key/value pairs that mark a nondeterministic source.
const INDICATOR_VALUES: &[(&str, &str)] = &[("time_source", "system"), ("rng_source", "os")];

/// One indicator discovered in an artifact.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NondetFinding {
    /// JSON-pointer-style location (`/steps/3/metadata/rng_source`).
    pub location: String,
    pub key: String,
    pub detail: String,
}

/// Scan run-level extras and every step's metadata.
pub fn scan_run(run: &Run) -> Vec<NondetFinding> {
    let mut findings = Vec::new();
    for (key, value) in &run.extra {
        scan_value(value, &format!("/{key}"), &mut findings);
        check_entry(key, value, &format!("/{key}"), &mut findings);
    }
    for (i, step) in run.steps.iter().enumerate() {
        scan_value(&step.metadata, &format!("/steps/{i}/metadata"), &mut findings);
    }
    findings
}

fn scan_value(value: &Value, location: &str, findings: &mut Vec<NondetFinding>) {
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                let child = format!("{location}/{key}");
                check_entry(key, v, &child, findings);
                scan_value(v, &child, findings);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                scan_value(v, &format!("{location}/{i}"), findings);
            }
        }
        _ => {}
    }
}

fn check_entry(key: &str, value: &Value, location: &str, findings: &mut Vec<NondetFinding>) {
    if INDICATOR_KEYS.contains(&key) {
        findings.push(NondetFinding {
            location: location.to_string(),
            key: key.to_string(),
            detail: format!("indicator key present (value: {value})"),
        });
        return;
    }
    if let Some(s) = value.as_str() {
        for (k, v) in INDICATOR_VALUES {
            if key == *k && s == *v {
                findings.push(NondetFinding {
                    location: location.to_string(),
                    key: key.to_string(),
                    detail: format!("{k} = {v:?} is not replay-stable"),
                });
            }
        }
    }
}
