//! The run container: one captured execution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::RunId;
use crate::step::Step;

/// One captured execution.
///
/// Invariants:
/// - `steps` are totally ordered by insertion; ids are gap-free `step-NNNNNN`.
/// - `id` and `timestamp` are immutable once the owning capture scope closes.
///
/// Mappings are `BTreeMap` so serialized key order is stable before the
/// canonical codec even runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    /// UTC ISO-8601.
    pub timestamp: String,
    /// Host/platform description; values are scalars.
    pub environment_fingerprint: BTreeMap<String, Value>,
    pub runtime_versions: BTreeMap<String, String>,
    pub steps: Vec<Step>,

    /// Additive minor-version fields are preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Run {
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn run_serde_roundtrip_with_extras() {
        let v = json!({
            "id": "run-20260222T000000Z-ab12cd34",
            "timestamp": "2026-02-22T00:00:00Z",
            "environment_fingerprint": {"arch": "x86_64", "os": "linux"},
            "runtime_versions": {"replaykit": "0.1.0"},
            "steps": [],
            "future_field": {"nested": true}
        });
        let run: Run = serde_json::from_value(v.clone()).unwrap();
        assert_eq!(run.extra.get("future_field"), Some(&json!({"nested": true})));
        assert_eq!(serde_json::to_value(&run).unwrap(), v);
    }
}
