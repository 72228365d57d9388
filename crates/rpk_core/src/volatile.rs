//! The volatile-metadata denylist and path-context key contract.
//!
//! One constant feeds both sides: write-time hashing (`rpk_io::hasher`
//! removes these keys before digesting) and read-time diff-ignore
//! (`rpk_diff` skips them unless strict). Any key added here must keep the
//! two in lockstep, which is exactly why there is only one list.

use serde_json::{Map, Value};

/// Metadata keys excluded from step hashing at all depths.
pub const VOLATILE_KEYS: &[&str] = &[
    "created_at",
    "wall_time_ms",
    "duration_ms",
    "latency_ms",
    "elapsed_ms",
    "trace_id",
    "span_id",
];

/// `request_id` is volatile only when the same object carries this marker
/// set to `true`. The marker itself is always stripped.
pub const REQUEST_ID_KEY: &str = "request_id";
pub const REQUEST_ID_VOLATILE_MARKER: &str = "request_id_volatile";

/// Keys whose string values are path-shaped; the canonical codec normalizes
/// them to POSIX separators.
pub const PATH_CONTEXT_KEYS: &[&str] = &[
    "path",
    "file",
    "file_path",
    "dir",
    "directory",
    "cwd",
    "workdir",
];

/// Whether `key` in `parent` is excluded from hashing.
pub fn is_volatile_key(key: &str, parent: &Map<String, Value>) -> bool {
    if VOLATILE_KEYS.contains(&key) {
        return true;
    }
    if key == REQUEST_ID_VOLATILE_MARKER {
        return true;
    }
    if key == REQUEST_ID_KEY {
        return parent
            .get(REQUEST_ID_VOLATILE_MARKER)
            .and_then(Value::as_bool)
            .unwrap_or(false);
    }
    false
}

pub fn is_path_context_key(key: &str) -> bool {
    PATH_CONTEXT_KEYS.contains(&key)
}

/// Remove volatile keys at all depths. Arrays recurse; scalars pass through.
pub fn strip_volatile(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                if is_volatile_key(k, map) {
                    continue;
                }
                out.insert(k.clone(), strip_volatile(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(strip_volatile).collect()),
        other => other.clone(),
    }
}
