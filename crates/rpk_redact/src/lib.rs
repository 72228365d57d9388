//! rpk_redact — deterministic masking of secret-bearing content.
//!
//! Two orthogonal axes applied before a step enters the run:
//! **field-name masking** (case-insensitive name match ⇒ the whole value is
//! replaced) and **value-pattern masking** (string leaves matching a secret
//! shape are replaced). A third, empty-by-default axis masks by JSON-pointer
//! path. Masked values become the literal `"[REDACTED]"`.
//!
//! Redaction is deterministic: identical input produces identical masked
//! output. Policies **add** to the built-in defaults, never remove.
//! Pattern compilation failures are fatal at engine build time (scope open),
//! never at record time.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};
use thiserror::Error;

use rpk_core::policy::RedactionPolicy;

/// Replacement literal for masked leaves.
pub const REDACTED: &str = "[REDACTED]";

/// Built-in sensitive field names (matched case-insensitively).
pub const DEFAULT_SENSITIVE_FIELD_NAMES: &[&str] = &[
    "authorization",
    "proxy-authorization",
    "api_key",
    "apikey",
    "x-api-key",
    "token",
    "access_token",
    "refresh_token",
    "password",
    "secret",
    "cookie",
    "set-cookie",
];

// Built-in secret value shapes:
// - bearer tokens
// - provider-prefixed keys (short alpha prefix + long alphanum tail)
// - long high-entropy hex / base64 runs
// - RFC-5322-shaped email addresses
const DEFAULT_VALUE_PATTERNS: &[&str] = &[
    r"(?i)\bbearer\s+[A-Za-z0-9._~+/=-]{8,}",
    r"\b(?:sk|pk|rk|key)-[A-Za-z0-9_-]{16,}",
    r"\b[0-9a-fA-F]{32,}\b",
    r"[A-Za-z0-9+/]{40,}={0,2}",
    r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
];

#[derive(Debug, Error)]
pub enum RedactError {
    #[error("invalid secret value pattern {pattern:?}: {msg}")]
    Pattern { pattern: String, msg: String },
    #[error("invalid sensitive path pattern {pattern:?}: {msg}")]
    PathPattern { pattern: String, msg: String },
}

impl RedactError {
    pub fn code(&self) -> &'static str {
        // Both shapes are policy configuration failures.
        "redaction_policy_invalid"
    }
}

/// A compiled redaction policy. Build once at scope open, apply per step.
#[derive(Debug)]
pub struct RedactionEngine {
    version: String,
    field_names: BTreeSet<String>,
    value_patterns: Vec<Regex>,
    path_patterns: Vec<Regex>,
}

impl RedactionEngine {
    /// Compile defaults plus the policy's additions.
    pub fn compile(policy: &RedactionPolicy) -> Result<Self, RedactError> {
        let mut field_names: BTreeSet<String> = DEFAULT_SENSITIVE_FIELD_NAMES
            .iter()
            .map(|s| s.to_string())
            .collect();
        for name in &policy.extra_sensitive_field_names {
            field_names.insert(name.to_ascii_lowercase());
        }

        let mut value_patterns = Vec::new();
        for pattern in DEFAULT_VALUE_PATTERNS {
            value_patterns.push(
                Regex::new(pattern).expect("built-in value pattern compiles"),
            );
        }
        for pattern in &policy.extra_secret_value_patterns {
            value_patterns.push(compile_pattern(pattern).map_err(|msg| RedactError::Pattern {
                pattern: pattern.clone(),
                msg,
            })?);
        }

        let mut path_patterns = Vec::new();
        for pattern in &policy.extra_sensitive_path_patterns {
            path_patterns.push(compile_pattern(pattern).map_err(|msg| {
                RedactError::PathPattern {
                    pattern: pattern.clone(),
                    msg,
                }
            })?);
        }

        let version = if policy.version.is_empty() {
            "default".to_string()
        } else {
            policy.version.clone()
        };

        Ok(Self {
            version,
            field_names,
            value_patterns,
            path_patterns,
        })
    }

    /// Compile the built-in defaults only.
    pub fn default_engine() -> Self {
        Self::compile(&RedactionPolicy::default()).expect("default policy compiles")
    }

    /// Policy version string, persisted in run metadata for audit.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Apply all masking axes, returning the masked value.
    pub fn redact(&self, value: &Value) -> Value {
        let mut path = String::new();
        self.redact_at(value, &mut path)
    }

    fn redact_at(&self, value: &Value, path: &mut String) -> Value {
        if self.path_matches(path) {
            return Value::String(REDACTED.to_string());
        }
        match value {
            Value::Object(map) => {
                let mut out = Map::new();
                for (k, v) in map {
                    if self.field_names.contains(&k.to_ascii_lowercase()) {
                        out.insert(k.clone(), Value::String(REDACTED.to_string()));
                        continue;
                    }
                    let len = path.len();
                    path.push('/');
                    path.push_str(&escape_pointer_token(k));
                    out.insert(k.clone(), self.redact_at(v, path));
                    path.truncate(len);
                }
                Value::Object(out)
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let len = path.len();
                    path.push('/');
                    path.push_str(&i.to_string());
                    out.push(self.redact_at(item, path));
                    path.truncate(len);
                }
                Value::Array(out)
            }
            Value::String(s) => {
                if self.value_patterns.iter().any(|re| re.is_match(s)) {
                    Value::String(REDACTED.to_string())
                } else {
                    value.clone()
                }
            }
            other => other.clone(),
        }
    }

    fn path_matches(&self, path: &str) -> bool {
        !path.is_empty() && self.path_patterns.iter().any(|re| re.is_match(path))
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex, String> {
    RegexBuilder::new(pattern)
        .size_limit(1 << 20)
        .build()
        .map_err(|e| e.to_string())
}

/// JSON-pointer token escaping (`~` → `~0`, `/` → `~1`).
fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> RedactionEngine {
        RedactionEngine::default_engine()
    }

    #[test]
    fn field_names_masked_case_insensitively() {
        let v = json!({
            "Authorization": "Bearer abc",
            "X-API-Key": "k",
            "harmless": "text",
            "nested": {"set-cookie": ["a", "b"]}
        });
        let masked = engine().redact(&v);
        assert_eq!(masked["Authorization"], json!(REDACTED));
        assert_eq!(masked["X-API-Key"], json!(REDACTED));
        assert_eq!(masked["harmless"], json!("text"));
        // The whole value is replaced, arrays included.
        assert_eq!(masked["nested"]["set-cookie"], json!(REDACTED));
    }

    #[test]
    fn value_patterns_mask_string_leaves() {
        let v = json!({
            "a": "Bearer sk-ABCDEF0123456789",
            "b": "sk-abcdefghijklmnopqrst",
            "c": "0123456789abcdef0123456789abcdef",
            "d": "user@example.com",
            "e": "plain words stay"
        });
        let masked = engine().redact(&v);
        for key in ["a", "b", "c", "d"] {
            assert_eq!(masked[key], json!(REDACTED), "key {key}");
        }
        assert_eq!(masked["e"], json!("plain words stay"));
    }

    #[test]
    fn redaction_is_deterministic() {
        let v = json!({"token": "x", "msg": "Bearer abcdefgh12345678"});
        let a = engine().redact(&v);
        let b = engine().redact(&v);
        assert_eq!(a, b);
    }

    #[test]
    fn extra_field_names_are_additive() {
        let policy = RedactionPolicy {
            version: "team-1".to_string(),
            extra_sensitive_field_names: ["X-Internal-Auth".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let e = RedactionEngine::compile(&policy).unwrap();
        let masked = e.redact(&json!({"x-internal-auth": "v", "password": "p"}));
        assert_eq!(masked["x-internal-auth"], json!(REDACTED));
        // Defaults still apply.
        assert_eq!(masked["password"], json!(REDACTED));
        assert_eq!(e.version(), "team-1");
    }

    #[test]
    fn path_patterns_mask_by_pointer() {
        let policy = RedactionPolicy {
            extra_sensitive_path_patterns: vec!["^/input/messages/0/content$".to_string()],
            ..Default::default()
        };
        let e = RedactionEngine::compile(&policy).unwrap();
        let masked = e.redact(&json!({
            "input": {"messages": [{"content": "private"}, {"content": "kept"}]}
        }));
        assert_eq!(masked["input"]["messages"][0]["content"], json!(REDACTED));
        assert_eq!(masked["input"]["messages"][1]["content"], json!("kept"));
    }

    #[test]
    fn bad_pattern_fails_at_compile_time() {
        let policy = RedactionPolicy {
            extra_secret_value_patterns: vec!["([unclosed".to_string()],
            ..Default::default()
        };
        let err = RedactionEngine::compile(&policy).unwrap_err();
        assert_eq!(err.code(), "redaction_policy_invalid");
    }

    #[test]
    fn numbers_and_bools_pass_through() {
        let v = json!({"n": 42, "f": 1.5, "b": true, "z": null});
        assert_eq!(engine().redact(&v), v);
    }
}
