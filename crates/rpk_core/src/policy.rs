//! Policy value types supplied at scope entry / replay invocation.

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::ids::StepId;
use crate::step::StepType;

/// Which boundaries the capture core may record, and host filtering for HTTP.
///
/// The allowlist wins when non-empty; the blocklist applies afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptionPolicy {
    pub allow_model: bool,
    pub allow_tool: bool,
    pub allow_http: bool,
    pub allowed_hosts: BTreeSet<String>,
    pub blocked_hosts: BTreeSet<String>,
    pub capture_http_bodies: bool,
}

impl Default for InterceptionPolicy {
    fn default() -> Self {
        Self {
            allow_model: true,
            allow_tool: true,
            allow_http: true,
            allowed_hosts: BTreeSet::new(),
            blocked_hosts: BTreeSet::new(),
            capture_http_bodies: false,
        }
    }
}

/// Additive redaction configuration. Policies can extend the built-in
/// defaults but never remove them; `version` is persisted for audit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionPolicy {
    pub version: String,
    pub extra_sensitive_field_names: BTreeSet<String>,
    pub extra_secret_value_patterns: Vec<String>,
    pub extra_sensitive_path_patterns: Vec<String>,
}

/// Pinned inputs that make a replay reproducible.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplayConfig {
    pub seed: u64,
    /// UTC ISO-8601; stamped as the replay run's timestamp.
    pub fixed_clock: String,
}

/// Hybrid replay: which steps take their output from the rerun source.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridReplayPolicy {
    pub rerun_step_types: BTreeSet<StepType>,
    pub rerun_step_ids: BTreeSet<StepId>,
    pub strict_alignment: bool,
}

impl HybridReplayPolicy {
    /// Whether the step at `id` with `step_type` reruns from the second source.
    pub fn wants_rerun(&self, id: &StepId, step_type: StepType) -> bool {
        self.rerun_step_types.contains(&step_type) || self.rerun_step_ids.contains(id)
    }
}

/// Determinism guardrail mode for replay.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NondeterminismMode {
    #[default]
    Off,
    Warn,
    Fail,
}

impl NondeterminismMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NondeterminismMode::Off => "off",
            NondeterminismMode::Warn => "warn",
            NondeterminismMode::Fail => "fail",
        }
    }
}

impl fmt::Display for NondeterminismMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NondeterminismMode {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(NondeterminismMode::Off),
            "warn" => Ok(NondeterminismMode::Warn),
            "fail" => Ok(NondeterminismMode::Fail),
            _ => Err(CoreError::InvalidId),
        }
    }
}

/// Host portion of a URL-ish string; tolerant of missing schemes, userinfo,
/// and ports. Host policy checks and the replay guard share this.
pub fn host_of(url: &str) -> String {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let rest = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    let rest = rest.rsplit_once('@').map(|(_, r)| r).unwrap_or(rest);
    rest.split(':').next().unwrap_or(rest).to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_parsing_tolerates_shapes() {
        assert_eq!(host_of("https://api.example.com/v1"), "api.example.com");
        assert_eq!(host_of("http://user:pw@Host.Example:8080/x"), "host.example");
        assert_eq!(host_of("plainhost"), "plainhost");
    }

    #[test]
    fn interception_defaults() {
        let p = InterceptionPolicy::default();
        assert!(p.allow_model && p.allow_tool && p.allow_http);
        assert!(!p.capture_http_bodies);
        assert!(p.allowed_hosts.is_empty());
    }

    #[test]
    fn redaction_policy_parses_partial_json() {
        let p: RedactionPolicy = serde_json::from_str(
            r#"{"version":"team-2","extra_sensitive_field_names":["x-internal-auth"]}"#,
        )
        .unwrap();
        assert_eq!(p.version, "team-2");
        assert!(p.extra_sensitive_field_names.contains("x-internal-auth"));
        assert!(p.extra_secret_value_patterns.is_empty());
    }

    #[test]
    fn hybrid_wants_rerun_by_type_or_id() {
        let mut p = HybridReplayPolicy::default();
        p.rerun_step_types.insert(StepType::ModelResponse);
        p.rerun_step_ids.insert(StepId::from_index(4));
        assert!(p.wants_rerun(&StepId::from_index(1), StepType::ModelResponse));
        assert!(p.wants_rerun(&StepId::from_index(4), StepType::ToolRequest));
        assert!(!p.wants_rerun(&StepId::from_index(2), StepType::ToolRequest));
    }

    #[test]
    fn nondeterminism_mode_parse() {
        assert_eq!("warn".parse::<NondeterminismMode>().unwrap(), NondeterminismMode::Warn);
        assert!("loud".parse::<NondeterminismMode>().is_err());
    }
}
