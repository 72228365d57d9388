//! The step model: one observed boundary event inside a run.

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::CoreError;
use crate::ids::{Sha256Digest, StepId};

/// Closed set of step types. Wire names are dotted (`model.request`).
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub enum StepType {
    #[serde(rename = "prompt.render")]
    PromptRender,
    #[serde(rename = "model.request")]
    ModelRequest,
    #[serde(rename = "model.response")]
    ModelResponse,
    #[serde(rename = "tool.request")]
    ToolRequest,
    #[serde(rename = "tool.response")]
    ToolResponse,
    #[serde(rename = "error.event")]
    ErrorEvent,
    #[serde(rename = "output.final")]
    OutputFinal,
}

impl StepType {
    pub const ALL: [StepType; 7] = [
        StepType::PromptRender,
        StepType::ModelRequest,
        StepType::ModelResponse,
        StepType::ToolRequest,
        StepType::ToolResponse,
        StepType::ErrorEvent,
        StepType::OutputFinal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::PromptRender => "prompt.render",
            StepType::ModelRequest => "model.request",
            StepType::ModelResponse => "model.response",
            StepType::ToolRequest => "tool.request",
            StepType::ToolResponse => "tool.response",
            StepType::ErrorEvent => "error.event",
            StepType::OutputFinal => "output.final",
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepType {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or(CoreError::InvalidStepType)
    }
}

/// One recorded boundary event.
///
/// `hash` is a pure function of `type` + canonical(`input`) +
/// canonical(`output`) + canonical(`metadata` minus the volatile denylist);
/// `rpk_io::hasher::step_hash` is the single producer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub input: Value,
    pub output: Value,
    pub metadata: Value,
    pub hash: Sha256Digest,

    /// Additive minor-version fields are preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}
