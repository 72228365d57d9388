//! Newtypes and parsers for digest/step/run identifiers.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

fn is_lower_hex(s: &str) -> bool {
    s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn is_lower_hex_len(s: &str, n: usize) -> bool {
    s.len() == n && is_lower_hex(s)
}

/// `sha256:` + 64 lowercase hex. Used for step hashes and artifact checksums.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Wrap a bare lowercase 64-hex digest with the `sha256:` prefix.
    pub fn from_hex(hex: &str) -> Result<Self, CoreError> {
        if is_lower_hex_len(hex, 64) {
            Ok(Self(format!("sha256:{hex}")))
        } else {
            Err(CoreError::InvalidHash)
        }
    }

    /// The full prefixed form, e.g. `sha256:ab12…`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The bare 64-hex suffix.
    pub fn hex(&self) -> &str {
        &self.0["sha256:".len()..]
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Sha256Digest {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix("sha256:").ok_or(CoreError::InvalidHash)?;
        if is_lower_hex_len(rest, 64) {
            Ok(Self(s.to_string()))
        } else {
            Err(CoreError::InvalidHash)
        }
    }
}

/// `step-NNNNNN`: zero-padded, 1-based, monotonic within one run.
///
/// Six digits minimum; runs longer than 999 999 steps widen naturally.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct StepId(String);

impl StepId {
    /// Build from a 1-based step index.
    pub fn from_index(index: u64) -> Self {
        Self(format!("step-{index:06}"))
    }

    /// The 1-based index encoded in the id.
    pub fn index(&self) -> u64 {
        // Valid by construction/parse; digits only.
        self.0["step-".len()..].parse().unwrap_or(0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StepId {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix("step-").ok_or(CoreError::InvalidId)?;
        if rest.len() >= 6 && rest.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(s.to_string()))
        } else {
            Err(CoreError::InvalidId)
        }
    }
}

/// Stable run identifier.
///
/// Free-form token (1..=128 chars of `[A-Za-z0-9._:-]`); the capture and
/// replay cores derive `run-<YYYYMMDDTHHMMSSZ>-<hex8>` content-addressed ids
/// through [`RunId::derive`], but externally supplied ids are accepted as-is.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    /// Derive a run id from a compact UTC timestamp and a digest prefix.
    pub fn derive(compact_ts: &str, hex_prefix: &str) -> Self {
        Self(format!("run-{compact_ts}-{hex_prefix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RunId {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ok = (1..=128).contains(&s.len())
            && s.bytes().all(|b| {
                matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' | b':' | b'.')
            });
        if ok {
            Ok(Self(s.to_string()))
        } else {
            Err(CoreError::InvalidId)
        }
    }
}
