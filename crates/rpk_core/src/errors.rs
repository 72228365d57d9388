//! Minimal error set for core-domain validation & parsing.

use core::fmt;

/// Errors raised by core-domain parsers and constructors.
///
/// I/O-bearing crates wrap these into their own richer error enums; this set
/// stays small, `Copy`, and allocation-free.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CoreError {
    InvalidId,
    InvalidHash,
    InvalidStepType,
    InvalidTimestamp,
    IncompatiblePluginApi,
}

impl CoreError {
    /// Stable machine code for user-visible failures.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::InvalidId => "invalid_id",
            CoreError::InvalidHash => "invalid_hash",
            CoreError::InvalidStepType => "invalid_step_type",
            CoreError::InvalidTimestamp => "invalid_timestamp",
            CoreError::IncompatiblePluginApi => "incompatible_plugin_api",
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::InvalidId => write!(f, "invalid id"),
            CoreError::InvalidHash => write!(f, "invalid hash"),
            CoreError::InvalidStepType => write!(f, "invalid step type"),
            CoreError::InvalidTimestamp => write!(f, "invalid timestamp"),
            CoreError::IncompatiblePluginApi => write!(f, "incompatible plugin api version"),
        }
    }
}

impl std::error::Error for CoreError {}
