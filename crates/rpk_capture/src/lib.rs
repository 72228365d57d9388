//! rpk_capture — the capture core.
//!
//! A [`CaptureScope`] owns one run from open to close: it assigns gap-free
//! monotonic step ids, enforces the interception policy per boundary,
//! redacts secrets before anything enters the run, and hashes each step's
//! canonical content. Scopes nest with stack semantics; fresh threads see no
//! implicit scope (pass a handle explicitly, or use the thread-local sugar
//! in [`ambient`]).

#![forbid(unsafe_code)]

use thiserror::Error;

use rpk_io::IoError;
use rpk_redact::RedactError;

pub mod ambient;
pub mod bundle;
pub mod demo;
pub mod record;
pub mod scope;

pub use scope::CaptureScope;

/// Errors surfaced by the capture core.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The boundary's allow bit is off. The denial is also recorded as an
    /// `error.event` step before this surfaces.
    #[error("boundary denied by policy: {boundary}")]
    BoundaryDenied { boundary: &'static str },

    /// Host filtering rejected the call. Also recorded as an `error.event`.
    #[error("host blocked by policy: {host}")]
    HostBlocked { host: String },

    /// Redaction policy failed to compile (fatal at scope open).
    #[error("redaction policy rejected: {0}")]
    Policy(#[from] RedactError),

    /// A recorder operation ran against a finalized scope.
    #[error("capture scope already closed")]
    ScopeClosed,

    #[error(transparent)]
    Io(#[from] IoError),
}

impl CaptureError {
    /// Stable machine code for user-visible failures.
    pub fn code(&self) -> &'static str {
        match self {
            CaptureError::BoundaryDenied { .. } => "boundary_denied",
            CaptureError::HostBlocked { .. } => "host_blocked",
            CaptureError::Policy(_) => "redaction_policy_invalid",
            CaptureError::ScopeClosed => "scope_closed",
            CaptureError::Io(e) => e.code(),
        }
    }
}
