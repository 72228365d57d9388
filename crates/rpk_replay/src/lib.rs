//! rpk_replay — deterministic offline replay.
//!
//! Stub mode re-emits recorded outputs unchanged under a pinned clock and
//! seed; hybrid mode substitutes selected step outputs from a second
//! artifact. A process-wide network-deny guard is installed for the
//! duration of every replay and released on all exit paths.

#![forbid(unsafe_code)]

use thiserror::Error;

use rpk_io::IoError;

pub mod guard;
pub mod nondet;
pub mod replay;

pub use guard::{check_outbound, NetworkGuard, OutboundAdapter};
pub use replay::{replay_hybrid, replay_stub, ReplayOptions, ReplaySummary};

/// Errors surfaced by the replay core.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// An outbound socket open was attempted while the deny guard was
    /// active. Always fatal; no output file is produced.
    #[error("outbound network attempt blocked during replay: {host}")]
    NetworkAttemptBlocked { host: String },

    /// Hybrid alignment failed (step counts or types disagree).
    #[error("hybrid alignment mismatch at index {index}: {detail}")]
    AlignmentMismatch { index: usize, detail: String },

    /// The nondeterminism guardrail ran in `fail` mode and found indicators.
    #[error("nondeterminism detected: {0} finding(s)")]
    NondeterminismDetected(usize),

    #[error(transparent)]
    Io(#[from] IoError),
}

impl ReplayError {
    /// Stable machine code for user-visible failures.
    pub fn code(&self) -> &'static str {
        match self {
            ReplayError::NetworkAttemptBlocked { .. } => "network_attempt_blocked",
            ReplayError::AlignmentMismatch { .. } => "hybrid_alignment_mismatch",
            ReplayError::NondeterminismDetected(_) => "nondeterminism_detected",
            ReplayError::Io(e) => e.code(),
        }
    }
}
