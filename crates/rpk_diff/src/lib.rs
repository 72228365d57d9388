//! rpk_diff — linear comparison of two runs.
//!
//! `diff_runs` makes one pass over step indices in O(n) time and space and
//! reports per-step status, field-level deltas with JSON-pointer paths, and
//! the first divergence. Divergence is a **value**, never an error; the only
//! errors here are input errors (unreadable or unverifiable artifacts).
//! `assert` layers pass/fail semantics with drift and slowdown gates on
//! top; `snapshot` adds the name-keyed baseline store.

#![forbid(unsafe_code)]

use thiserror::Error;

use rpk_io::IoError;

pub mod assert;
pub mod diff;
pub mod snapshot;

pub use assert::{assert_run, AssertOptions, AssertReport};
pub use diff::{
    diff_artifacts, diff_runs, DeltaKind, DiffEntry, DiffOptions, DiffResult, FieldDelta,
    FirstDivergence, StepStatus,
};
pub use snapshot::{snapshot_assert, SnapshotOutcome};

/// Input errors for diff/assert/snapshot.
#[derive(Debug, Error)]
pub enum DiffError {
    #[error(transparent)]
    Io(#[from] IoError),

    #[error("invalid snapshot name {0:?} (allowed: [A-Za-z0-9._-])")]
    InvalidSnapshotName(String),

    #[error("no baseline named {name:?} under {dir}")]
    MissingBaseline { name: String, dir: String },
}

impl DiffError {
    /// Stable machine code for user-visible failures.
    pub fn code(&self) -> &'static str {
        match self {
            DiffError::Io(e) => e.code(),
            DiffError::InvalidSnapshotName(_) => "invalid_snapshot_name",
            DiffError::MissingBaseline { .. } => "missing_baseline",
        }
    }
}
