//! Snapshot store: name-keyed baselines on disk, one `<name>.rpk` per
//! baseline. Anything richer than that layout belongs to the embedding tool.

use std::path::{Path, PathBuf};

use rpk_io::envelope::{read_artifact, write_envelope};

use crate::assert::{assert_run, AssertOptions, AssertReport};
use crate::DiffError;

/// Result of a snapshot operation.
#[derive(Debug)]
pub enum SnapshotOutcome {
    /// `update=true`: the baseline was (re)written.
    Updated { path: PathBuf },
    /// The candidate was compared against the stored baseline.
    Compared(AssertReport),
}

/// Store-backed assert. `update=true` rewrites the named baseline from the
/// candidate; otherwise the candidate is compared against it.
pub fn snapshot_assert(
    name: &str,
    candidate: &Path,
    snapshots_dir: &Path,
    update: bool,
    opts: &AssertOptions,
) -> Result<SnapshotOutcome, DiffError> {
    validate_name(name)?;
    let baseline_path = snapshots_dir.join(format!("{name}.rpk"));

    // Reading re-verifies the candidate before it can touch the store.
    let candidate_artifact = read_artifact(candidate)?;

    if update {
        write_envelope(&baseline_path, &candidate_artifact.envelope)?;
        return Ok(SnapshotOutcome::Updated {
            path: baseline_path,
        });
    }

    if !baseline_path.is_file() {
        return Err(DiffError::MissingBaseline {
            name: name.to_string(),
            dir: snapshots_dir.display().to_string(),
        });
    }
    let baseline = read_artifact(&baseline_path)?;
    let report = assert_run(baseline.run(), candidate_artifact.run(), opts);
    Ok(SnapshotOutcome::Compared(report))
}

fn validate_name(name: &str) -> Result<(), DiffError> {
    let ok = !name.is_empty()
        && name.bytes().all(|b| {
            matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'-')
        });
    if ok {
        Ok(())
    } else {
        Err(DiffError::InvalidSnapshotName(name.to_string()))
    }
}
