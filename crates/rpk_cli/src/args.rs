// crates/rpk_cli/src/args.rs
//
// Deterministic, offline CLI argument parsing & validation.
// - Input paths must be local files (no scheme)
// - Optional seed parsing (u64 decimal or 0x-hex up to 16 nybbles)
// - Replay mode / step-type / step-id flags resolve to typed policy objects

use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;

use rpk_core::ids::StepId;
use rpk_core::policy::{HybridReplayPolicy, NondeterminismMode};
use rpk_core::step::StepType;

#[derive(Debug, Parser)]
#[command(name = "rpk", version, about = "ReplayKit: capture, replay, and diff AI workflow runs")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Suppress the human-readable status line.
    #[arg(long, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Record the built-in demo workload to an artifact.
    Record {
        #[arg(long)]
        out: PathBuf,
        /// Decimal u64 or 0x-prefixed hex (≤16 hex digits).
        #[arg(long, default_value = "0")]
        seed: String,
        #[arg(long)]
        fixed_clock: Option<String>,
        /// Redaction policy JSON (additive over the defaults).
        #[arg(long)]
        redaction_policy: Option<PathBuf>,
    },

    /// Replay an artifact offline (stub or hybrid).
    Replay {
        #[arg(long)]
        source: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, value_parser = ["stub", "hybrid"], default_value = "stub")]
        mode: String,
        #[arg(long, default_value = "0")]
        seed: String,
        /// UTC ISO-8601 timestamp stamped as the replay run's clock.
        #[arg(long)]
        fixed_clock: String,
        /// Second artifact supplying rerun outputs (hybrid mode).
        #[arg(long)]
        rerun_from: Option<PathBuf>,
        /// Step types whose outputs rerun from the second source (repeatable).
        #[arg(long)]
        rerun_type: Vec<String>,
        /// Step ids whose outputs rerun from the second source (repeatable).
        #[arg(long)]
        rerun_step_id: Vec<String>,
        #[arg(long)]
        strict_alignment: bool,
        #[arg(long, value_parser = ["off", "warn", "fail"], default_value = "off")]
        nondeterminism: String,
    },

    /// Compare two artifacts; exit 1 on divergence.
    Diff {
        left: PathBuf,
        right: PathBuf,
        /// Stop scanning at the first divergence.
        #[arg(long)]
        first_divergence: bool,
        #[arg(long, default_value_t = 32)]
        max_changes_per_step: usize,
        /// Compare volatile metadata keys too.
        #[arg(long)]
        strict: bool,
        /// Emit the full result as canonical JSON on stdout.
        #[arg(long)]
        json: bool,
    },

    /// Assert a candidate run against a baseline; exit 1 on failure.
    Assert {
        baseline: PathBuf,
        candidate: PathBuf,
        #[arg(long)]
        strict: bool,
        /// Fail when mean step slowdown exceeds this percentage.
        #[arg(long)]
        slowdown_threshold_pct: Option<f64>,
        #[arg(long, default_value_t = 32)]
        max_changes_per_step: usize,
        #[arg(long)]
        json: bool,
    },

    /// Re-emit an artifact under a stricter redaction profile.
    Bundle {
        #[arg(long)]
        source: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        redaction_policy: Option<PathBuf>,
    },

    /// Store-backed assert keyed by name.
    Snapshot {
        #[arg(long)]
        name: String,
        #[arg(long)]
        candidate: PathBuf,
        #[arg(long, default_value = "snapshots")]
        dir: PathBuf,
        /// Rewrite the named baseline instead of comparing.
        #[arg(long)]
        update: bool,
        #[arg(long)]
        strict: bool,
        #[arg(long)]
        json: bool,
    },

    /// Upgrade a prior-schema artifact to the current schema.
    Migrate {
        #[arg(long)]
        source: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug)]
pub enum CliError {
    NonLocalPath(String),
    NotFound(String),
    BadSeed(String),
    BadStepType(String),
    BadStepId(String),
    BadPolicyFile(String),
    MissingRerunSource,
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use CliError::*;
        match self {
            NonLocalPath(p) => write!(f, "path must be a local file (no scheme): {p}"),
            NotFound(p) => write!(f, "file not found: {p}"),
            BadSeed(s) => write!(f, "invalid seed: {s}"),
            BadStepType(s) => write!(f, "invalid step type: {s}"),
            BadStepId(s) => write!(f, "invalid step id: {s}"),
            BadPolicyFile(s) => write!(f, "cannot load redaction policy: {s}"),
            MissingRerunSource => write!(f, "--mode hybrid requires --rerun-from"),
        }
    }
}

impl std::error::Error for CliError {}

/// Entry point used by main.rs.
pub fn parse_and_validate() -> Result<Args, CliError> {
    let args = Args::parse();
    validate_inputs(&args)?;
    Ok(args)
}

fn validate_inputs(args: &Args) -> Result<(), CliError> {
    let inputs: Vec<&PathBuf> = match &args.command {
        Command::Record {
            redaction_policy, ..
        } => redaction_policy.iter().collect(),
        Command::Replay {
            source, rerun_from, ..
        } => std::iter::once(source).chain(rerun_from.iter()).collect(),
        Command::Diff { left, right, .. } => vec![left, right],
        Command::Assert {
            baseline,
            candidate,
            ..
        } => vec![baseline, candidate],
        Command::Bundle {
            source,
            redaction_policy,
            ..
        } => std::iter::once(source).chain(redaction_policy.iter()).collect(),
        Command::Snapshot { candidate, .. } => vec![candidate],
        Command::Migrate { source, .. } => vec![source],
    };
    for path in inputs {
        ensure_local_exists(path)?;
    }
    if let Command::Replay {
        mode, rerun_from, ..
    } = &args.command
    {
        if mode == "hybrid" && rerun_from.is_none() {
            return Err(CliError::MissingRerunSource);
        }
    }
    Ok(())
}

/// Ensure a path is local (no scheme) and exists as a file.
fn ensure_local_exists(p: &PathBuf) -> Result<(), CliError> {
    let s = p.to_string_lossy().to_string();
    if s.contains("://") {
        return Err(CliError::NonLocalPath(s));
    }
    let meta = fs::metadata(p).map_err(|_| CliError::NotFound(s.clone()))?;
    if !meta.is_file() {
        return Err(CliError::NotFound(s));
    }
    Ok(())
}

/// Parse seed as u64: decimal or 0x-hex (1..=16 nybbles).
pub fn parse_seed_u64(s: &str) -> Result<u64, CliError> {
    if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if rest.is_empty() || rest.len() > 16 || !rest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CliError::BadSeed(s.to_string()));
        }
        u64::from_str_radix(rest, 16).map_err(|_| CliError::BadSeed(s.to_string()))
    } else {
        if !s.chars().all(|c| c.is_ascii_digit()) || s.is_empty() {
            return Err(CliError::BadSeed(s.to_string()));
        }
        s.parse::<u64>().map_err(|_| CliError::BadSeed(s.to_string()))
    }
}

/// Resolve the repeatable rerun flags into a typed hybrid policy.
pub fn hybrid_policy(
    rerun_type: &[String],
    rerun_step_id: &[String],
    strict_alignment: bool,
) -> Result<HybridReplayPolicy, CliError> {
    let mut policy = HybridReplayPolicy {
        strict_alignment,
        ..Default::default()
    };
    for raw in rerun_type {
        let t: StepType = raw
            .parse()
            .map_err(|_| CliError::BadStepType(raw.clone()))?;
        policy.rerun_step_types.insert(t);
    }
    for raw in rerun_step_id {
        let id: StepId = raw.parse().map_err(|_| CliError::BadStepId(raw.clone()))?;
        policy.rerun_step_ids.insert(id);
    }
    Ok(policy)
}

pub fn parse_nondeterminism(s: &str) -> NondeterminismMode {
    // Clap's value_parser restricts the domain; default on anything else.
    s.parse().unwrap_or_default()
}
