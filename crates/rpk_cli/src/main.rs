// crates/rpk_cli/src/main.rs
//
// ReplayKit CLI entrypoint.
// Drives the capture/replay/diff/migration cores, writes canonical
// artifacts, and prints canonical JSON when asked. Strictly offline &
// deterministic: no network, no OS RNG.
//
// Exit codes: 0 clean; 1 divergence / invalid input / verification failure;
// 2 usage errors (clap).

mod args;

use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use args::{hybrid_policy, parse_and_validate, parse_nondeterminism, parse_seed_u64, Args, Command};

use rpk_core::policy::{RedactionPolicy, ReplayConfig};
use rpk_diff::{
    assert_run, diff_artifacts, snapshot_assert, AssertOptions, DiffOptions, SnapshotOutcome,
};
use rpk_io::canonical::to_canonical_bytes;
use rpk_io::envelope::read_artifact;
use rpk_io::migrate::migrate_artifact;
use rpk_io::signature::SigningKey;
use rpk_replay::{replay_hybrid, replay_stub, ReplayOptions};

fn main() -> ExitCode {
    init_tracing();

    let args = match parse_and_validate() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("rpk: error: {e}");
            return ExitCode::from(2);
        }
    };

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("rpk: error: {e}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(args: Args) -> Result<ExitCode, String> {
    let quiet = args.quiet;
    match args.command {
        Command::Record {
            out,
            seed,
            fixed_clock,
            redaction_policy,
        } => {
            let seed = parse_seed_u64(&seed).map_err(|e| e.to_string())?;
            let policy = load_policy(redaction_policy.as_deref())?;
            let key = SigningKey::from_env();
            let run = rpk_capture::demo::record_demo_with_policy(
                &out,
                seed,
                fixed_clock.as_deref(),
                &policy,
                key.as_ref(),
            )
            .map_err(|e| format!("{}: {e}", e.code()))?;
            if !quiet {
                println!(
                    "rpk: recorded {} ({} steps) to {}",
                    run.id,
                    run.step_count(),
                    out.display()
                );
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Replay {
            source,
            out,
            mode,
            seed,
            fixed_clock,
            rerun_from,
            rerun_type,
            rerun_step_id,
            strict_alignment,
            nondeterminism,
        } => {
            let seed = parse_seed_u64(&seed).map_err(|e| e.to_string())?;
            let mut opts = ReplayOptions::new(ReplayConfig { seed, fixed_clock });
            opts.nondeterminism = parse_nondeterminism(&nondeterminism);
            opts.signing_key = SigningKey::from_env();

            let summary = match mode.as_str() {
                "hybrid" => {
                    let rerun = rerun_from.ok_or("--mode hybrid requires --rerun-from")?;
                    let policy = hybrid_policy(&rerun_type, &rerun_step_id, strict_alignment)
                        .map_err(|e| e.to_string())?;
                    replay_hybrid(&source, &rerun, &out, &opts, &policy)
                }
                _ => replay_stub(&source, &out, &opts, None),
            }
            .map_err(|e| format!("{}: {e}", e.code()))?;

            if !quiet {
                println!(
                    "rpk: replayed {} -> {} ({} steps) to {}",
                    summary.replay_of,
                    summary.run_id,
                    summary.step_count,
                    out.display()
                );
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Diff {
            left,
            right,
            first_divergence,
            max_changes_per_step,
            strict,
            json,
        } => {
            let result = diff_artifacts(
                &left,
                &right,
                &DiffOptions {
                    first_only: first_divergence,
                    max_changes_per_step,
                    strict,
                },
            )
            .map_err(|e| format!("{}: {e}", e.code()))?;

            if json {
                print_canonical(&result)?;
            } else if !quiet {
                match result.first_divergence {
                    None => println!("rpk: diff — identical ({} steps)", result.identical),
                    Some(fd) => println!(
                        "rpk: diff — first divergence at index {} ({})",
                        fd.index,
                        status_word(fd.status)
                    ),
                }
            }
            Ok(if result.is_identical() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }

        Command::Assert {
            baseline,
            candidate,
            strict,
            slowdown_threshold_pct,
            max_changes_per_step,
            json,
        } => {
            let baseline_run = read_artifact(&baseline)
                .map_err(|e| format!("{}: {e}", e.code()))?
                .into_run();
            let candidate_run = read_artifact(&candidate)
                .map_err(|e| format!("{}: {e}", e.code()))?
                .into_run();
            let report = assert_run(
                &baseline_run,
                &candidate_run,
                &AssertOptions {
                    strict,
                    slowdown_threshold_pct,
                    max_changes_per_step,
                },
            );
            finish_assert(&report, json, quiet)
        }

        Command::Bundle {
            source,
            out,
            redaction_policy,
        } => {
            let policy = load_policy(redaction_policy.as_deref())?;
            let key = SigningKey::from_env();
            let run = rpk_capture::bundle::bundle_artifact(&source, &out, &policy, key.as_ref())
                .map_err(|e| format!("{}: {e}", e.code()))?;
            if !quiet {
                println!("rpk: bundled {} to {}", run.id, out.display());
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Snapshot {
            name,
            candidate,
            dir,
            update,
            strict,
            json,
        } => {
            let outcome = snapshot_assert(
                &name,
                &candidate,
                &dir,
                update,
                &AssertOptions {
                    strict,
                    ..Default::default()
                },
            )
            .map_err(|e| format!("{}: {e}", e.code()))?;
            match outcome {
                SnapshotOutcome::Updated { path } => {
                    if !quiet {
                        println!("rpk: snapshot {name} updated at {}", path.display());
                    }
                    Ok(ExitCode::SUCCESS)
                }
                SnapshotOutcome::Compared(report) => finish_assert(&report, json, quiet),
            }
        }

        Command::Migrate { source, out, json } => {
            let key = SigningKey::from_env();
            let summary = migrate_artifact(&source, &out, key.as_ref())
                .map_err(|e| format!("{}: {e}", e.code()))?;
            if json {
                print_canonical(&summary)?;
            } else if !quiet {
                println!(
                    "rpk: migrated {} -> {} ({} preserved, {} recomputed) to {}",
                    summary.source_version,
                    summary.target_version,
                    summary.preserved_step_hashes,
                    summary.recomputed_step_hashes,
                    out.display()
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn finish_assert(
    report: &rpk_diff::AssertReport,
    json: bool,
    quiet: bool,
) -> Result<ExitCode, String> {
    if json {
        print_canonical(report)?;
    } else if !quiet {
        match (&report.first_divergence, report.passed()) {
            (_, true) => println!("rpk: assert — pass"),
            (Some(fd), false) => println!(
                "rpk: assert — fail (first divergence at index {})",
                fd.index
            ),
            (None, false) => println!("rpk: assert — fail (drift or performance gate)"),
        }
    }
    Ok(if report.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn status_word(status: rpk_diff::StepStatus) -> &'static str {
    match status {
        rpk_diff::StepStatus::Identical => "identical",
        rpk_diff::StepStatus::Changed => "changed",
        rpk_diff::StepStatus::MissingLeft => "missing_left",
        rpk_diff::StepStatus::MissingRight => "missing_right",
    }
}

/// Canonical JSON on stdout (sorted keys, LF line ending) so downstream
/// tooling can diff the output stably.
fn print_canonical<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let v = serde_json::to_value(value).map_err(|e| e.to_string())?;
    let bytes = to_canonical_bytes(&v).map_err(|e| e.to_string())?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&bytes).map_err(|e| e.to_string())?;
    stdout.write_all(b"\n").map_err(|e| e.to_string())?;
    Ok(())
}

fn load_policy(path: Option<&Path>) -> Result<RedactionPolicy, String> {
    match path {
        None => Ok(RedactionPolicy::default()),
        Some(p) => {
            let bytes = fs::read(p)
                .map_err(|e| format!("cannot load redaction policy {}: {e}", p.display()))?;
            serde_json::from_slice(&bytes)
                .map_err(|e| format!("cannot load redaction policy {}: {e}", p.display()))
        }
    }
}
