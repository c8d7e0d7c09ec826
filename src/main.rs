//! Binary entry point for the recount CLI.
//!
//! ## Usage
//!
//! ```bash
//! # Preview what would change under a source tree
//! recount src/
//!
//! # Rewrite files in place
//! recount src/ --write
//!
//! # Strip previously inserted instrumentation
//! recount src/ --cleanup-only --write
//!
//! # Keep a machine-readable audit trail
//! recount src/ --write --log-json edits.json
//! ```

use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use recount::files::{build_include_set, discover};
use recount::report::{FileStatus, RunReport};
use recount::run::{run_files, RunConfig};
use recount_core::config::Options;
use recount_core::diag::DiagLevel;
use recount_core::error::RecountError;
use recount_engine::OwnershipPolicy;

// ============================================================================
// CLI Structure
// ============================================================================

/// Static retain/release insertion for class-based source.
///
/// Processes the given files and directories in order, printing a
/// per-file summary. Nothing is modified unless `--write` is given.
#[derive(Parser, Debug)]
#[command(name = "recount", version, about)]
struct Cli {
    /// Files or directories to process.
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Strip existing instrumentation without re-inserting it.
    #[arg(long)]
    cleanup_only: bool,

    /// Emit per-rule diagnostic detail in the edit log and on stderr.
    #[arg(long, short)]
    verbose: bool,

    /// Include glob for directory walks (repeatable; default `**/*.src`).
    #[arg(long, value_name = "GLOB")]
    include: Vec<String>,

    /// Write edited files in place (default: report only).
    #[arg(long)]
    write: bool,

    /// Write the JSON run report to this path.
    #[arg(long, value_name = "PATH")]
    log_json: Option<PathBuf>,

    /// Callee-name pattern known not to consume its arguments
    /// (repeatable regex).
    #[arg(long, value_name = "PATTERN")]
    non_consuming: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match execute(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::from(err.error_code().code())
        }
    }
}

/// Initialize tracing subscriber.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn execute(cli: Cli) -> Result<u8, RecountError> {
    let policy = OwnershipPolicy::new(&cli.non_consuming, &[], true)
        .map_err(|err| RecountError::invalid_args(err.to_string()))?;
    let options = Options {
        add_refcounting: !cli.cleanup_only,
        verbose_logging: cli.verbose,
    };
    let include = build_include_set(&cli.include)?;
    let files = discover(&cli.paths, include.as_ref())?;
    if files.is_empty() {
        return Err(RecountError::invalid_args("no source files matched"));
    }

    let config = RunConfig {
        options,
        policy,
        write: cli.write,
    };
    let report = run_files(&files, &config);
    print_summary(&report, cli.write);

    if let Some(path) = &cli.log_json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|err| RecountError::internal(format!("serializing report: {}", err)))?;
        fs::write(path, json)?;
    }
    Ok(report.exit_code())
}

fn print_summary(report: &RunReport, wrote: bool) {
    for entry in &report.files {
        match entry.status {
            FileStatus::Edited => {
                let verb = if wrote { "edited" } else { "would edit" };
                let applied = entry
                    .edits
                    .iter()
                    .filter(|r| r.level == DiagLevel::Info)
                    .count();
                println!("{} {} ({} edits)", verb, entry.file, applied);
            }
            FileStatus::Unchanged => println!("unchanged {}", entry.file),
            FileStatus::Failed => {
                let detail = entry.error.as_deref().unwrap_or("unknown error");
                println!("failed {}: {}", entry.file, detail);
            }
        }
    }
    println!(
        "{} edited, {} unchanged, {} failed",
        report.edited, report.unchanged, report.failed
    );
}
