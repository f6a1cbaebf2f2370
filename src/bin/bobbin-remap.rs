//! Renamer process spawned by bobbin: reads an argument file and writes the
//! remapped archive.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use bobbin_rs::remap::launcher::{run_argument_file, EntryRelocator};
use bobbin_rs::BobbinError;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Remap an archive described by an argument file
#[derive(Parser)]
#[command(name = "bobbin-remap")]
#[command(version = VERSION)]
struct Args {
    /// Argument file, one token per line
    argument_file: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run_argument_file(&args.argument_file, &EntryRelocator) {
        Ok(report) => {
            tracing::info!(
                "Wrote {} classes ({} renamed) and {} resources",
                report.classes,
                report.renamed_classes,
                report.resources
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("bobbin-remap: {err}");
            if let BobbinError::RemapExecution { diagnostics, .. } = &err {
                if !diagnostics.is_empty() {
                    eprintln!("{diagnostics}");
                }
            }
            if err.is_argument_error() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
