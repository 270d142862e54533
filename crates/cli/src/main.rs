//! CLI entry point for the media triage scanner.
//!
//! Parses command line arguments, loads configuration, runs the scan and
//! writes reports, then quarantines the damaged files unless told not to.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;

use mediatriage::quarantine::SeparateOptions;
use mediatriage::{detect_capabilities, run_scan, separate, write_reports, Config, VerifierSet};

/// Media Triage - finds corrupt and suspicious media files and quarantines them
#[derive(Parser, Debug)]
#[command(name = "mediatriage")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory to scan recursively
    #[arg(short, long)]
    input: PathBuf,

    /// Directory for reports, checkpoints and the quarantine tree
    #[arg(short, long, default_value = "mediatriage-out")]
    output: PathBuf,

    /// Path to the configuration file (config.toml)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Classify only; leave every file where it is
    #[arg(long, default_value = "false")]
    no_quarantine: bool,

    /// Override whether suspicious files are quarantined alongside corrupt ones
    #[arg(long, value_name = "BOOL")]
    include_suspicious: Option<bool>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let mut config = if args.config.exists() {
        match Config::load(&args.config) {
            Ok(config) => config,
            Err(err) => {
                error!(path = %args.config.display(), error = %err, "failed to load configuration");
                return ExitCode::FAILURE;
            }
        }
    } else {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    };

    if let Some(flag) = args.include_suspicious {
        config.quarantine.include_suspicious = flag;
    }

    let capabilities = detect_capabilities();
    let verifier = Arc::new(VerifierSet::from_environment(&capabilities, &config));

    let store = match run_scan(&args.input, &config, verifier, &args.output).await {
        Ok(store) => store,
        Err(err) => {
            error!(error = %err, "scan failed");
            return ExitCode::FAILURE;
        }
    };

    match write_reports(&store, &args.output) {
        Ok(paths) => {
            println!("Report written to {}", paths.text.display());
        }
        Err(err) => {
            error!(error = %err, "failed to write reports");
            return ExitCode::FAILURE;
        }
    }

    let counts = store.counts();
    println!(
        "Checked {} files: {} healthy, {} corrupt, {} suspicious, {} skipped, {} errors",
        counts.total, counts.healthy, counts.corrupt, counts.suspicious, counts.skipped, counts.error
    );

    if !args.no_quarantine {
        let quarantine_root = args.output.join(&config.quarantine.folder_name);
        let options = SeparateOptions {
            include_suspicious: config.quarantine.include_suspicious,
            create_subfolders: config.quarantine.create_subfolders,
        };
        match separate(&store, &args.input, &quarantine_root, &options) {
            Ok(report) => {
                println!(
                    "Quarantined {} files to {}",
                    report.moved,
                    quarantine_root.display()
                );
                if !report.failures.is_empty() {
                    eprintln!("{} files could not be moved:", report.failures.len());
                    for failure in &report.failures {
                        eprintln!("  {}: {}", failure.path.display(), failure.error);
                    }
                }
            }
            Err(err) => {
                error!(error = %err, "quarantine separation failed");
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}
