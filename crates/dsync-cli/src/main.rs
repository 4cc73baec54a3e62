//! `dsync` - prepare cross-account S3 to S3 DataSync migrations
//!
//! Creates the role, bucket policies, locations and tasks for every migration
//! in the config file. Transfers are never started.

#![allow(missing_docs)]

mod logging;
mod report;

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use dsync_core::{MigrationConfig, MigrationOrchestrator, RunMode, TracingNotifier};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

fn cli() -> Command {
    Command::new("dsync")
        .version(env!("CARGO_PKG_VERSION"))
        .about("DataSync setup tool: cross-account S3 migrations, never auto-started")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Config YAML file"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Preview without changes"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Verbose output"),
        )
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let matches = cli().get_matches();
    let verbose = matches.get_flag("verbose");
    logging::init(verbose);

    tokio::select! {
        result = run(&matches) => match result {
            Ok(code) => code,
            Err(err) => {
                tracing::error!("Failed: {err:#}");
                if verbose {
                    eprintln!("{err:?}");
                }
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Cancelled by user");
            ExitCode::FAILURE
        }
    }
}

async fn run(matches: &ArgMatches) -> anyhow::Result<ExitCode> {
    let path = matches
        .get_one::<PathBuf>("config")
        .context("--config is required")?;
    let mode = RunMode::from_dry_run(matches.get_flag("dry-run"));
    let config = load(path)?;

    tracing::info!("{}", report::banner(mode));

    let clients = dsync_aws::connect(&config).await;
    let orchestrator =
        MigrationOrchestrator::new(config.clone(), clients, Arc::new(TracingNotifier))
            .with_mode(mode);
    let outcome = orchestrator.run().await.context("setup failed")?;

    println!("{}", report::render(&outcome, &config));
    if !mode.is_dry_run() && !outcome.results.is_empty() {
        tracing::warn!("Migrations NOT auto-started - review and start manually");
    }

    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn load(path: &Path) -> anyhow::Result<MigrationConfig> {
    MigrationConfig::load(path).with_context(|| format!("cannot load {}", path.display()))
}
