//! Provision CLI.
//!
//! Brings a Google Cloud project to the state the travel agents demo needs:
//! APIs, IAM, registry, GKE cluster, images and workloads. Safe to re-run.

// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use provisioner::ui;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::deploy::DeployCommand;
use commands::plan::PlanCommand;
use commands::status::StatusCommand;

/// Provision - travel agents deployment reconciler.
#[derive(Parser)]
#[command(
    name = "provision",
    version,
    about = "Idempotent GKE deployment for the travel agents demo",
    long_about = "Provision the Google Cloud resources, cluster and workloads for the\n\
                  travel agents demo.\n\n\
                  Every step checks the current state before changing anything, so\n\
                  re-running the same command converges without side effects."
)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the target project, cluster and workloads.
    Deploy(DeployCommand),

    /// Check every step without changing anything.
    Status(StatusCommand),

    /// Show the ordered step list and its dependencies.
    Plan(PlanCommand),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("info,provisioner=debug")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Deploy(cmd) => cmd.run().await,
        Commands::Status(cmd) => cmd.run().await,
        Commands::Plan(cmd) => cmd.run(),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            ui::print_error(&format!("{e:#}"));
            ExitCode::from(commands::exit_code(&e))
        }
    }
}
