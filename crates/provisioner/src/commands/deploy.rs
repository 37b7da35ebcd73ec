//! Deploy command - reconcile the whole target.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Confirm};
use provisioner::artifacts::{self, WriteOutcome};
use provisioner::prereq::PrerequisitesValidator;
use provisioner::{plan, ui, Backends, DeployContext};
use tracing::warn;

use super::TargetArgs;

/// Reconcile cloud resources, cluster and workloads.
#[derive(Args)]
pub struct DeployCommand {
    #[command(flatten)]
    target: TargetArgs,

    /// Skip the confirmation prompt.
    #[arg(short, long)]
    yes: bool,

    /// Also write the run report as JSON to this path.
    #[arg(long, value_name = "FILE")]
    report_json: Option<PathBuf>,
}

impl DeployCommand {
    /// Run the deploy command, returning the process exit code.
    ///
    /// # Errors
    ///
    /// Returns an error for configuration or prerequisite problems, or if
    /// the report cannot be written. Step failures are reported through the
    /// exit code instead.
    pub async fn run(&self) -> Result<u8> {
        ui::print_banner();

        ui::print_section("🔍 Checking prerequisites");
        PrerequisitesValidator::new().validate()?;

        let ctx = self.target.context()?;
        Self::print_target(&ctx);

        if !self.yes {
            let proceed = Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt("Proceed with deployment?")
                .default(true)
                .interact()?;

            if !proceed {
                println!("{}", "Deployment cancelled.".yellow());
                return Ok(0);
            }
        }

        ui::print_section("🚀 Reconciling");
        let backends = Backends::live(&ctx);
        let reconciler = plan::standard_plan(&ctx, &backends)?.with_progress(true);
        let report = reconciler.run(&ctx).await;

        ui::print_report(&report);

        let summary = report.render_summary();
        match artifacts::write_once(&ctx.summary_path(), summary.as_bytes())? {
            WriteOutcome::Written => {
                ui::print_info(&format!("Summary written to {}", ctx.summary_path().display()));
            }
            WriteOutcome::LeftUntouched => {
                warn!(path = %ctx.summary_path().display(), "Summary file exists; not overwritten");
            }
        }

        if let Some(path) = &self.report_json {
            std::fs::write(path, report.to_json()?)
                .with_context(|| format!("writing {}", path.display()))?;
        }

        Ok(report.result().exit_code())
    }

    fn print_target(ctx: &DeployContext) {
        let config = ctx.config();
        ui::print_section("📦 Target");
        ui::print_kv("Project", &config.project_id);
        ui::print_kv("Region", &config.region);
        ui::print_kv("Cluster", &config.cluster_name);
        ui::print_kv("Namespace", &config.namespace);
        ui::print_kv("Image tag", &config.image_tag);
        ui::print_kv("Output dir", &config.output_dir.display().to_string());
        println!();
    }
}
