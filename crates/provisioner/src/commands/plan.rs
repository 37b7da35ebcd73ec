//! Plan command - print the ordered step list.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use provisioner::{plan, ui, Backends};

use super::TargetArgs;

/// Show the steps a deploy would run, in order.
#[derive(Args)]
pub struct PlanCommand {
    #[command(flatten)]
    target: TargetArgs,
}

impl PlanCommand {
    /// Run the plan command.
    ///
    /// # Errors
    ///
    /// Returns an error on configuration problems.
    pub fn run(&self) -> Result<u8> {
        let ctx = self.target.context()?;
        let backends = Backends::live(&ctx);
        let reconciler = plan::standard_plan(&ctx, &backends)?;

        ui::print_section(&format!("🗺  Plan for {}", ctx.target()));
        for (index, step) in reconciler.steps().enumerate() {
            let mut flags = Vec::new();
            if let Some(retry) = step.retry_policy() {
                flags.push(format!("retry x{}", retry.max_attempts));
            }
            if step.best_effort() {
                flags.push("best-effort".to_string());
            }
            let deps = step.depends_on();

            ui::print_numbered_step(index + 1, &format!("{} {}", step.name().bold(), step.description()));
            if !deps.is_empty() {
                println!("       {} {}", "after".bright_black(), deps.join(", "));
            }
            if !flags.is_empty() {
                println!("       {}", flags.join(", ").bright_black());
            }
        }
        println!();
        Ok(0)
    }
}
