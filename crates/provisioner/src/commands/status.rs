//! Status command - check every step without mutating anything.

use anyhow::Result;
use clap::Args;
use provisioner::reconciler::CheckState;
use provisioner::{plan, ui, Backends};

use super::TargetArgs;

/// Report which steps are already satisfied.
#[derive(Args)]
pub struct StatusCommand {
    #[command(flatten)]
    target: TargetArgs,
}

impl StatusCommand {
    /// Run the status command.
    ///
    /// # Errors
    ///
    /// Returns an error on configuration problems.
    pub async fn run(&self) -> Result<u8> {
        let ctx = self.target.context()?;
        let backends = Backends::live(&ctx);
        let reconciler = plan::standard_plan(&ctx, &backends)?;

        ui::print_section(&format!("🔎 Status of {}", ctx.target()));
        let statuses = reconciler.check_all(&ctx).await;
        ui::print_status(&statuses);
        println!();

        let satisfied = statuses
            .iter()
            .filter(|s| matches!(s.state, CheckState::Satisfied))
            .count();
        ui::print_info(&format!("{satisfied}/{} steps satisfied", statuses.len()));
        Ok(0)
    }
}
