//! UI helpers for the provision CLI.
//!
//! Provides consistent formatting for console output during a run.

use colored::Colorize;

use crate::reconciler::{CheckState, StepStatus};
use crate::report::{RunReport, StepOutcome};

/// Print the tool banner.
pub fn print_banner() {
    println!();
    println!(
        "{}",
        r"
  ____                 _     _
 |  _ \ _ __ _____   _(_)___(_) ___  _ __
 | |_) | '__/ _ \ \ / / / __| |/ _ \| '_ \
 |  __/| | | (_) \ V /| \__ \ | (_) | | | |
 |_|   |_|  \___/ \_/ |_|___/_|\___/|_| |_|
"
        .cyan()
    );
    println!("  {}", "Idempotent GKE deployment for the travel agents demo".bright_black());
    println!();
}

/// Print a section header.
pub fn print_section(title: &str) {
    println!();
    println!("{}", "═".repeat(70).bright_black());
    println!("{}", title.cyan().bold());
    println!("{}", "═".repeat(70).bright_black());
    println!();
}

/// Print a progress step with step number.
pub fn print_progress_step(current: usize, total: usize, message: &str) {
    println!(
        "{} {} {}",
        format!("[{current}/{total}]").bright_black(),
        "▶".cyan(),
        message.bold()
    );
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message.green());
}

/// Print a warning message.
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message.yellow());
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message.red());
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print an indented progress detail.
pub fn print_progress(message: &str) {
    println!("  {} {}", "→".cyan(), message);
}

/// Print prerequisite check result.
pub fn print_check_result(name: &str, passed: bool, message: Option<&str>) {
    let status = if passed { "✓".green() } else { "✗".red() };

    let text = if let Some(msg) = message {
        format!("{name} - {msg}")
    } else {
        name.to_string()
    };

    println!("  {status} {text}");
}

/// Print a key-value pair.
pub fn print_kv(key: &str, value: &str) {
    println!("  {} {}", format!("{key}:").bright_black(), value.green());
}

/// Print a numbered step.
pub fn print_numbered_step(num: usize, message: &str) {
    println!("  {}. {}", num.to_string().cyan(), message);
}

/// Print the outcome table of a finished run.
pub fn print_report(report: &RunReport) {
    print_section("📋 Run Report");
    print_kv("Target", &report.target);

    for entry in &report.entries {
        let label = format!("{:<10}", entry.outcome.label());
        let label = match &entry.outcome {
            StepOutcome::Applied => label.green(),
            StepOutcome::Skipped { .. } => label.bright_black(),
            StepOutcome::Tolerated { .. } => label.yellow(),
            StepOutcome::Failed { .. } => label.red(),
        };
        let detail = match &entry.outcome {
            StepOutcome::Skipped { reason } => reason.to_string(),
            StepOutcome::Applied => format!("{}ms", entry.elapsed_ms),
            StepOutcome::Tolerated { reason } | StepOutcome::Failed { reason } => {
                reason.to_string()
            }
        };
        println!("  {label} {:<24} {}", entry.step, detail.bright_black());
    }
    for name in &report.not_attempted {
        println!("  {} {name}", format!("{:<10}", "not run").bright_black());
    }
    println!();

    if report.is_success() {
        print_success("All steps converged");
    } else if let Some(failed) = report.failed_step() {
        print_error(&format!("Step '{}' failed", failed.step));
    }
}

/// Print the result of a check-only pass.
pub fn print_status(statuses: &[StepStatus]) {
    for status in statuses {
        match &status.state {
            CheckState::Satisfied => print_check_result(&status.name, true, None),
            CheckState::Pending => {
                println!("  {} {} - {}", "○".yellow(), status.name, "pending".yellow());
            }
            CheckState::Unknown(e) => {
                print_check_result(&status.name, false, Some(&e.to_string()));
            }
        }
    }
}
