//! Run reports.
//!
//! A [`RunReport`] is the ordered record of what the reconciler did with each
//! step it attempted. It is the only output of a run: the CLI prints it,
//! writes it to the summary file and optionally dumps it as JSON.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, ProvisionError};

/// Why a step was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// `check` reported the step already satisfied.
    AlreadySatisfied,
    /// `apply` found the resource already present.
    AlreadyExists,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadySatisfied => write!(f, "already satisfied"),
            Self::AlreadyExists => write!(f, "already exists"),
        }
    }
}

/// Classified failure of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    /// Error classification.
    pub kind: ErrorKind,
    /// Message as reported by the remote system.
    pub message: String,
}

impl FailureReason {
    /// Failure for a step whose dependency did not complete.
    pub fn dependency(step: &str, dependency: &str) -> Self {
        Self {
            kind: ErrorKind::DependencyUnsatisfied,
            message: format!("{step} depends on {dependency}, which did not complete"),
        }
    }
}

impl From<&ProvisionError> for FailureReason {
    fn from(err: &ProvisionError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Terminal state of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Nothing was changed.
    Skipped { reason: SkipReason },
    /// `apply` succeeded.
    Applied,
    /// A best-effort step failed; the run continued.
    Tolerated { reason: FailureReason },
    /// The step failed and halted the run.
    Failed { reason: FailureReason },
}

impl StepOutcome {
    /// Whether dependents of this step may proceed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Skipped { .. } | Self::Applied)
    }

    /// Whether this outcome fails the run.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Short lowercase label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped { .. } => "skipped",
            Self::Applied => "applied",
            Self::Tolerated { .. } => "tolerated",
            Self::Failed { .. } => "failed",
        }
    }
}

/// One report entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step name.
    pub step: String,
    /// What happened.
    pub outcome: StepOutcome,
    /// `apply` invocations made (zero when skipped by `check`).
    pub attempts: u32,
    /// Wall time spent on the step.
    pub elapsed_ms: u64,
}

/// Overall result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunResult {
    Success,
    Failure,
}

impl RunResult {
    /// Process exit code for this result.
    #[must_use]
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
        }
    }
}

impl std::fmt::Display for RunResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "Success"),
            Self::Failure => write!(f, "Failure"),
        }
    }
}

/// Ordered record of a reconciler run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// `project/region/cluster` the run targeted.
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Attempted steps, in execution order.
    pub entries: Vec<StepRecord>,
    /// Steps never attempted because an earlier step failed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_attempted: Vec<String>,
}

impl RunReport {
    /// Start an empty report for `target`.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            started_at: Utc::now(),
            finished_at: None,
            entries: Vec::new(),
            not_attempted: Vec::new(),
        }
    }

    /// Append an entry.
    pub fn record(&mut self, record: StepRecord) {
        self.entries.push(record);
    }

    /// Close the report, listing the steps that were never reached.
    pub fn finish(&mut self, not_attempted: Vec<String>) {
        self.not_attempted = not_attempted;
        self.finished_at = Some(Utc::now());
    }

    /// `Success` iff no entry is `Failed`.
    #[must_use]
    pub fn result(&self) -> RunResult {
        if self.entries.iter().any(|e| e.outcome.is_failed()) {
            RunResult::Failure
        } else {
            RunResult::Success
        }
    }

    /// Whether the run succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result() == RunResult::Success
    }

    /// The entry that halted the run, if any.
    #[must_use]
    pub fn failed_step(&self) -> Option<&StepRecord> {
        self.entries.iter().find(|e| e.outcome.is_failed())
    }

    /// Look up the entry for a step.
    #[must_use]
    pub fn entry(&self, step: &str) -> Option<&StepRecord> {
        self.entries.iter().find(|e| e.step == step)
    }

    /// Outcomes in execution order.
    #[must_use]
    pub fn outcomes(&self) -> Vec<&StepOutcome> {
        self.entries.iter().map(|e| &e.outcome).collect()
    }

    /// Number of entries with the given label (`applied`, `skipped`, ...).
    #[must_use]
    pub fn count(&self, label: &str) -> usize {
        self.entries
            .iter()
            .filter(|e| e.outcome.label() == label)
            .count()
    }

    /// Serialize as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if encoding fails.
    pub fn to_json(&self) -> Result<String, ProvisionError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Plain-text summary suitable for writing to a file.
    #[must_use]
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let finished = self
            .finished_at
            .map_or_else(|| "-".to_string(), |t| t.to_rfc3339());

        let _ = writeln!(out, "Deployment summary");
        let _ = writeln!(out, "==================");
        let _ = writeln!(out, "Target:   {}", self.target);
        let _ = writeln!(out, "Started:  {}", self.started_at.to_rfc3339());
        let _ = writeln!(out, "Finished: {finished}");
        let _ = writeln!(out, "Result:   {}", self.result());
        let _ = writeln!(
            out,
            "Steps:    {} applied, {} skipped, {} tolerated, {} failed, {} not attempted",
            self.count("applied"),
            self.count("skipped"),
            self.count("tolerated"),
            self.count("failed"),
            self.not_attempted.len()
        );
        let _ = writeln!(out);

        for entry in &self.entries {
            let detail = match &entry.outcome {
                StepOutcome::Skipped { reason } => format!("({reason})"),
                StepOutcome::Applied => format!(
                    "({} attempt{}, {}ms)",
                    entry.attempts,
                    if entry.attempts == 1 { "" } else { "s" },
                    entry.elapsed_ms
                ),
                StepOutcome::Tolerated { reason } | StepOutcome::Failed { reason } => {
                    reason.to_string()
                }
            };
            let _ = writeln!(
                out,
                "  {:<10} {:<24} {detail}",
                entry.outcome.label(),
                entry.step
            );
        }
        for name in &self.not_attempted {
            let _ = writeln!(out, "  {:<10} {name}", "not run");
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(step: &str, outcome: StepOutcome) -> StepRecord {
        StepRecord {
            step: step.into(),
            outcome,
            attempts: 1,
            elapsed_ms: 12,
        }
    }

    fn failed_report() -> RunReport {
        let mut report = RunReport::new("demo-1/us-central1/travel-agents-cluster");
        report.record(record("enable-apis", StepOutcome::Applied));
        report.record(record(
            "service-account",
            StepOutcome::Skipped {
                reason: SkipReason::AlreadySatisfied,
            },
        ));
        report.record(record(
            "assign-roles",
            StepOutcome::Failed {
                reason: FailureReason::from(&ProvisionError::PermissionDenied(
                    "Policy update access denied.".into(),
                )),
            },
        ));
        report.finish(vec!["namespace".into()]);
        report
    }

    #[test]
    fn test_result_follows_failed_entries() {
        let mut report = RunReport::new("t");
        report.record(record("a", StepOutcome::Applied));
        report.record(record(
            "b",
            StepOutcome::Tolerated {
                reason: FailureReason::from(&ProvisionError::Remote("boom".into())),
            },
        ));
        assert_eq!(report.result(), RunResult::Success);
        assert_eq!(report.result().exit_code(), 0);

        let report = failed_report();
        assert_eq!(report.result(), RunResult::Failure);
        assert_eq!(report.result().exit_code(), 1);
        assert_eq!(report.failed_step().unwrap().step, "assign-roles");
    }

    #[test]
    fn test_outcome_completion() {
        assert!(StepOutcome::Applied.is_complete());
        assert!(StepOutcome::Skipped {
            reason: SkipReason::AlreadyExists
        }
        .is_complete());
        assert!(!StepOutcome::Tolerated {
            reason: FailureReason::dependency("b", "a")
        }
        .is_complete());
    }

    #[test]
    fn test_json_shape() {
        let json: serde_json::Value =
            serde_json::from_str(&failed_report().to_json().unwrap()).unwrap();

        assert_eq!(json["entries"][0]["outcome"]["status"], "applied");
        assert_eq!(json["entries"][1]["outcome"]["reason"], "already_satisfied");
        assert_eq!(
            json["entries"][2]["outcome"]["reason"]["kind"],
            "permission_denied"
        );
        assert_eq!(json["not_attempted"][0], "namespace");
    }

    #[test]
    fn test_render_summary() {
        let summary = failed_report().render_summary();
        assert!(summary.contains("Target:   demo-1/us-central1/travel-agents-cluster"));
        assert!(summary.contains("Result:   Failure"));
        assert!(summary.contains("1 applied, 1 skipped, 0 tolerated, 1 failed, 1 not attempted"));
        assert!(summary.contains("(already satisfied)"));
        assert!(summary.contains("PermissionDenied: permission denied: Policy update access denied."));
        assert!(summary.contains("not run    namespace"));
    }
}
