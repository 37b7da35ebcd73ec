//! The sequential, fail-fast reconciler.
//!
//! Steps run strictly in declaration order. Each step is first asked whether
//! it is already satisfied; only if not is it applied. The first failure of a
//! step that is not best-effort halts the run and every remaining step is
//! listed as not attempted. Nothing is rolled back: recovery is re-running
//! the same plan, which skips whatever already converged.

use std::collections::{HashMap, HashSet};

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::DeployContext;
use crate::error::ProvisionError;
use crate::report::{FailureReason, RunReport, SkipReason, StepOutcome, StepRecord};
use crate::retry::retry_transient;
use crate::step::ProvisioningStep;
use crate::ui;

/// Result of checking a step without applying it.
#[derive(Debug)]
pub enum CheckState {
    /// The step's effect is in place.
    Satisfied,
    /// The step would apply on the next run.
    Pending,
    /// The check itself failed.
    Unknown(ProvisionError),
}

/// A step's name paired with its check result.
#[derive(Debug)]
pub struct StepStatus {
    pub name: String,
    pub description: String,
    pub state: CheckState,
}

/// Executes an ordered list of provisioning steps.
pub struct Reconciler {
    steps: Vec<Box<dyn ProvisioningStep>>,
    show_progress: bool,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("steps", &self.step_names())
            .field("show_progress", &self.show_progress)
            .finish()
    }
}

impl Reconciler {
    /// Build a reconciler, validating step names and dependencies.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationInvalid` if a name is repeated or a dependency
    /// does not name an earlier step.
    pub fn new(steps: Vec<Box<dyn ProvisioningStep>>) -> Result<Self, ProvisionError> {
        let mut seen: HashSet<&str> = HashSet::new();

        for step in &steps {
            for dep in step.depends_on() {
                if dep == step.name() {
                    return Err(ProvisionError::config(format!(
                        "step '{}' depends on itself",
                        step.name()
                    )));
                }
                if !seen.contains(dep) {
                    return Err(ProvisionError::config(format!(
                        "step '{}' depends on '{dep}', which is not an earlier step",
                        step.name()
                    )));
                }
            }
            if !seen.insert(step.name()) {
                return Err(ProvisionError::config(format!(
                    "step name '{}' is used more than once",
                    step.name()
                )));
            }
        }

        Ok(Self {
            steps,
            show_progress: false,
        })
    }

    /// Print `[n/total] ▶ step` lines while running.
    #[must_use]
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    /// Steps in execution order.
    pub fn steps(&self) -> impl Iterator<Item = &dyn ProvisioningStep> {
        self.steps.iter().map(AsRef::as_ref)
    }

    /// Step names in execution order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order against `ctx`.
    pub async fn run(&self, ctx: &DeployContext) -> RunReport {
        let mut report = RunReport::new(ctx.target());
        let mut completed: HashMap<&str, bool> = HashMap::new();
        let total = self.steps.len();

        info!(target_id = %report.target, steps = total, "Starting reconciliation");

        for (index, step) in self.steps.iter().enumerate() {
            if self.show_progress {
                ui::print_progress_step(index + 1, total, step.description());
            }

            let started = Instant::now();
            let (outcome, attempts) = match unmet_dependency(step.as_ref(), &completed) {
                Some(dep) => {
                    let reason = FailureReason::dependency(step.name(), dep);
                    warn!(step = %step.name(), dependency = %dep, "Dependency not satisfied");
                    (Self::failure(step.as_ref(), reason), 0)
                }
                None => Self::execute(step.as_ref(), ctx).await,
            };
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            if self.show_progress {
                print_outcome(&outcome);
            }

            completed.insert(step.name(), outcome.is_complete());
            let halt = outcome.is_failed();
            report.record(StepRecord {
                step: step.name().to_string(),
                outcome,
                attempts,
                elapsed_ms,
            });

            if halt {
                error!(step = %step.name(), "Step failed, halting run");
                let rest = self.steps[index + 1..]
                    .iter()
                    .map(|s| s.name().to_string())
                    .collect();
                report.finish(rest);
                return report;
            }
        }

        report.finish(Vec::new());
        info!(result = %report.result(), "Reconciliation finished");
        report
    }

    /// Evaluate every `check` without applying anything.
    pub async fn check_all(&self, ctx: &DeployContext) -> Vec<StepStatus> {
        let mut statuses = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let state = match step.check(ctx).await {
                Ok(true) => CheckState::Satisfied,
                Ok(false) => CheckState::Pending,
                Err(e) => CheckState::Unknown(e),
            };
            statuses.push(StepStatus {
                name: step.name().to_string(),
                description: step.description().to_string(),
                state,
            });
        }
        statuses
    }

    async fn execute(step: &dyn ProvisioningStep, ctx: &DeployContext) -> (StepOutcome, u32) {
        match step.check(ctx).await {
            Ok(true) => {
                debug!(step = %step.name(), "Already satisfied");
                return (
                    StepOutcome::Skipped {
                        reason: SkipReason::AlreadySatisfied,
                    },
                    0,
                );
            }
            Ok(false) => {}
            Err(e) => {
                warn!(step = %step.name(), error = %e, "Check failed");
                return (Self::failure(step, FailureReason::from(&e)), 0);
            }
        }

        info!(step = %step.name(), "Applying");
        let (result, attempts) = match step.retry_policy() {
            Some(policy) => retry_transient(&policy, step.name(), || step.apply(ctx)).await,
            None => (step.apply(ctx).await, 1),
        };

        let outcome = match result {
            Ok(()) => StepOutcome::Applied,
            Err(ProvisionError::AlreadyExists(msg)) => {
                debug!(step = %step.name(), detail = %msg, "Resource appeared before apply");
                StepOutcome::Skipped {
                    reason: SkipReason::AlreadyExists,
                }
            }
            Err(e) => {
                warn!(step = %step.name(), error = %e, attempts, "Apply failed");
                Self::failure(step, FailureReason::from(&e))
            }
        };
        (outcome, attempts)
    }

    fn failure(step: &dyn ProvisioningStep, reason: FailureReason) -> StepOutcome {
        if step.best_effort() {
            StepOutcome::Tolerated { reason }
        } else {
            StepOutcome::Failed { reason }
        }
    }
}

fn unmet_dependency<'a>(
    step: &'a dyn ProvisioningStep,
    completed: &HashMap<&str, bool>,
) -> Option<&'a str> {
    step.depends_on()
        .into_iter()
        .find(|dep| !completed.get(dep).copied().unwrap_or(false))
}

fn print_outcome(outcome: &StepOutcome) {
    match outcome {
        StepOutcome::Skipped { reason } => ui::print_progress(&format!("skipped ({reason})")),
        StepOutcome::Applied => ui::print_success("done"),
        StepOutcome::Tolerated { reason } => ui::print_warning(&format!("tolerated: {reason}")),
        StepOutcome::Failed { reason } => ui::print_error(&reason.to_string()),
    }
}
