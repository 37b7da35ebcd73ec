//! Manifest apply through `kubectl`.

use async_trait::async_trait;
use tracing::{debug, info};

use super::command::{args, run, run_checked};
use super::{ApplyAction, ManifestApplier, ObjectApplyStatus};
use crate::error::ProvisionError;

const KUBECTL: &str = "kubectl";

/// `kubectl apply -f -` against an optional context.
#[derive(Debug, Clone, Default)]
pub struct KubectlApplier {
    context: Option<String>,
}

impl KubectlApplier {
    pub fn new(context: Option<String>) -> Self {
        Self { context }
    }

    fn command(&self, verb: &str) -> Vec<String> {
        let mut argv = Vec::new();
        if let Some(context) = &self.context {
            argv.push(format!("--context={context}"));
        }
        argv.extend(args([verb, "-f", "-"]));
        argv
    }
}

/// Parse `kubectl apply` output lines such as
/// `deployment.apps/travel-adk-coordinator configured`.
#[must_use]
pub fn parse_apply_output(stdout: &str) -> Vec<ObjectApplyStatus> {
    stdout
        .lines()
        .filter_map(|line| {
            let (object, action) = line.trim().rsplit_once(' ')?;
            let action = match action {
                "created" => ApplyAction::Created,
                "unchanged" => ApplyAction::Unchanged,
                "configured" | "serverside-applied" => ApplyAction::Configured,
                _ => return None,
            };
            Some(ObjectApplyStatus {
                object: object.to_string(),
                action,
            })
        })
        .collect()
}

#[async_trait]
impl ManifestApplier for KubectlApplier {
    async fn is_current(&self, yaml: &str) -> Result<bool, ProvisionError> {
        // `kubectl diff` exits 0 with no differences, 1 with differences.
        let output = run(KUBECTL, &self.command("diff"), Some(yaml)).await?;
        match output.code {
            Some(0) => Ok(true),
            Some(1) => {
                debug!(diff = %output.stdout, "Live objects differ");
                Ok(false)
            }
            _ => Err(ProvisionError::from_tool_output(KUBECTL, &output.stderr)),
        }
    }

    async fn apply(&self, yaml: &str) -> Result<Vec<ObjectApplyStatus>, ProvisionError> {
        let stdout = run_checked(KUBECTL, &self.command("apply"), Some(yaml)).await?;
        let statuses = parse_apply_output(&stdout);
        for status in &statuses {
            info!(object = %status.object, action = %status.action, "Applied");
        }
        Ok(statuses)
    }
}
