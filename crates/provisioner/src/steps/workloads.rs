//! Workload manifests and rollout readiness.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::backend::{ApplyAction, ManifestApplier, RolloutStatus};
use crate::config::DeployContext;
use crate::error::ProvisionError;
use crate::manifest;
use crate::step::{ProvisioningStep, WaitForReadiness};

/// Applies the rendered deployments and services.
///
/// Satisfied when the live objects already match what would be applied.
pub struct ApplyWorkloads {
    manifests: Arc<dyn ManifestApplier>,
}

impl ApplyWorkloads {
    pub fn new(manifests: Arc<dyn ManifestApplier>) -> Self {
        Self { manifests }
    }
}

#[async_trait]
impl ProvisioningStep for ApplyWorkloads {
    fn name(&self) -> &str {
        "apply-workloads"
    }

    fn description(&self) -> &str {
        "Applying workload manifests"
    }

    fn depends_on(&self) -> Vec<&str> {
        vec!["app-config", "credentials-secret", "push-images"]
    }

    async fn check(&self, ctx: &DeployContext) -> Result<bool, ProvisionError> {
        let yaml = manifest::workloads(ctx)?.to_yaml();
        self.manifests.is_current(&yaml).await
    }

    async fn apply(&self, ctx: &DeployContext) -> Result<(), ProvisionError> {
        let set = manifest::workloads(ctx)?;
        let statuses = self.manifests.apply(&set.to_yaml()).await?;

        let changed = statuses
            .iter()
            .filter(|s| s.action != ApplyAction::Unchanged)
            .count();
        info!(objects = statuses.len(), changed, "Workloads applied");
        Ok(())
    }
}

/// Waits until every configured deployment has rolled out.
pub fn wait_for_rollout(ctx: &DeployContext, rollouts: Arc<dyn RolloutStatus>) -> WaitForReadiness {
    let readiness = ctx.config().readiness;

    WaitForReadiness::new(
        "wait-rollout",
        "Waiting for deployments to become ready",
        readiness.interval(),
        readiness.timeout(),
        move |ctx: &DeployContext| {
            let rollouts = rollouts.clone();
            let namespace = ctx.config().namespace.clone();
            let names: Vec<String> = ctx
                .config()
                .services
                .iter()
                .map(|s| s.name.clone())
                .collect();
            async move {
                for name in &names {
                    if !rollouts.is_ready(&namespace, name).await? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        },
    )
    .with_dependencies(["apply-workloads"])
}
