//! The standard ordered plan for the travel agents deployment.

use crate::backend::Backends;
use crate::config::DeployContext;
use crate::error::ProvisionError;
use crate::reconciler::Reconciler;
use crate::step::ProvisioningStep;
use crate::steps::resources::{self, EnsureResources};
use crate::steps::{
    wait_for_rollout, ApplyWorkloads, CredentialsSecret, PushImages, RegistryAuth,
    ServiceAccountKey, WriteVariables,
};

/// Build the ordered step list for `ctx`.
#[must_use]
pub fn standard_steps(ctx: &DeployContext, backends: &Backends) -> Vec<Box<dyn ProvisioningStep>> {
    let api = &backends.resources;
    let retry = ctx.retry_config();

    let mut steps: Vec<Box<dyn ProvisioningStep>> = vec![
        Box::new(
            EnsureResources::new("enable-apis", "Enabling cloud APIs", api.clone(), resources::apis)
                .with_retry(retry.clone()),
        ),
        Box::new(
            EnsureResources::new(
                "service-account",
                "Creating service account",
                api.clone(),
                resources::service_account,
            )
            .with_dependencies(&["enable-apis"])
            .with_retry(retry.clone()),
        ),
        Box::new(
            EnsureResources::new(
                "assign-roles",
                "Assigning IAM roles",
                api.clone(),
                resources::role_bindings,
            )
            .with_dependencies(&["service-account"])
            .with_retry(retry.clone()),
        ),
        Box::new(ServiceAccountKey::new(api.clone())),
        Box::new(WriteVariables),
        Box::new(
            EnsureResources::new(
                "artifact-repository",
                "Creating artifact repository",
                api.clone(),
                resources::artifact_repository,
            )
            .with_dependencies(&["enable-apis"])
            .with_retry(retry.clone()),
        ),
    ];

    if ctx.config().cloud_sql.is_some() {
        steps.push(Box::new(
            EnsureResources::new(
                "cloud-sql-instance",
                "Creating Cloud SQL instance",
                api.clone(),
                resources::sql_instance,
            )
            .with_dependencies(&["enable-apis"])
            .tolerate_failure(),
        ));
    }

    steps.extend([
        Box::new(
            EnsureResources::new("gke-cluster", "Creating GKE cluster", api.clone(), resources::cluster)
                .with_dependencies(&["assign-roles"])
                .with_retry(retry.clone()),
        ) as Box<dyn ProvisioningStep>,
        Box::new(
            EnsureResources::new(
                "cluster-credentials",
                "Fetching cluster credentials",
                api.clone(),
                resources::cluster_credentials,
            )
            .with_dependencies(&["gke-cluster"])
            .with_retry(retry.clone()),
        ),
        Box::new(
            EnsureResources::new(
                "namespace",
                "Creating namespace",
                api.clone(),
                resources::namespace,
            )
            .with_dependencies(&["cluster-credentials"])
            .with_retry(retry),
        ),
        Box::new(
            EnsureResources::new(
                "app-config",
                "Creating application config",
                api.clone(),
                resources::app_config,
            )
            .with_dependencies(&["namespace"]),
        ),
        Box::new(CredentialsSecret::new(api.clone())),
        Box::new(RegistryAuth::new(backends.registry.clone())),
        Box::new(PushImages::new(backends.registry.clone())),
        Box::new(ApplyWorkloads::new(backends.manifests.clone())),
        Box::new(wait_for_rollout(ctx, backends.rollout.clone())),
    ]);

    steps
}

/// Build the standard reconciler for `ctx`.
///
/// # Errors
///
/// Returns `ConfigurationInvalid` if the step list is inconsistent.
pub fn standard_plan(ctx: &DeployContext, backends: &Backends) -> Result<Reconciler, ProvisionError> {
    Reconciler::new(standard_steps(ctx, backends))
}
