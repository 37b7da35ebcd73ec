//! Steps that make sure a set of remote resources exists.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::backend::ResourceApi;
use crate::config::DeployContext;
use crate::error::ProvisionError;
use crate::manifest;
use crate::resource::{ClusterSpec, DesiredResource, ResourceKind, ResourceReference, ResourceSpec};
use crate::retry::RetryConfig;
use crate::step::ProvisioningStep;

/// Derives the desired resources of a step from the context.
pub type DesiredFn = fn(&DeployContext) -> Vec<DesiredResource>;

/// Satisfied when every desired resource exists; applying creates the
/// missing ones in order.
pub struct EnsureResources {
    name: String,
    description: String,
    depends_on: Vec<String>,
    best_effort: bool,
    retry: Option<RetryConfig>,
    resources: Arc<dyn ResourceApi>,
    desired: DesiredFn,
}

impl EnsureResources {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        resources: Arc<dyn ResourceApi>,
        desired: DesiredFn,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            depends_on: Vec::new(),
            best_effort: false,
            retry: None,
            resources,
            desired,
        }
    }

    #[must_use]
    pub fn with_dependencies(mut self, names: &[&str]) -> Self {
        self.depends_on
            .extend(names.iter().map(|n| (*n).to_string()));
        self
    }

    #[must_use]
    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    #[must_use]
    pub fn tolerate_failure(mut self) -> Self {
        self.best_effort = true;
        self
    }
}

#[async_trait]
impl ProvisioningStep for EnsureResources {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn depends_on(&self) -> Vec<&str> {
        self.depends_on.iter().map(String::as_str).collect()
    }

    fn best_effort(&self) -> bool {
        self.best_effort
    }

    fn retry_policy(&self) -> Option<RetryConfig> {
        self.retry.clone()
    }

    async fn check(&self, ctx: &DeployContext) -> Result<bool, ProvisionError> {
        for desired in (self.desired)(ctx) {
            if !self.resources.exists(&desired.reference).await? {
                debug!(step = %self.name, resource = %desired.reference, "Missing");
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn apply(&self, ctx: &DeployContext) -> Result<(), ProvisionError> {
        let mut created = 0usize;
        let mut raced = None;

        for desired in (self.desired)(ctx) {
            if self.resources.exists(&desired.reference).await? {
                continue;
            }
            match self.resources.create(&desired).await {
                Ok(()) => {
                    info!(step = %self.name, resource = %desired.reference, "Created");
                    created += 1;
                }
                Err(ProvisionError::AlreadyExists(msg)) => raced = Some(msg),
                // A create that reports something missing is waiting on a
                // resource created moments ago that is not visible yet.
                Err(ProvisionError::NotFound(msg)) => {
                    return Err(ProvisionError::TransientRemote(msg));
                }
                Err(e) => return Err(e),
            }
        }

        match raced {
            Some(msg) if created == 0 => Err(ProvisionError::AlreadyExists(msg)),
            _ => Ok(()),
        }
    }
}

/// APIs the project needs.
pub fn apis(ctx: &DeployContext) -> Vec<DesiredResource> {
    ctx.config()
        .apis
        .iter()
        .map(|api| {
            DesiredResource::new(
                ResourceReference::new(ResourceKind::Api, api.as_str()),
                ResourceSpec::Api,
            )
        })
        .collect()
}

/// The deployment service account.
pub fn service_account(ctx: &DeployContext) -> Vec<DesiredResource> {
    vec![DesiredResource::new(
        ResourceReference::new(ResourceKind::ServiceAccount, ctx.service_account_email()),
        ResourceSpec::ServiceAccount {
            display_name: "Travel Agents Service Account".into(),
        },
    )]
}

/// One binding per configured role.
pub fn role_bindings(ctx: &DeployContext) -> Vec<DesiredResource> {
    let member = ctx.service_account_member();
    ctx.config()
        .roles
        .iter()
        .map(|role| {
            DesiredResource::new(
                ResourceReference::iam_binding(role, &member),
                ResourceSpec::IamBinding {
                    role: role.clone(),
                    member: member.clone(),
                },
            )
        })
        .collect()
}

/// The docker artifact repository.
pub fn artifact_repository(ctx: &DeployContext) -> Vec<DesiredResource> {
    let config = ctx.config();
    vec![DesiredResource::new(
        ResourceReference::new(
            ResourceKind::Repository,
            format!("{}/{}", config.region, config.repository),
        ),
        ResourceSpec::Repository {
            location: config.region.clone(),
            description: "Travel agents container images".into(),
        },
    )]
}

/// The optional SQL instance; empty when none is configured.
pub fn sql_instance(ctx: &DeployContext) -> Vec<DesiredResource> {
    let config = ctx.config();
    config
        .cloud_sql
        .iter()
        .map(|sql| {
            DesiredResource::new(
                ResourceReference::new(ResourceKind::SqlInstance, sql.instance_name.as_str()),
                ResourceSpec::SqlInstance {
                    region: config.region.clone(),
                    tier: sql.tier.clone(),
                    database_version: sql.database_version.clone(),
                },
            )
        })
        .collect()
}

/// The managed cluster.
pub fn cluster(ctx: &DeployContext) -> Vec<DesiredResource> {
    let config = ctx.config();
    vec![DesiredResource::new(
        ResourceReference::new(
            ResourceKind::Cluster,
            format!("{}/{}", config.region, config.cluster_name),
        ),
        ResourceSpec::Cluster(ClusterSpec {
            location: config.region.clone(),
            node_count: config.node_count,
            machine_type: config.machine_type.clone(),
            node_service_account: ctx.service_account_email(),
        }),
    )]
}

/// Local kube credentials for the cluster.
pub fn cluster_credentials(ctx: &DeployContext) -> Vec<DesiredResource> {
    let config = ctx.config();
    vec![DesiredResource::new(
        ResourceReference::new(
            ResourceKind::ClusterCredentials,
            format!("{}/{}", config.region, config.cluster_name),
        ),
        ResourceSpec::ClusterCredentials {
            cluster: config.cluster_name.clone(),
            location: config.region.clone(),
        },
    )]
}

/// The workload namespace.
pub fn namespace(ctx: &DeployContext) -> Vec<DesiredResource> {
    vec![DesiredResource::new(
        ResourceReference::new(ResourceKind::Namespace, ctx.config().namespace.as_str()),
        ResourceSpec::Namespace(manifest::namespace(ctx)),
    )]
}

/// The application config map.
pub fn app_config(ctx: &DeployContext) -> Vec<DesiredResource> {
    let config = ctx.config();
    vec![DesiredResource::new(
        ResourceReference::namespaced(
            ResourceKind::ConfigMap,
            &config.namespace,
            &config.config_map_name,
        ),
        ResourceSpec::ConfigMap(manifest::app_config(ctx)),
    )]
}

/// Reference to the credentials secret.
pub fn credentials_secret_ref(ctx: &DeployContext) -> ResourceReference {
    let config = ctx.config();
    ResourceReference::namespaced(ResourceKind::Secret, &config.namespace, &config.secret_name)
}

/// Publishes the local service account key as a secret.
pub struct CredentialsSecret {
    resources: Arc<dyn ResourceApi>,
}

impl CredentialsSecret {
    pub fn new(resources: Arc<dyn ResourceApi>) -> Self {
        Self { resources }
    }
}

#[async_trait]
impl ProvisioningStep for CredentialsSecret {
    fn name(&self) -> &str {
        "credentials-secret"
    }

    fn description(&self) -> &str {
        "Publishing service account key as a secret"
    }

    fn depends_on(&self) -> Vec<&str> {
        vec!["namespace", "service-account-key"]
    }

    async fn check(&self, ctx: &DeployContext) -> Result<bool, ProvisionError> {
        self.resources.exists(&credentials_secret_ref(ctx)).await
    }

    async fn apply(&self, ctx: &DeployContext) -> Result<(), ProvisionError> {
        let path = ctx.credentials_path();
        let key = tokio::fs::read_to_string(&path).await.map_err(|e| {
            ProvisionError::config(format!("cannot read key file {}: {e}", path.display()))
        })?;
        let desired = DesiredResource::new(
            credentials_secret_ref(ctx),
            ResourceSpec::Secret(manifest::credentials_secret(ctx, &key)),
        );
        self.resources.create(&desired).await
    }
}
