//! Collaborators the provisioning steps talk to.
//!
//! Each remote system sits behind a small trait so steps can be exercised
//! against in-memory fakes. The live implementations shell out to `gcloud`,
//! `kubectl` and `docker`, or talk to the cluster through a `kube` client.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::DeployContext;
use crate::error::ProvisionError;
use crate::resource::{DesiredResource, ResourceReference};

pub mod cluster;
pub mod command;
pub mod docker;
pub mod gcloud;
pub mod kubectl;

pub use self::cluster::KubeStore;
pub use self::docker::DockerCli;
pub use self::gcloud::GcloudCli;
pub use self::kubectl::KubectlApplier;

/// Existence lookups and creation of remote resources.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceApi: Send + Sync {
    /// Whether the referenced resource exists.
    async fn exists(&self, reference: &ResourceReference) -> Result<bool, ProvisionError>;

    /// Create a resource. Fails with `AlreadyExists` if it is already there.
    async fn create(&self, desired: &DesiredResource) -> Result<(), ProvisionError>;

    /// Create a new key for a service account, returning its JSON.
    async fn create_key(&self, account_email: &str) -> Result<Vec<u8>, ProvisionError>;
}

/// What `apply` did to one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyAction {
    Created,
    Configured,
    Unchanged,
}

impl std::fmt::Display for ApplyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Configured => write!(f, "configured"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Per-object result of a manifest apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectApplyStatus {
    /// `kind/name` as reported by the applier.
    pub object: String,
    pub action: ApplyAction,
}

/// Declarative apply of rendered manifests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ManifestApplier: Send + Sync {
    /// Whether the live objects already match `yaml`.
    async fn is_current(&self, yaml: &str) -> Result<bool, ProvisionError>;

    /// Apply a multi-document YAML stream.
    async fn apply(&self, yaml: &str) -> Result<Vec<ObjectApplyStatus>, ProvisionError>;
}

/// Container image registry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageRegistry: Send + Sync {
    /// Whether the local tooling can push to `host`.
    async fn is_authenticated(&self, host: &str) -> Result<bool, ProvisionError>;

    /// Configure credentials for `host`.
    async fn authenticate(&self, host: &str) -> Result<(), ProvisionError>;

    /// Whether the tagged image is present in the registry.
    async fn has_image(&self, image: &str) -> Result<bool, ProvisionError>;

    /// Build `context_dir` as `image` and push it.
    async fn push(&self, image: &str, context_dir: &Path) -> Result<(), ProvisionError>;
}

/// Deployment rollout status.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RolloutStatus: Send + Sync {
    /// Whether every replica of the deployment is updated and ready.
    async fn is_ready(&self, namespace: &str, deployment: &str) -> Result<bool, ProvisionError>;
}

/// Routes cloud resources and in-cluster resources to different backends.
pub struct ResourceRouter {
    cloud: Arc<dyn ResourceApi>,
    cluster: Arc<dyn ResourceApi>,
}

impl ResourceRouter {
    pub fn new(cloud: Arc<dyn ResourceApi>, cluster: Arc<dyn ResourceApi>) -> Self {
        Self { cloud, cluster }
    }

    fn route(&self, reference: &ResourceReference) -> &dyn ResourceApi {
        if reference.kind.is_cluster_scoped() {
            self.cluster.as_ref()
        } else {
            self.cloud.as_ref()
        }
    }
}

#[async_trait]
impl ResourceApi for ResourceRouter {
    async fn exists(&self, reference: &ResourceReference) -> Result<bool, ProvisionError> {
        self.route(reference).exists(reference).await
    }

    async fn create(&self, desired: &DesiredResource) -> Result<(), ProvisionError> {
        self.route(&desired.reference).create(desired).await
    }

    async fn create_key(&self, account_email: &str) -> Result<Vec<u8>, ProvisionError> {
        self.cloud.create_key(account_email).await
    }
}

/// The full set of collaborators a plan needs.
#[derive(Clone)]
pub struct Backends {
    pub resources: Arc<dyn ResourceApi>,
    pub manifests: Arc<dyn ManifestApplier>,
    pub registry: Arc<dyn ImageRegistry>,
    pub rollout: Arc<dyn RolloutStatus>,
}

impl Backends {
    /// Wire the CLI- and client-backed implementations for `ctx`.
    ///
    /// Nothing is contacted here; the Kubernetes client is created on first
    /// use, after the credentials step has written the kube context.
    #[must_use]
    pub fn live(ctx: &DeployContext) -> Self {
        let kube = Arc::new(KubeStore::new(ctx.kube_context()));
        let gcloud = Arc::new(GcloudCli::new(
            ctx.config().project_id.clone(),
            ctx.kube_context(),
        ));

        Self {
            resources: Arc::new(ResourceRouter::new(gcloud, kube.clone())),
            manifests: Arc::new(KubectlApplier::new(Some(ctx.kube_context()))),
            registry: Arc::new(DockerCli::new()),
            rollout: kube,
        }
    }
}
