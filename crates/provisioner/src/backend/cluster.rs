//! In-cluster resources through the Kubernetes API.
//!
//! The client is built lazily from the kube context the credentials step
//! writes, so constructing a [`KubeStore`] never touches the network.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
use kube::api::{Api, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{ResourceApi, RolloutStatus};
use crate::error::ProvisionError;
use crate::resource::{DesiredResource, ResourceKind, ResourceReference, ResourceSpec};

/// Namespaces, config maps and secrets via `kube`, plus deployment rollout status.
pub struct KubeStore {
    context: String,
    client: OnceCell<Client>,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore")
            .field("context", &self.context)
            .field("connected", &self.client.initialized())
            .finish()
    }
}

impl KubeStore {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<Client, ProvisionError> {
        let client = self
            .client
            .get_or_try_init(|| async {
                debug!(context = %self.context, "Connecting to cluster");
                let kubeconfig = Kubeconfig::read().map_err(|e| {
                    ProvisionError::config(format!("cannot read kubeconfig: {e}"))
                })?;
                let options = KubeConfigOptions {
                    context: Some(self.context.clone()),
                    ..Default::default()
                };
                let config = Config::from_custom_kubeconfig(kubeconfig, &options)
                    .await
                    .map_err(|e| {
                        ProvisionError::config(format!("kube context {}: {e}", self.context))
                    })?;
                Client::try_from(config).map_err(ProvisionError::from)
            })
            .await?;
        Ok(client.clone())
    }
}

async fn get_opt<K>(api: Api<K>, name: &str) -> Result<Option<K>, ProvisionError>
where
    K: Clone + DeserializeOwned + std::fmt::Debug,
{
    Ok(api.get_opt(name).await?)
}

fn namespaced(reference: &ResourceReference) -> Result<(&str, &str), ProvisionError> {
    reference.namespace_and_name().ok_or_else(|| {
        ProvisionError::config(format!(
            "expected namespace/name, got '{}'",
            reference.identifier
        ))
    })
}

fn unmanaged(kind: ResourceKind) -> ProvisionError {
    ProvisionError::config(format!("cluster backend does not manage {kind} resources"))
}

/// Whether a deployment has fully rolled out its current generation.
#[must_use]
pub fn rollout_complete(deployment: &Deployment) -> bool {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let Some(status) = &deployment.status else {
        return false;
    };

    let generation_observed = match (deployment.metadata.generation, status.observed_generation) {
        (Some(generation), Some(observed)) => observed >= generation,
        (None, _) => true,
        (Some(_), None) => false,
    };

    generation_observed
        && status.updated_replicas.unwrap_or(0) >= desired
        && status.ready_replicas.unwrap_or(0) >= desired
        && status.available_replicas.unwrap_or(0) >= desired
}

#[async_trait]
impl ResourceApi for KubeStore {
    async fn exists(&self, reference: &ResourceReference) -> Result<bool, ProvisionError> {
        if !reference.kind.is_cluster_scoped() {
            return Err(unmanaged(reference.kind));
        }
        let client = self.client().await?;
        let found = match reference.kind {
            ResourceKind::Namespace => get_opt(Api::<Namespace>::all(client), &reference.identifier)
                .await?
                .is_some(),
            ResourceKind::ConfigMap => {
                let (ns, name) = namespaced(reference)?;
                get_opt(Api::<ConfigMap>::namespaced(client, ns), name)
                    .await?
                    .is_some()
            }
            ResourceKind::Secret => {
                let (ns, name) = namespaced(reference)?;
                get_opt(Api::<Secret>::namespaced(client, ns), name)
                    .await?
                    .is_some()
            }
            other => return Err(unmanaged(other)),
        };
        debug!(resource = %reference, found, "Looked up");
        Ok(found)
    }

    async fn create(&self, desired: &DesiredResource) -> Result<(), ProvisionError> {
        let client = self.client().await?;
        let params = PostParams::default();

        match &desired.spec {
            ResourceSpec::Namespace(ns) => {
                Api::<Namespace>::all(client).create(&params, ns).await?;
            }
            ResourceSpec::ConfigMap(cm) => {
                let (ns, _) = namespaced(&desired.reference)?;
                Api::<ConfigMap>::namespaced(client, ns)
                    .create(&params, cm)
                    .await?;
            }
            ResourceSpec::Secret(secret) => {
                let (ns, _) = namespaced(&desired.reference)?;
                Api::<Secret>::namespaced(client, ns)
                    .create(&params, secret)
                    .await?;
            }
            _ => {
                return Err(ProvisionError::config(format!(
                    "cluster backend does not manage {}",
                    desired.reference
                )))
            }
        }

        info!(resource = %desired.reference, "Created");
        Ok(())
    }

    async fn create_key(&self, _account_email: &str) -> Result<Vec<u8>, ProvisionError> {
        Err(ProvisionError::config(
            "cluster backend cannot create service account keys",
        ))
    }
}

#[async_trait]
impl RolloutStatus for KubeStore {
    async fn is_ready(&self, namespace: &str, deployment: &str) -> Result<bool, ProvisionError> {
        let api = Api::<Deployment>::namespaced(self.client().await?, namespace);
        Ok(get_opt(api, deployment)
            .await?
            .is_some_and(|d| rollout_complete(&d)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{DeploymentSpec, DeploymentStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn deployment(generation: i64, status: Option<DeploymentStatus>) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some("travel-adk-coordinator".into()),
                generation: Some(generation),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(2),
                ..Default::default()
            }),
            status,
        }
    }

    fn status(observed: i64, updated: i32, ready: i32) -> DeploymentStatus {
        DeploymentStatus {
            observed_generation: Some(observed),
            updated_replicas: Some(updated),
            ready_replicas: Some(ready),
            available_replicas: Some(ready),
            replicas: Some(updated),
            ..Default::default()
        }
    }

    #[test]
    fn test_rollout_complete() {
        assert!(rollout_complete(&deployment(3, Some(status(3, 2, 2)))));
    }

    #[test]
    fn test_rollout_waits_for_ready_replicas() {
        assert!(!rollout_complete(&deployment(3, Some(status(3, 2, 1)))));
        assert!(!rollout_complete(&deployment(3, None)));
    }

    #[test]
    fn test_rollout_waits_for_new_generation() {
        assert!(!rollout_complete(&deployment(4, Some(status(3, 2, 2)))));
    }

    #[test]
    fn test_store_is_lazy() {
        let store = KubeStore::new("gke_demo-1_us-central1_travel-agents-cluster");
        assert!(format!("{store:?}").contains("connected: false"));
    }

    #[tokio::test]
    async fn test_rejects_cloud_kinds_without_connecting() {
        let store = KubeStore::new("gke_demo-1_us-central1_travel-agents-cluster");
        let reference = ResourceReference::new(ResourceKind::Cluster, "travel-agents-cluster");
        let err = store.exists(&reference).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ConfigurationInvalid);
        assert!(format!("{store:?}").contains("connected: false"));
    }
}
