//! Typed Kubernetes manifests rendered from the deploy context.
//!
//! Every object is built as a `k8s-openapi` type and serialized with
//! `serde_yaml`, so names and images always come from [`DeployContext`].

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;
use serde_json::json;

use crate::config::{DeployContext, ServiceConfig};
use crate::error::ProvisionError;

/// Key of the service account key inside the credentials secret.
pub const CREDENTIALS_KEY: &str = "key.json";

/// Mount directory of the credentials secret in every pod.
pub const CREDENTIALS_MOUNT: &str = "/var/secrets/google";

const PART_OF: &str = "travel-agents";
const MANAGED_BY: &str = "provision";

fn labels(component: Option<&str>) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::from([
        ("app.kubernetes.io/part-of".to_string(), PART_OF.to_string()),
        ("app.kubernetes.io/managed-by".to_string(), MANAGED_BY.to_string()),
    ]);
    if let Some(name) = component {
        labels.insert("app.kubernetes.io/name".into(), name.into());
    }
    labels
}

fn metadata(name: &str, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        labels: Some(labels(None)),
        ..Default::default()
    }
}

/// The workload namespace.
#[must_use]
pub fn namespace(ctx: &DeployContext) -> Namespace {
    Namespace {
        metadata: metadata(&ctx.config().namespace, None),
        ..Default::default()
    }
}

/// Application settings shared by every workload.
#[must_use]
pub fn app_config(ctx: &DeployContext) -> ConfigMap {
    let config = ctx.config();
    let mut data = BTreeMap::from([
        ("GOOGLE_CLOUD_PROJECT".to_string(), config.project_id.clone()),
        ("GOOGLE_CLOUD_LOCATION".to_string(), config.region.clone()),
    ]);
    data.extend(config.app_config.clone());

    ConfigMap {
        metadata: metadata(&config.config_map_name, Some(&config.namespace)),
        data: Some(data),
        ..Default::default()
    }
}

/// Secret holding the service account key.
#[must_use]
pub fn credentials_secret(ctx: &DeployContext, key_json: &str) -> Secret {
    let config = ctx.config();
    Secret {
        metadata: metadata(&config.secret_name, Some(&config.namespace)),
        string_data: Some(BTreeMap::from([(
            CREDENTIALS_KEY.to_string(),
            key_json.to_string(),
        )])),
        type_: Some("Opaque".into()),
        ..Default::default()
    }
}

/// Deployment for one service.
///
/// # Errors
///
/// Returns `Serialization` if the object does not match the API schema.
pub fn deployment(ctx: &DeployContext, service: &ServiceConfig) -> Result<Deployment, ProvisionError> {
    let config = ctx.config();
    let selector = BTreeMap::from([("app".to_string(), service.name.clone())]);
    let mut pod_labels = labels(Some(&service.name));
    pod_labels.extend(selector.clone());

    let mut ports = vec![json!({ "name": "http", "containerPort": service.port })];
    let mut env = vec![
        json!({ "name": "PORT", "value": service.port.to_string() }),
        json!({ "name": "GOOGLE_CLOUD_PROJECT", "value": config.project_id }),
        json!({ "name": "GOOGLE_CLOUD_LOCATION", "value": config.region }),
        json!({
            "name": "GOOGLE_APPLICATION_CREDENTIALS",
            "value": format!("{CREDENTIALS_MOUNT}/{CREDENTIALS_KEY}"),
        }),
    ];
    if let Some(metrics) = service.metrics_port {
        ports.push(json!({ "name": "metrics", "containerPort": metrics }));
        env.push(json!({ "name": "METRICS_PORT", "value": metrics.to_string() }));
    }
    for (key, value) in &config.app_config {
        env.push(json!({ "name": key, "value": value }));
    }

    let health_check = |initial_delay: u32| {
        json!({
            "httpGet": { "path": service.health_path, "port": "http" },
            "initialDelaySeconds": initial_delay,
            "periodSeconds": 10,
        })
    };

    let value = json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": service.name,
            "namespace": config.namespace,
            "labels": pod_labels,
        },
        "spec": {
            "replicas": service.replicas,
            "selector": { "matchLabels": selector },
            "template": {
                "metadata": { "labels": pod_labels },
                "spec": {
                    "containers": [{
                        "name": service.name,
                        "image": ctx.image_uri(service),
                        "imagePullPolicy": "Always",
                        "ports": ports,
                        "env": env,
                        "readinessProbe": health_check(5),
                        "livenessProbe": health_check(30),
                        "volumeMounts": [{
                            "name": "google-credentials",
                            "mountPath": CREDENTIALS_MOUNT,
                            "readOnly": true,
                        }],
                    }],
                    "volumes": [{
                        "name": "google-credentials",
                        "secret": { "secretName": config.secret_name },
                    }],
                },
            },
        },
    });

    Ok(serde_json::from_value(value)?)
}

/// ClusterIP service in front of one deployment.
///
/// # Errors
///
/// Returns `Serialization` if the object does not match the API schema.
pub fn service(ctx: &DeployContext, service: &ServiceConfig) -> Result<Service, ProvisionError> {
    let mut ports = vec![json!({ "name": "http", "port": 80, "targetPort": "http" })];
    if service.metrics_port.is_some() {
        ports.push(json!({ "name": "metrics", "port": 9090, "targetPort": "metrics" }));
    }

    let value = json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {
            "name": service.name,
            "namespace": ctx.config().namespace,
            "labels": labels(Some(&service.name)),
        },
        "spec": {
            "type": "ClusterIP",
            "selector": { "app": service.name },
            "ports": ports,
        },
    });

    Ok(serde_json::from_value(value)?)
}

/// An ordered set of objects applied together.
#[derive(Debug, Default)]
pub struct ManifestSet {
    documents: Vec<String>,
}

impl ManifestSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one object.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the object cannot be encoded.
    pub fn push<T: Serialize>(&mut self, object: &T) -> Result<(), ProvisionError> {
        self.documents.push(serde_yaml::to_string(object)?);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Multi-document YAML stream.
    #[must_use]
    pub fn to_yaml(&self) -> String {
        self.documents.join("---\n")
    }
}

/// Deployments and services for every configured workload.
///
/// # Errors
///
/// Returns `Serialization` if any object cannot be built.
pub fn workloads(ctx: &DeployContext) -> Result<ManifestSet, ProvisionError> {
    let mut set = ManifestSet::new();
    for svc in &ctx.config().services {
        set.push(&deployment(ctx, svc)?)?;
        set.push(&service(ctx, svc)?)?;
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeployConfig;

    fn ctx() -> DeployContext {
        let mut config = DeployConfig::with_defaults("demo-project");
        config.app_config.insert("LOG_LEVEL".into(), "debug".into());
        DeployContext::new(config).unwrap()
    }

    #[test]
    fn test_config_map_carries_project_and_extras() {
        let cm = app_config(&ctx());
        assert_eq!(cm.metadata.name.as_deref(), Some("travel-agents-config"));
        assert_eq!(cm.metadata.namespace.as_deref(), Some("adk-travel"));
        let data = cm.data.unwrap();
        assert_eq!(data["GOOGLE_CLOUD_PROJECT"], "demo-project");
        assert_eq!(data["LOG_LEVEL"], "debug");
    }

    #[test]
    fn test_credentials_secret() {
        let secret = credentials_secret(&ctx(), "{\"type\":\"service_account\"}");
        assert_eq!(secret.metadata.name.as_deref(), Some("travel-agents-sa-key"));
        assert!(secret.string_data.unwrap().contains_key(CREDENTIALS_KEY));
    }

    #[test]
    fn test_deployment_uses_context_image_and_secret() {
        let ctx = ctx();
        let svc = &ctx.config().services[0];
        let deployment = deployment(&ctx, svc).unwrap();

        let spec = deployment.spec.unwrap();
        assert_eq!(spec.replicas, Some(1));
        let pod = spec.template.spec.unwrap();
        let container = &pod.containers[0];
        assert_eq!(
            container.image.as_deref(),
            Some("us-central1-docker.pkg.dev/demo-project/travel-agents/travel-adk-coordinator:latest")
        );
        let env = container.env.as_ref().unwrap();
        assert!(env.iter().any(|e| e.name == "METRICS_PORT" && e.value.as_deref() == Some("8090")));
        assert!(env.iter().any(|e| e.name == "LOG_LEVEL"));

        let volumes = pod.volumes.unwrap();
        let secret = volumes[0].secret.as_ref().unwrap();
        assert_eq!(secret.secret_name.as_deref(), Some("travel-agents-sa-key"));
    }

    #[test]
    fn test_service_without_metrics_port() {
        let mut config = DeployConfig::with_defaults("demo-project");
        config.services[0].metrics_port = None;
        let ctx = DeployContext::new(config).unwrap();

        let svc = service(&ctx, &ctx.config().services[0]).unwrap();
        assert_eq!(svc.spec.unwrap().ports.unwrap().len(), 1);
    }

    #[test]
    fn test_workloads_yaml_stream() {
        let yaml = workloads(&ctx()).unwrap().to_yaml();
        assert_eq!(yaml.matches("---\n").count(), 1);
        assert!(yaml.contains("kind: Deployment"));
        assert!(yaml.contains("kind: Service"));
        assert!(yaml.contains("namespace: adk-travel"));
    }
}
