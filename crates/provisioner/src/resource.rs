//! Resource references and desired-state specs.
//!
//! A [`ResourceReference`] is an opaque handle into a remote system: the
//! reconciler only ever asks whether it exists. A [`DesiredResource`] pairs a
//! reference with the typed parameters needed to create it.

use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
use serde::{Deserialize, Serialize};

/// Kind of remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A cloud API enablement (e.g. `container.googleapis.com`).
    Api,
    /// A cloud IAM service account.
    ServiceAccount,
    /// A role granted to a member on the project.
    IamBinding,
    /// A managed Kubernetes cluster.
    Cluster,
    /// Local credentials (kube context) for a cluster.
    ClusterCredentials,
    /// A container image repository.
    Repository,
    /// A managed SQL instance.
    SqlInstance,
    /// A Kubernetes namespace.
    Namespace,
    /// A Kubernetes config map.
    ConfigMap,
    /// A Kubernetes secret.
    Secret,
}

impl ResourceKind {
    /// Whether the resource lives inside the Kubernetes cluster.
    #[must_use]
    pub fn is_cluster_scoped(self) -> bool {
        matches!(self, Self::Namespace | Self::ConfigMap | Self::Secret)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Api => "api",
            Self::ServiceAccount => "service-account",
            Self::IamBinding => "iam-binding",
            Self::Cluster => "cluster",
            Self::ClusterCredentials => "cluster-credentials",
            Self::Repository => "repository",
            Self::SqlInstance => "sql-instance",
            Self::Namespace => "namespace",
            Self::ConfigMap => "configmap",
            Self::Secret => "secret",
        };
        write!(f, "{s}")
    }
}

/// Opaque handle into a remote system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceReference {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Kind-specific identifier.
    pub identifier: String,
}

/// Separator between role and member in an IAM binding identifier.
const BINDING_SEPARATOR: char = '|';

impl ResourceReference {
    /// Create a reference.
    pub fn new(kind: ResourceKind, identifier: impl Into<String>) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
        }
    }

    /// Reference to a namespaced Kubernetes object (`namespace/name`).
    pub fn namespaced(kind: ResourceKind, namespace: &str, name: &str) -> Self {
        Self::new(kind, format!("{namespace}/{name}"))
    }

    /// Reference to a role binding for a member.
    pub fn iam_binding(role: &str, member: &str) -> Self {
        Self::new(
            ResourceKind::IamBinding,
            format!("{role}{BINDING_SEPARATOR}{member}"),
        )
    }

    /// Split a namespaced identifier into `(namespace, name)`.
    #[must_use]
    pub fn namespace_and_name(&self) -> Option<(&str, &str)> {
        self.identifier.split_once('/')
    }

    /// Split an IAM binding identifier into `(role, member)`.
    #[must_use]
    pub fn role_and_member(&self) -> Option<(&str, &str)> {
        if self.kind != ResourceKind::IamBinding {
            return None;
        }
        self.identifier.split_once(BINDING_SEPARATOR)
    }
}

impl std::fmt::Display for ResourceReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.role_and_member() {
            Some((role, member)) => write!(f, "{} {role} for {member}", self.kind),
            None => write!(f, "{} {}", self.kind, self.identifier),
        }
    }
}

/// Creation parameters for a managed cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Region the cluster is created in.
    pub location: String,
    /// Nodes per zone.
    pub node_count: u32,
    /// Node machine type.
    pub machine_type: String,
    /// Service account the nodes run as.
    pub node_service_account: String,
}

/// Typed creation parameters, one variant per creatable kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceSpec {
    /// Enable a cloud API.
    Api,
    /// Create a service account.
    ServiceAccount { display_name: String },
    /// Grant a role on the project.
    IamBinding { role: String, member: String },
    /// Create a managed cluster.
    Cluster(ClusterSpec),
    /// Fetch cluster credentials into the local kubeconfig.
    ClusterCredentials { cluster: String, location: String },
    /// Create a docker image repository.
    Repository { location: String, description: String },
    /// Create a SQL instance.
    SqlInstance {
        region: String,
        tier: String,
        database_version: String,
    },
    /// Create a namespace.
    Namespace(Namespace),
    /// Create a config map.
    ConfigMap(ConfigMap),
    /// Create a secret.
    Secret(Secret),
}

/// A reference plus the parameters needed to create it.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredResource {
    /// What to look up.
    pub reference: ResourceReference,
    /// How to create it when absent.
    pub spec: ResourceSpec,
}

impl DesiredResource {
    /// Pair a reference with its creation spec.
    #[must_use]
    pub fn new(reference: ResourceReference, spec: ResourceSpec) -> Self {
        Self { reference, spec }
    }
}
