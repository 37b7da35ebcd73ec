//! Cloud resources through the `gcloud` CLI.
//!
//! Every lookup is a `describe` (or a filtered `list` where no describe
//! exists); every creation is the matching `create`. The CLI's error text is
//! classified into [`ProvisionError`] variants.

use async_trait::async_trait;
use tracing::{debug, info};

use super::command::{args, exists_from, run, run_checked};
use super::ResourceApi;
use crate::error::ProvisionError;
use crate::resource::{DesiredResource, ResourceKind, ResourceReference, ResourceSpec};

const GCLOUD: &str = "gcloud";
const KUBECTL: &str = "kubectl";

/// A `gcloud` invocation that answers an existence question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Exists iff the command succeeds.
    Describe(Vec<String>),
    /// Exists iff the command prints something.
    NonEmpty(Vec<String>),
    /// A kube context lookup via `kubectl`.
    KubeContext(Vec<String>),
}

/// `gcloud` backend for project-level resources.
#[derive(Debug, Clone)]
pub struct GcloudCli {
    project: String,
    kube_context: String,
}

impl GcloudCli {
    /// Backend for `project`; `kube_context` is the context the credentials
    /// step is expected to produce.
    pub fn new(project: impl Into<String>, kube_context: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            kube_context: kube_context.into(),
        }
    }

    fn project_flag(&self) -> String {
        format!("--project={}", self.project)
    }

    /// The lookup command for a reference.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationInvalid` for kinds this backend does not manage.
    pub fn lookup(&self, reference: &ResourceReference) -> Result<Lookup, ProvisionError> {
        let id = reference.identifier.as_str();
        let project = self.project_flag();

        let lookup = match reference.kind {
            ResourceKind::Api => Lookup::NonEmpty(args([
                "services",
                "list",
                "--enabled",
                &format!("--filter=config.name={id}"),
                "--format=value(config.name)",
                &project,
            ])),
            ResourceKind::ServiceAccount => Lookup::Describe(args([
                "iam",
                "service-accounts",
                "describe",
                id,
                "--format=value(email)",
                &project,
            ])),
            ResourceKind::IamBinding => {
                let (role, member) = reference.role_and_member().ok_or_else(|| {
                    ProvisionError::config(format!("malformed iam binding '{id}'"))
                })?;
                Lookup::NonEmpty(args([
                    "projects",
                    "get-iam-policy",
                    self.project.as_str(),
                    "--flatten=bindings[].members",
                    &format!("--filter=bindings.role={role} AND bindings.members={member}"),
                    "--format=value(bindings.role)",
                ]))
            }
            ResourceKind::Cluster => {
                let (location, name) = split_location(id)?;
                Lookup::Describe(args([
                    "container",
                    "clusters",
                    "describe",
                    name,
                    &format!("--region={location}"),
                    "--format=value(name)",
                    &project,
                ]))
            }
            ResourceKind::ClusterCredentials => Lookup::KubeContext(args([
                "config",
                "get-contexts",
                self.kube_context.as_str(),
                "--output=name",
            ])),
            ResourceKind::Repository => {
                let (location, name) = split_location(id)?;
                Lookup::Describe(args([
                    "artifacts",
                    "repositories",
                    "describe",
                    name,
                    &format!("--location={location}"),
                    "--format=value(name)",
                    &project,
                ]))
            }
            ResourceKind::SqlInstance => Lookup::Describe(args([
                "sql",
                "instances",
                "describe",
                id,
                "--format=value(name)",
                &project,
            ])),
            other => {
                return Err(ProvisionError::config(format!(
                    "gcloud backend does not manage {other} resources"
                )))
            }
        };
        Ok(lookup)
    }

    /// The creation command for a desired resource.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationInvalid` for specs this backend does not manage.
    pub fn create_args(&self, desired: &DesiredResource) -> Result<Vec<String>, ProvisionError> {
        let id = desired.reference.identifier.as_str();
        let project = self.project_flag();

        let argv = match &desired.spec {
            ResourceSpec::Api => args(["services", "enable", id, &project]),
            ResourceSpec::ServiceAccount { display_name } => {
                let account_id = id.split('@').next().unwrap_or(id);
                args([
                    "iam",
                    "service-accounts",
                    "create",
                    account_id,
                    &format!("--display-name={display_name}"),
                    &project,
                ])
            }
            ResourceSpec::IamBinding { role, member } => args([
                "projects",
                "add-iam-policy-binding",
                self.project.as_str(),
                &format!("--member={member}"),
                &format!("--role={role}"),
                "--condition=None",
                "--quiet",
            ]),
            ResourceSpec::Cluster(spec) => {
                let (_, name) = split_location(id)?;
                args([
                    "container",
                    "clusters",
                    "create",
                    name,
                    &format!("--region={}", spec.location),
                    &format!("--num-nodes={}", spec.node_count),
                    &format!("--machine-type={}", spec.machine_type),
                    &format!("--service-account={}", spec.node_service_account),
                    &format!("--workload-pool={}.svc.id.goog", self.project),
                    "--enable-ip-alias",
                    "--quiet",
                    &project,
                ])
            }
            ResourceSpec::ClusterCredentials { cluster, location } => args([
                "container",
                "clusters",
                "get-credentials",
                cluster.as_str(),
                &format!("--region={location}"),
                &project,
            ]),
            ResourceSpec::Repository {
                location,
                description,
            } => {
                let (_, name) = split_location(id)?;
                args([
                    "artifacts",
                    "repositories",
                    "create",
                    name,
                    "--repository-format=docker",
                    &format!("--location={location}"),
                    &format!("--description={description}"),
                    &project,
                ])
            }
            ResourceSpec::SqlInstance {
                region,
                tier,
                database_version,
            } => args([
                "sql",
                "instances",
                "create",
                id,
                &format!("--database-version={database_version}"),
                &format!("--tier={tier}"),
                &format!("--region={region}"),
                &project,
            ]),
            ResourceSpec::Namespace(_) | ResourceSpec::ConfigMap(_) | ResourceSpec::Secret(_) => {
                return Err(ProvisionError::config(format!(
                    "gcloud backend does not manage {}",
                    desired.reference
                )))
            }
        };
        Ok(argv)
    }
}

/// Split a `location/name` identifier.
fn split_location(id: &str) -> Result<(&str, &str), ProvisionError> {
    id.split_once('/')
        .ok_or_else(|| ProvisionError::config(format!("expected location/name, got '{id}'")))
}

#[async_trait]
impl ResourceApi for GcloudCli {
    async fn exists(&self, reference: &ResourceReference) -> Result<bool, ProvisionError> {
        debug!(resource = %reference, "Looking up");
        match self.lookup(reference)? {
            Lookup::Describe(argv) => exists_from(run_checked(GCLOUD, &argv, None).await),
            Lookup::NonEmpty(argv) => {
                let stdout = run_checked(GCLOUD, &argv, None).await?;
                Ok(!stdout.trim().is_empty())
            }
            Lookup::KubeContext(argv) => Ok(run(KUBECTL, &argv, None).await?.success()),
        }
    }

    async fn create(&self, desired: &DesiredResource) -> Result<(), ProvisionError> {
        let argv = self.create_args(desired)?;
        info!(resource = %desired.reference, "Creating");
        run_checked(GCLOUD, &argv, None).await?;
        Ok(())
    }

    async fn create_key(&self, account_email: &str) -> Result<Vec<u8>, ProvisionError> {
        // Owner-only scratch directory, removed when dropped.
        let scratch_dir = tempfile::tempdir()?;
        let scratch = scratch_dir.path().join("key.json");
        let argv = args([
            "iam",
            "service-accounts",
            "keys",
            "create",
            &scratch.display().to_string(),
            &format!("--iam-account={account_email}"),
            &self.project_flag(),
        ]);

        info!(account = %account_email, "Creating service account key");
        run_checked(GCLOUD, &argv, None).await?;
        Ok(tokio::fs::read(&scratch).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ClusterSpec;

    fn cli() -> GcloudCli {
        GcloudCli::new("demo-1", "gke_demo-1_us-central1_travel-agents-cluster")
    }

    #[test]
    fn test_api_lookup_filters_enabled_services() {
        let lookup = cli()
            .lookup(&ResourceReference::new(ResourceKind::Api, "container.googleapis.com"))
            .unwrap();
        let Lookup::NonEmpty(argv) = lookup else {
            panic!("expected list lookup");
        };
        assert!(argv.contains(&"--filter=config.name=container.googleapis.com".to_string()));
        assert!(argv.contains(&"--project=demo-1".to_string()));
    }

    #[test]
    fn test_binding_lookup_and_create() {
        let member = "serviceAccount:travel-agents-sa@demo-1.iam.gserviceaccount.com";
        let reference = ResourceReference::iam_binding("roles/aiplatform.user", member);

        let Lookup::NonEmpty(argv) = cli().lookup(&reference).unwrap() else {
            panic!("expected list lookup");
        };
        assert_eq!(argv[2], "demo-1");
        assert!(argv.contains(&format!(
            "--filter=bindings.role=roles/aiplatform.user AND bindings.members={member}"
        )));

        let desired = DesiredResource::new(
            reference,
            ResourceSpec::IamBinding {
                role: "roles/aiplatform.user".into(),
                member: member.into(),
            },
        );
        let argv = cli().create_args(&desired).unwrap();
        assert_eq!(&argv[..3], ["projects", "add-iam-policy-binding", "demo-1"]);
        assert!(argv.contains(&"--role=roles/aiplatform.user".to_string()));
    }

    #[test]
    fn test_service_account_create_uses_account_id() {
        let desired = DesiredResource::new(
            ResourceReference::new(
                ResourceKind::ServiceAccount,
                "travel-agents-sa@demo-1.iam.gserviceaccount.com",
            ),
            ResourceSpec::ServiceAccount {
                display_name: "Travel Agents".into(),
            },
        );
        let argv = cli().create_args(&desired).unwrap();
        assert_eq!(argv[3], "travel-agents-sa");
        assert!(argv.contains(&"--display-name=Travel Agents".to_string()));
    }

    #[test]
    fn test_cluster_create_args() {
        let desired = DesiredResource::new(
            ResourceReference::new(ResourceKind::Cluster, "us-central1/travel-agents-cluster"),
            ResourceSpec::Cluster(ClusterSpec {
                location: "us-central1".into(),
                node_count: 2,
                machine_type: "e2-standard-4".into(),
                node_service_account: "travel-agents-sa@demo-1.iam.gserviceaccount.com".into(),
            }),
        );
        let argv = cli().create_args(&desired).unwrap();
        assert_eq!(argv[3], "travel-agents-cluster");
        assert!(argv.contains(&"--num-nodes=2".to_string()));
        assert!(argv.contains(&"--workload-pool=demo-1.svc.id.goog".to_string()));
    }

    #[test]
    fn test_credentials_lookup_uses_kubectl() {
        let lookup = cli()
            .lookup(&ResourceReference::new(
                ResourceKind::ClusterCredentials,
                "us-central1/travel-agents-cluster",
            ))
            .unwrap();
        assert!(matches!(lookup, Lookup::KubeContext(ref argv)
            if argv[2] == "gke_demo-1_us-central1_travel-agents-cluster"));
    }

    #[test]
    fn test_rejects_cluster_scoped_kinds() {
        let err = cli()
            .lookup(&ResourceReference::new(ResourceKind::Namespace, "adk-travel"))
            .unwrap_err();
        assert!(matches!(err, ProvisionError::ConfigurationInvalid(_)));
    }
}
