//! Deployment configuration and the immutable execution context.
//!
//! [`DeployConfig`] is what operators write (a TOML file plus CLI overrides).
//! [`DeployContext`] is the validated, read-only view every step receives.
//! All resource names live here, in one table, so steps never hard-code them.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ProvisionError;
use crate::retry::RetryConfig;

/// A workload deployed into the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Kubernetes name of the deployment and service.
    pub name: String,
    /// Image name inside the artifact repository.
    pub image: String,
    /// Docker build context directory.
    pub context_dir: PathBuf,
    /// Container port serving HTTP.
    pub port: u16,
    /// Port exposing Prometheus metrics, if any.
    pub metrics_port: Option<u16>,
    /// Desired replica count.
    pub replicas: i32,
    /// HTTP path used for readiness and liveness checks.
    pub health_path: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "travel-adk-coordinator".into(),
            image: "travel-adk-coordinator".into(),
            context_dir: PathBuf::from("."),
            port: 8080,
            metrics_port: Some(8090),
            replicas: 1,
            health_path: "/health".into(),
        }
    }
}

/// Optional managed SQL instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudSqlConfig {
    /// Instance name.
    pub instance_name: String,
    /// Machine tier.
    pub tier: String,
    /// Engine version.
    pub database_version: String,
}

impl Default for CloudSqlConfig {
    fn default() -> Self {
        Self {
            instance_name: "travel-agents-db".into(),
            tier: "db-f1-micro".into(),
            database_version: "POSTGRES_15".into(),
        }
    }
}

/// Polling settings for readiness waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Seconds between predicate invocations.
    pub interval_secs: u64,
    /// Total seconds to wait before giving up.
    pub timeout_secs: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            timeout_secs: 300,
        }
    }
}

impl ReadinessConfig {
    /// Polling interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Overall timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Full deployment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    // Target identity
    /// Cloud project identifier.
    pub project_id: String,
    /// Region for the cluster, repository and SQL instance.
    pub region: String,
    /// Managed cluster name.
    pub cluster_name: String,

    // Cloud setup
    /// APIs that must be enabled on the project.
    pub apis: Vec<String>,
    /// Service account id (the part before `@`).
    pub service_account: String,
    /// Roles granted to the service account.
    pub roles: Vec<String>,
    /// Artifact repository name.
    pub repository: String,
    /// Nodes per zone.
    pub node_count: u32,
    /// Node machine type.
    pub machine_type: String,
    /// Optional SQL instance; absent means none is provisioned.
    pub cloud_sql: Option<CloudSqlConfig>,

    // Cluster contents
    /// Namespace all workloads run in.
    pub namespace: String,
    /// Name of the application config map.
    pub config_map_name: String,
    /// Name of the secret holding the service account key.
    pub secret_name: String,
    /// Extra key/values published in the config map.
    pub app_config: BTreeMap<String, String>,
    /// Workloads to build, push and deploy.
    pub services: Vec<ServiceConfig>,
    /// Tag applied to every pushed image.
    pub image_tag: String,

    // Behaviour
    /// Directory for generated files (credentials, variables, summary).
    pub output_dir: PathBuf,
    /// Readiness polling settings.
    pub readiness: ReadinessConfig,
    /// Attempts for steps that talk to eventually consistent systems.
    pub retry_attempts: u32,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            region: "us-central1".into(),
            cluster_name: "travel-agents-cluster".into(),
            apis: vec![
                "container.googleapis.com".into(),
                "artifactregistry.googleapis.com".into(),
                "aiplatform.googleapis.com".into(),
                "iam.googleapis.com".into(),
                "secretmanager.googleapis.com".into(),
            ],
            service_account: "travel-agents-sa".into(),
            roles: vec![
                "roles/aiplatform.user".into(),
                "roles/secretmanager.secretAccessor".into(),
                "roles/logging.logWriter".into(),
                "roles/monitoring.metricWriter".into(),
                "roles/artifactregistry.reader".into(),
            ],
            repository: "travel-agents".into(),
            node_count: 2,
            machine_type: "e2-standard-4".into(),
            cloud_sql: None,
            namespace: "adk-travel".into(),
            config_map_name: "travel-agents-config".into(),
            secret_name: "travel-agents-sa-key".into(),
            app_config: BTreeMap::new(),
            services: vec![ServiceConfig::default()],
            image_tag: "latest".into(),
            output_dir: PathBuf::from("."),
            readiness: ReadinessConfig::default(),
            retry_attempts: 5,
        }
    }
}

impl DeployConfig {
    /// Create config with sensible defaults for a given project.
    #[must_use]
    pub fn with_defaults(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationInvalid` if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ProvisionError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProvisionError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        toml::from_str(&content)
            .map_err(|e| ProvisionError::config(format!("{}: {e}", path.display())))
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationInvalid` on malformed input.
    pub fn from_toml(content: &str) -> Result<Self, ProvisionError> {
        toml::from_str(content).map_err(|e| ProvisionError::config(e.to_string()))
    }

    /// Check every field, collecting all problems into one error.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationInvalid` listing every problem found.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        let mut problems = Vec::new();

        if !is_project_id(&self.project_id) {
            problems.push(format!(
                "project id '{}' must be 6-30 lowercase letters, digits or hyphens, starting with a letter",
                self.project_id
            ));
        }
        if !is_region(&self.region) {
            problems.push(format!("region '{}' is not a valid region name", self.region));
        }
        if !is_dns_label(&self.cluster_name) || self.cluster_name.len() > 40 {
            problems.push(format!(
                "cluster name '{}' must be a DNS label of at most 40 characters",
                self.cluster_name
            ));
        }
        if !is_service_account_id(&self.service_account) {
            problems.push(format!(
                "service account id '{}' must be 6-30 lowercase letters, digits or hyphens",
                self.service_account
            ));
        }
        for api in &self.apis {
            if !api.ends_with(".googleapis.com") {
                problems.push(format!("api '{api}' must end with .googleapis.com"));
            }
        }
        for role in &self.roles {
            if !role.starts_with("roles/") {
                problems.push(format!("role '{role}' must start with roles/"));
            }
        }
        if !is_dns_label(&self.repository) {
            problems.push(format!("repository '{}' is not a valid name", self.repository));
        }
        if self.node_count == 0 {
            problems.push("node_count must be at least 1".into());
        }
        for (field, value) in [
            ("namespace", &self.namespace),
            ("config_map_name", &self.config_map_name),
            ("secret_name", &self.secret_name),
        ] {
            if !is_dns_label(value) {
                problems.push(format!("{field} '{value}' is not a valid DNS label"));
            }
        }
        if self.image_tag.is_empty() || self.image_tag.contains(&[':', '/', ' '][..]) {
            problems.push(format!("image tag '{}' is not a valid tag", self.image_tag));
        }
        if let Some(sql) = &self.cloud_sql {
            if !is_dns_label(&sql.instance_name) {
                problems.push(format!(
                    "cloud sql instance '{}' is not a valid name",
                    sql.instance_name
                ));
            }
        }

        if self.services.is_empty() {
            problems.push("at least one service must be configured".into());
        }
        let mut seen = HashSet::new();
        for service in &self.services {
            if !is_dns_label(&service.name) {
                problems.push(format!("service name '{}' is not a valid DNS label", service.name));
            }
            if !seen.insert(service.name.as_str()) {
                problems.push(format!("service name '{}' is used twice", service.name));
            }
            if service.image.is_empty() {
                problems.push(format!("service '{}' has no image name", service.name));
            }
            if service.port == 0 {
                problems.push(format!("service '{}' has port 0", service.name));
            }
            if service.replicas < 1 {
                problems.push(format!("service '{}' needs at least one replica", service.name));
            }
            if !service.health_path.starts_with('/') {
                problems.push(format!(
                    "service '{}' health path must start with /",
                    service.name
                ));
            }
        }

        if self.readiness.interval_secs == 0 {
            problems.push("readiness interval must be positive".into());
        } else if self.readiness.timeout_secs < self.readiness.interval_secs {
            problems.push("readiness timeout must be at least one interval".into());
        }
        if self.retry_attempts == 0 {
            problems.push("retry_attempts must be at least 1".into());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ProvisionError::config(problems.join("; ")))
        }
    }
}

fn is_dns_label(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 63
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !s.starts_with('-')
        && !s.ends_with('-')
}

fn is_project_id(s: &str) -> bool {
    (6..=30).contains(&s.len())
        && s.starts_with(|c: char| c.is_ascii_lowercase())
        && is_dns_label(s)
}

fn is_service_account_id(s: &str) -> bool {
    is_project_id(s)
}

fn is_region(s: &str) -> bool {
    match s.split_once('-') {
        Some((area, rest)) => {
            !area.is_empty()
                && area.chars().all(|c| c.is_ascii_lowercase())
                && rest.ends_with(|c: char| c.is_ascii_digit())
                && rest
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        }
        None => false,
    }
}

/// Validated, immutable execution context passed to every step.
#[derive(Debug, Clone)]
pub struct DeployContext {
    config: DeployConfig,
}

impl DeployContext {
    /// Validate a configuration into a context.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationInvalid` if validation fails.
    pub fn new(config: DeployConfig) -> Result<Self, ProvisionError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The underlying configuration.
    #[must_use]
    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    /// Human-readable target identifier.
    #[must_use]
    pub fn target(&self) -> String {
        format!(
            "{}/{}/{}",
            self.config.project_id, self.config.region, self.config.cluster_name
        )
    }

    /// Email of the deployment service account.
    #[must_use]
    pub fn service_account_email(&self) -> String {
        format!(
            "{}@{}.iam.gserviceaccount.com",
            self.config.service_account, self.config.project_id
        )
    }

    /// IAM member string of the deployment service account.
    #[must_use]
    pub fn service_account_member(&self) -> String {
        format!("serviceAccount:{}", self.service_account_email())
    }

    /// Docker registry host for the configured region.
    #[must_use]
    pub fn registry_host(&self) -> String {
        format!("{}-docker.pkg.dev", self.config.region)
    }

    /// Fully qualified, tagged image URI for a service.
    #[must_use]
    pub fn image_uri(&self, service: &ServiceConfig) -> String {
        format!(
            "{}/{}/{}/{}:{}",
            self.registry_host(),
            self.config.project_id,
            self.config.repository,
            service.image,
            self.config.image_tag
        )
    }

    /// Name of the kube context written by the credentials step.
    #[must_use]
    pub fn kube_context(&self) -> String {
        format!(
            "gke_{}_{}_{}",
            self.config.project_id, self.config.region, self.config.cluster_name
        )
    }

    /// Path of the generated service account key.
    #[must_use]
    pub fn credentials_path(&self) -> PathBuf {
        self.config
            .output_dir
            .join(format!("{}-key.json", self.config.service_account))
    }

    /// Path of the generated infrastructure variables file.
    #[must_use]
    pub fn variables_path(&self) -> PathBuf {
        self.config.output_dir.join("terraform.tfvars")
    }

    /// Path of the human-readable summary report.
    #[must_use]
    pub fn summary_path(&self) -> PathBuf {
        self.config.output_dir.join("deployment-summary.txt")
    }

    /// Retry policy for eventually consistent steps.
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.config.retry_attempts,
            ..RetryConfig::default()
        }
    }
}
