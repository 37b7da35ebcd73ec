//! CLI subcommands.

pub mod deploy;
pub mod plan;
pub mod status;

use std::path::PathBuf;

use clap::Args;
use provisioner::{DeployConfig, DeployContext, ProvisionError};

/// Exit code for configuration and prerequisite errors.
pub const EXIT_CONFIG: u8 = 2;

/// Exit code for any other error.
pub const EXIT_FAILURE: u8 = 1;

/// Map a command error to the process exit code.
///
/// Configuration problems exit with [`EXIT_CONFIG`] wherever they sit in
/// the context chain; everything else exits with [`EXIT_FAILURE`].
pub fn exit_code(err: &anyhow::Error) -> u8 {
    let invalid_config = err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<ProvisionError>(),
            Some(ProvisionError::ConfigurationInvalid(_))
        )
    });
    if invalid_config {
        EXIT_CONFIG
    } else {
        EXIT_FAILURE
    }
}

/// Target selection shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Cloud project id (overrides the config file).
    #[arg(value_name = "PROJECT", env = "PROVISION_PROJECT")]
    pub project: Option<String>,

    /// Region for the cluster and registry.
    #[arg(value_name = "REGION", env = "PROVISION_REGION")]
    pub region: Option<String>,

    /// Cluster name.
    #[arg(value_name = "CLUSTER", env = "PROVISION_CLUSTER")]
    pub cluster: Option<String>,

    /// Configuration file path (TOML).
    #[arg(short, long, value_name = "FILE", env = "PROVISION_CONFIG")]
    pub config: Option<PathBuf>,

    /// Namespace the workloads run in.
    #[arg(long)]
    pub namespace: Option<String>,

    /// Directory for generated files.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Image tag to build, push and deploy.
    #[arg(long)]
    pub tag: Option<String>,
}

impl TargetArgs {
    /// Merge the config file (if any) with command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationInvalid` if the file is unreadable or the merged
    /// configuration fails validation.
    pub fn config(&self) -> Result<DeployConfig, ProvisionError> {
        let mut config = match &self.config {
            Some(path) => DeployConfig::load(path)?,
            None => DeployConfig::default(),
        };

        if let Some(project) = &self.project {
            config.project_id.clone_from(project);
        }
        if let Some(region) = &self.region {
            config.region.clone_from(region);
        }
        if let Some(cluster) = &self.cluster {
            config.cluster_name.clone_from(cluster);
        }
        if let Some(namespace) = &self.namespace {
            config.namespace.clone_from(namespace);
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir.clone_from(dir);
        }
        if let Some(tag) = &self.tag {
            config.image_tag.clone_from(tag);
        }

        if config.project_id.is_empty() {
            return Err(ProvisionError::config(
                "no project id given (pass PROJECT, set PROVISION_PROJECT or project_id in the config file)",
            ));
        }
        Ok(config)
    }

    /// Build the validated execution context.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationInvalid` on any configuration problem.
    pub fn context(&self) -> Result<DeployContext, ProvisionError> {
        DeployContext::new(self.config()?)
    }
}
