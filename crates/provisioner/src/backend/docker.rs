//! Image build and push through the `docker` CLI.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use super::command::{args, run, run_checked};
use super::ImageRegistry;
use crate::error::ProvisionError;

const DOCKER: &str = "docker";
const GCLOUD: &str = "gcloud";

/// Platform GKE nodes run.
const TARGET_PLATFORM: &str = "linux/amd64";

/// `docker` backend with `gcloud` as the credential helper.
#[derive(Debug, Clone)]
pub struct DockerCli {
    config_path: Option<PathBuf>,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCli {
    /// Backend reading `~/.docker/config.json` for registry auth.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config_path: dirs::home_dir().map(|h| h.join(".docker").join("config.json")),
        }
    }

    /// Backend reading registry auth from a specific file.
    pub fn with_config(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }
}

/// Whether a docker `config.json` has credentials or a helper for `host`.
#[must_use]
pub fn config_covers_host(config: &serde_json::Value, host: &str) -> bool {
    let has_key = |section: &str| {
        config
            .get(section)
            .and_then(serde_json::Value::as_object)
            .is_some_and(|entries| {
                entries
                    .keys()
                    .any(|k| k.trim_start_matches("https://") == host)
            })
    };
    has_key("credHelpers") || has_key("auths")
}

#[async_trait]
impl ImageRegistry for DockerCli {
    async fn is_authenticated(&self, host: &str) -> Result<bool, ProvisionError> {
        let Some(path) = &self.config_path else {
            return Ok(false);
        };
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let config: serde_json::Value = serde_json::from_str(&content)?;
        Ok(config_covers_host(&config, host))
    }

    async fn authenticate(&self, host: &str) -> Result<(), ProvisionError> {
        info!(host = %host, "Configuring docker credential helper");
        run_checked(GCLOUD, &args(["auth", "configure-docker", host, "--quiet"]), None).await?;
        Ok(())
    }

    async fn has_image(&self, image: &str) -> Result<bool, ProvisionError> {
        let output = run(DOCKER, &args(["manifest", "inspect", image]), None).await?;
        if output.success() {
            return Ok(true);
        }
        if output.stderr.to_lowercase().contains("no such manifest") {
            debug!(image = %image, "Image not in registry");
            return Ok(false);
        }
        match ProvisionError::from_tool_output(DOCKER, &output.stderr) {
            ProvisionError::NotFound(_) => Ok(false),
            e => Err(e),
        }
    }

    async fn push(&self, image: &str, context_dir: &Path) -> Result<(), ProvisionError> {
        info!(image = %image, context = %context_dir.display(), "Building image");
        run_checked(
            DOCKER,
            &args([
                "build",
                &format!("--platform={TARGET_PLATFORM}"),
                "-t",
                image,
                &context_dir.display().to_string(),
            ]),
            None,
        )
        .await?;

        info!(image = %image, "Pushing image");
        run_checked(DOCKER, &args(["push", image]), None).await?;
        Ok(())
    }
}
