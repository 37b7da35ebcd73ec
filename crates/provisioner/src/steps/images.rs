//! Registry authentication and image publishing.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::backend::ImageRegistry;
use crate::config::DeployContext;
use crate::error::ProvisionError;
use crate::step::ProvisioningStep;

/// Configures docker credentials for the regional registry.
pub struct RegistryAuth {
    registry: Arc<dyn ImageRegistry>,
}

impl RegistryAuth {
    pub fn new(registry: Arc<dyn ImageRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ProvisioningStep for RegistryAuth {
    fn name(&self) -> &str {
        "registry-auth"
    }

    fn description(&self) -> &str {
        "Configuring registry authentication"
    }

    fn depends_on(&self) -> Vec<&str> {
        vec!["artifact-repository"]
    }

    async fn check(&self, ctx: &DeployContext) -> Result<bool, ProvisionError> {
        self.registry.is_authenticated(&ctx.registry_host()).await
    }

    async fn apply(&self, ctx: &DeployContext) -> Result<(), ProvisionError> {
        self.registry.authenticate(&ctx.registry_host()).await
    }
}

/// Builds and pushes every service image missing from the registry.
pub struct PushImages {
    registry: Arc<dyn ImageRegistry>,
}

impl PushImages {
    pub fn new(registry: Arc<dyn ImageRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ProvisioningStep for PushImages {
    fn name(&self) -> &str {
        "push-images"
    }

    fn description(&self) -> &str {
        "Building and pushing images"
    }

    fn depends_on(&self) -> Vec<&str> {
        vec!["registry-auth"]
    }

    async fn check(&self, ctx: &DeployContext) -> Result<bool, ProvisionError> {
        for service in &ctx.config().services {
            if !self.registry.has_image(&ctx.image_uri(service)).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn apply(&self, ctx: &DeployContext) -> Result<(), ProvisionError> {
        for service in &ctx.config().services {
            let image = ctx.image_uri(service);
            if self.registry.has_image(&image).await? {
                debug!(image = %image, "Already pushed");
                continue;
            }
            self.registry.push(&image, &service.context_dir).await?;
            info!(image = %image, "Pushed");
        }
        Ok(())
    }
}
