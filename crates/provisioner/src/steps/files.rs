//! Steps that produce local files.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::artifacts::{self, WriteOutcome};
use crate::backend::ResourceApi;
use crate::config::DeployContext;
use crate::error::ProvisionError;
use crate::step::ProvisioningStep;

/// Creates a service account key and stores it in the output directory.
///
/// Satisfied as long as a non-empty key file exists; a new key is only
/// minted when the file is absent or empty.
pub struct ServiceAccountKey {
    resources: Arc<dyn ResourceApi>,
}

impl ServiceAccountKey {
    pub fn new(resources: Arc<dyn ResourceApi>) -> Self {
        Self { resources }
    }
}

#[async_trait]
impl ProvisioningStep for ServiceAccountKey {
    fn name(&self) -> &str {
        "service-account-key"
    }

    fn description(&self) -> &str {
        "Creating service account key"
    }

    fn depends_on(&self) -> Vec<&str> {
        vec!["service-account"]
    }

    async fn check(&self, ctx: &DeployContext) -> Result<bool, ProvisionError> {
        artifacts::is_present(&ctx.credentials_path())
    }

    async fn apply(&self, ctx: &DeployContext) -> Result<(), ProvisionError> {
        let key = self
            .resources
            .create_key(&ctx.service_account_email())
            .await?;
        match artifacts::write_secret_once(&ctx.credentials_path(), &key)? {
            WriteOutcome::Written => Ok(()),
            WriteOutcome::LeftUntouched => {
                warn!("A key file appeared while a new key was created; the new key was discarded");
                Err(ProvisionError::AlreadyExists(
                    ctx.credentials_path().display().to_string(),
                ))
            }
        }
    }
}

/// Writes the infrastructure variables file.
pub struct WriteVariables;

#[async_trait]
impl ProvisioningStep for WriteVariables {
    fn name(&self) -> &str {
        "write-variables"
    }

    fn description(&self) -> &str {
        "Writing infrastructure variables"
    }

    fn depends_on(&self) -> Vec<&str> {
        vec!["service-account"]
    }

    async fn check(&self, ctx: &DeployContext) -> Result<bool, ProvisionError> {
        artifacts::is_present(&ctx.variables_path())
    }

    async fn apply(&self, ctx: &DeployContext) -> Result<(), ProvisionError> {
        let contents = artifacts::render_variables(ctx);
        match artifacts::write_once(&ctx.variables_path(), contents.as_bytes())? {
            WriteOutcome::Written => Ok(()),
            WriteOutcome::LeftUntouched => Err(ProvisionError::AlreadyExists(
                ctx.variables_path().display().to_string(),
            )),
        }
    }
}
