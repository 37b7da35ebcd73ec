//! The provisioning step abstraction.
//!
//! A step is an idempotence guard (`check`) plus a single mutation (`apply`).
//! `apply` only runs when `check` reports the step is not yet satisfied.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::config::DeployContext;
use crate::error::ProvisionError;
use crate::readiness;
use crate::retry::RetryConfig;

/// Boxed idempotence guard.
pub type CheckFn =
    Box<dyn Fn(&DeployContext) -> BoxFuture<'static, Result<bool, ProvisionError>> + Send + Sync>;

/// Boxed mutation.
pub type ApplyFn =
    Box<dyn Fn(&DeployContext) -> BoxFuture<'static, Result<(), ProvisionError>> + Send + Sync>;

/// One idempotent provisioning step.
#[async_trait]
pub trait ProvisioningStep: Send + Sync {
    /// Unique step name.
    fn name(&self) -> &str;

    /// Human-readable description for progress output.
    fn description(&self) -> &str {
        self.name()
    }

    /// Names of earlier steps that must have completed.
    fn depends_on(&self) -> Vec<&str> {
        Vec::new()
    }

    /// A best-effort step's failure is tolerated and the run continues.
    fn best_effort(&self) -> bool {
        false
    }

    /// Retry policy for `apply` against eventually consistent systems.
    fn retry_policy(&self) -> Option<RetryConfig> {
        None
    }

    /// Whether the step's effect is already in place.
    async fn check(&self, ctx: &DeployContext) -> Result<bool, ProvisionError>;

    /// Perform the step's mutation. Only called when `check` returned false.
    async fn apply(&self, ctx: &DeployContext) -> Result<(), ProvisionError>;
}

/// A step assembled from closures.
pub struct FnStep {
    name: String,
    description: Option<String>,
    depends_on: Vec<String>,
    best_effort: bool,
    retry: Option<RetryConfig>,
    check: CheckFn,
    apply: ApplyFn,
}

impl FnStep {
    /// Build a step from a check and an apply closure.
    pub fn new<C, CF, A, AF>(name: impl Into<String>, check: C, apply: A) -> Self
    where
        C: Fn(&DeployContext) -> CF + Send + Sync + 'static,
        CF: Future<Output = Result<bool, ProvisionError>> + Send + 'static,
        A: Fn(&DeployContext) -> AF + Send + Sync + 'static,
        AF: Future<Output = Result<(), ProvisionError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: None,
            depends_on: Vec::new(),
            best_effort: false,
            retry: None,
            check: Box::new(
                move |ctx: &DeployContext| -> BoxFuture<'static, Result<bool, ProvisionError>> {
                    Box::pin(check(ctx))
                },
            ),
            apply: Box::new(
                move |ctx: &DeployContext| -> BoxFuture<'static, Result<(), ProvisionError>> {
                    Box::pin(apply(ctx))
                },
            ),
        }
    }

    /// Set the progress description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declare dependencies on earlier steps.
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(names.into_iter().map(Into::into));
        self
    }

    /// Tolerate failure of this step.
    #[must_use]
    pub fn tolerate_failure(mut self) -> Self {
        self.best_effort = true;
        self
    }

    /// Retry transient `apply` failures.
    #[must_use]
    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }
}

#[async_trait]
impl ProvisioningStep for FnStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.name)
    }

    fn depends_on(&self) -> Vec<&str> {
        self.depends_on.iter().map(String::as_str).collect()
    }

    fn best_effort(&self) -> bool {
        self.best_effort
    }

    fn retry_policy(&self) -> Option<RetryConfig> {
        self.retry.clone()
    }

    async fn check(&self, ctx: &DeployContext) -> Result<bool, ProvisionError> {
        (self.check)(ctx).await
    }

    async fn apply(&self, ctx: &DeployContext) -> Result<(), ProvisionError> {
        (self.apply)(ctx).await
    }
}

/// A step that waits for a readiness predicate.
///
/// Its `check` never reports satisfied: waiting is an observation, not a
/// mutation, so it is re-done on every run.
pub struct WaitForReadiness {
    name: String,
    what: String,
    depends_on: Vec<String>,
    interval: Duration,
    timeout: Duration,
    predicate: CheckFn,
}

impl WaitForReadiness {
    /// Build a wait over `predicate`, polled every `interval` up to `timeout`.
    pub fn new<P, PF>(
        name: impl Into<String>,
        what: impl Into<String>,
        interval: Duration,
        timeout: Duration,
        predicate: P,
    ) -> Self
    where
        P: Fn(&DeployContext) -> PF + Send + Sync + 'static,
        PF: Future<Output = Result<bool, ProvisionError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            what: what.into(),
            depends_on: Vec::new(),
            interval,
            timeout,
            predicate: Box::new(
                move |ctx: &DeployContext| -> BoxFuture<'static, Result<bool, ProvisionError>> {
                    Box::pin(predicate(ctx))
                },
            ),
        }
    }

    /// Declare dependencies on earlier steps.
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(names.into_iter().map(Into::into));
        self
    }
}

#[async_trait]
impl ProvisioningStep for WaitForReadiness {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.what
    }

    fn depends_on(&self) -> Vec<&str> {
        self.depends_on.iter().map(String::as_str).collect()
    }

    async fn check(&self, _ctx: &DeployContext) -> Result<bool, ProvisionError> {
        Ok(false)
    }

    async fn apply(&self, ctx: &DeployContext) -> Result<(), ProvisionError> {
        readiness::poll_until(&self.what, self.interval, self.timeout, || (self.predicate)(ctx))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeployConfig;

    fn ctx() -> DeployContext {
        DeployContext::new(DeployConfig::with_defaults("demo-project")).unwrap()
    }

    #[tokio::test]
    async fn test_fn_step_delegates_to_closures() {
        let step = FnStep::new(
            "create-namespace",
            |ctx: &DeployContext| {
                let ns = ctx.config().namespace.clone();
                async move { Ok(ns == "adk-travel") }
            },
            |_: &DeployContext| async { Ok(()) },
        )
        .with_description("Creating namespace")
        .with_dependencies(["cluster-credentials"]);

        assert_eq!(step.name(), "create-namespace");
        assert_eq!(step.description(), "Creating namespace");
        assert_eq!(step.depends_on(), vec!["cluster-credentials"]);
        assert!(!step.best_effort());
        assert!(step.retry_policy().is_none());
        assert!(step.check(&ctx()).await.unwrap());
        assert!(step.apply(&ctx()).await.is_ok());
    }

    #[tokio::test]
    async fn test_fn_step_builders() {
        let step = FnStep::new(
            "report",
            |_: &DeployContext| async { Ok(false) },
            |_: &DeployContext| async { Ok(()) },
        )
        .tolerate_failure()
        .with_retry(RetryConfig::with_max_attempts(2));

        assert!(step.best_effort());
        assert_eq!(step.retry_policy().unwrap().max_attempts, 2);
        assert_eq!(step.description(), "report");
    }

    #[tokio::test]
    async fn test_wait_step_never_checks_satisfied() {
        let step = WaitForReadiness::new(
            "wait-rollout",
            "Waiting for rollout",
            Duration::from_secs(1),
            Duration::from_secs(1),
            |_: &DeployContext| async { Ok(true) },
        );
        assert!(!step.check(&ctx()).await.unwrap());
        assert!(step.apply(&ctx()).await.is_ok());
    }
}
