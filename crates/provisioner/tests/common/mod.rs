//! In-memory stand-in for the cloud project, registry and cluster.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use provisioner::backend::{
    ApplyAction, ImageRegistry, ManifestApplier, ObjectApplyStatus, ResourceApi, RolloutStatus,
};
use provisioner::resource::{DesiredResource, ResourceKind, ResourceReference};
use provisioner::{Backends, DeployConfig, DeployContext, ProvisionError};

type ErrorFactory = fn(String) -> ProvisionError;

struct Injected {
    remaining: u32,
    error: ErrorFactory,
}

#[derive(Default)]
struct State {
    resources: HashSet<ResourceReference>,
    creates: Vec<ResourceReference>,
    create_failures: HashMap<ResourceKind, Injected>,
    keys_created: u32,
    live_manifest: Option<String>,
    manifest_applies: u32,
    authenticated: HashSet<String>,
    images: HashSet<String>,
    pushes: Vec<(String, PathBuf)>,
    ready_after: u32,
    rollout_polls: u32,
}

/// A fake project that remembers everything created against it.
#[derive(Default)]
pub struct FakeCloud {
    state: Mutex<State>,
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Mark a resource as already present.
    pub fn seed(&self, reference: ResourceReference) {
        self.state().resources.insert(reference);
    }

    /// Fail the next `times` creates of `kind` with `error`.
    pub fn fail_create(&self, kind: ResourceKind, times: u32, error: ErrorFactory) {
        self.state().create_failures.insert(
            kind,
            Injected {
                remaining: times,
                error,
            },
        );
    }

    /// Report the rollout ready only after `polls` unready polls.
    pub fn ready_after(&self, polls: u32) {
        self.state().ready_after = polls;
    }

    pub fn has(&self, reference: &ResourceReference) -> bool {
        self.state().resources.contains(reference)
    }

    pub fn creates(&self) -> Vec<ResourceReference> {
        self.state().creates.clone()
    }

    pub fn creates_of(&self, kind: ResourceKind) -> usize {
        self.state().creates.iter().filter(|r| r.kind == kind).count()
    }

    pub fn keys_created(&self) -> u32 {
        self.state().keys_created
    }

    pub fn manifest_applies(&self) -> u32 {
        self.state().manifest_applies
    }

    pub fn pushes(&self) -> Vec<String> {
        self.state().pushes.iter().map(|(image, _)| image.clone()).collect()
    }

    pub fn rollout_polls(&self) -> u32 {
        self.state().rollout_polls
    }

    /// Collaborators wired to this fake.
    pub fn backends(self: &Arc<Self>) -> Backends {
        Backends {
            resources: self.clone(),
            manifests: self.clone(),
            registry: self.clone(),
            rollout: self.clone(),
        }
    }
}

#[async_trait]
impl ResourceApi for FakeCloud {
    async fn exists(&self, reference: &ResourceReference) -> Result<bool, ProvisionError> {
        Ok(self.has(reference))
    }

    async fn create(&self, desired: &DesiredResource) -> Result<(), ProvisionError> {
        let mut state = self.state();
        let reference = desired.reference.clone();

        if let Some(injected) = state.create_failures.get_mut(&reference.kind) {
            if injected.remaining > 0 {
                injected.remaining -= 1;
                return Err((injected.error)(reference.to_string()));
            }
        }
        if !state.resources.insert(reference.clone()) {
            return Err(ProvisionError::AlreadyExists(reference.to_string()));
        }
        state.creates.push(reference);
        Ok(())
    }

    async fn create_key(&self, account_email: &str) -> Result<Vec<u8>, ProvisionError> {
        let mut state = self.state();
        state.keys_created += 1;
        Ok(format!(
            r#"{{"type":"service_account","client_email":"{account_email}","private_key_id":"key-{}"}}"#,
            state.keys_created
        )
        .into_bytes())
    }
}

#[async_trait]
impl ManifestApplier for FakeCloud {
    async fn is_current(&self, yaml: &str) -> Result<bool, ProvisionError> {
        Ok(self.state().live_manifest.as_deref() == Some(yaml))
    }

    async fn apply(&self, yaml: &str) -> Result<Vec<ObjectApplyStatus>, ProvisionError> {
        let mut state = self.state();
        let action = if state.live_manifest.is_some() {
            ApplyAction::Configured
        } else {
            ApplyAction::Created
        };
        state.live_manifest = Some(yaml.to_string());
        state.manifest_applies += 1;

        Ok(yaml
            .split("---\n")
            .filter(|doc| !doc.trim().is_empty())
            .enumerate()
            .map(|(i, _)| ObjectApplyStatus {
                object: format!("object-{i}"),
                action,
            })
            .collect())
    }
}

#[async_trait]
impl ImageRegistry for FakeCloud {
    async fn is_authenticated(&self, host: &str) -> Result<bool, ProvisionError> {
        Ok(self.state().authenticated.contains(host))
    }

    async fn authenticate(&self, host: &str) -> Result<(), ProvisionError> {
        self.state().authenticated.insert(host.to_string());
        Ok(())
    }

    async fn has_image(&self, image: &str) -> Result<bool, ProvisionError> {
        Ok(self.state().images.contains(image))
    }

    async fn push(&self, image: &str, context_dir: &Path) -> Result<(), ProvisionError> {
        let mut state = self.state();
        state.images.insert(image.to_string());
        state
            .pushes
            .push((image.to_string(), context_dir.to_path_buf()));
        Ok(())
    }
}

#[async_trait]
impl RolloutStatus for FakeCloud {
    async fn is_ready(&self, _namespace: &str, _deployment: &str) -> Result<bool, ProvisionError> {
        let mut state = self.state();
        state.rollout_polls += 1;
        Ok(state.rollout_polls > state.ready_after)
    }
}

/// Context for `project` with all generated files under `output_dir`.
pub fn context(project: &str, output_dir: &Path) -> DeployContext {
    let mut config = DeployConfig::with_defaults(project);
    config.output_dir = output_dir.to_path_buf();
    config.readiness.interval_secs = 5;
    config.readiness.timeout_secs = 30;
    DeployContext::new(config).unwrap()
}
