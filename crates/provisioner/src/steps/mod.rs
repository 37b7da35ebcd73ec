//! Concrete provisioning steps for the travel agents deployment.

pub mod files;
pub mod images;
pub mod resources;
pub mod workloads;

pub use files::{ServiceAccountKey, WriteVariables};
pub use images::{PushImages, RegistryAuth};
pub use resources::{CredentialsSecret, EnsureResources};
pub use workloads::{wait_for_rollout, ApplyWorkloads};
