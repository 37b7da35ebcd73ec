//! Idempotent provisioning for the travel agents demo on GKE.
//!
//! A [`Reconciler`] walks an ordered list of [`ProvisioningStep`]s. Each step
//! first checks whether its target state already holds and only mutates
//! something when it does not, so re-running against a converged project
//! changes nothing. The first failure stops the run; best-effort steps are
//! recorded and skipped past.
//!
//! # Example
//!
//! ```ignore
//! use provisioner::{plan, Backends, DeployConfig, DeployContext};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let ctx = DeployContext::new(DeployConfig::with_defaults("my-project"))?;
//!     let backends = Backends::live(&ctx);
//!     let report = plan::standard_plan(&ctx, &backends)?.run(&ctx).await;
//!     println!("{}", report.render_summary());
//!     Ok(())
//! }
//! ```

// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]
// Allow async functions that don't use await (trait impls and mocks)
#![allow(clippy::unused_async)]
// Allow imports after statements in functions
#![allow(clippy::items_after_statements)]

pub mod artifacts;
pub mod backend;
pub mod config;
pub mod error;
pub mod manifest;
pub mod plan;
pub mod prereq;
pub mod readiness;
pub mod reconciler;
pub mod report;
pub mod resource;
pub mod retry;
pub mod step;
pub mod steps;
pub mod ui;

// Re-export commonly used types at the crate root
pub use backend::Backends;
pub use config::{DeployConfig, DeployContext};
pub use error::{ErrorKind, ProvisionError};
pub use reconciler::Reconciler;
pub use report::{RunReport, RunResult, StepOutcome};
pub use step::{FnStep, ProvisioningStep, WaitForReadiness};
