//! Local prerequisite checks.
//!
//! The steps drive `gcloud`, `kubectl` and `docker`; all three must be on
//! `PATH` before anything is mutated.

use std::path::PathBuf;

use colored::Colorize;

use crate::error::ProvisionError;
use crate::ui;

/// A required command-line tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub name: &'static str,
    pub binary: &'static str,
    pub install_instructions: &'static str,
    /// Whether a missing tool blocks the run.
    pub critical: bool,
}

/// Result of checking one requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementStatus {
    pub requirement: Requirement,
    pub location: Option<PathBuf>,
}

impl RequirementStatus {
    #[must_use]
    pub fn found(&self) -> bool {
        self.location.is_some()
    }
}

/// Validates prerequisites for a deployment.
pub struct PrerequisitesValidator {
    requirements: Vec<Requirement>,
}

impl Default for PrerequisitesValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl PrerequisitesValidator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            requirements: vec![
                Requirement {
                    name: "Google Cloud SDK",
                    binary: "gcloud",
                    install_instructions: "Install from https://cloud.google.com/sdk/docs/install",
                    critical: true,
                },
                Requirement {
                    name: "kubectl",
                    binary: "kubectl",
                    install_instructions: "Run `gcloud components install kubectl`",
                    critical: true,
                },
                Requirement {
                    name: "Docker",
                    binary: "docker",
                    install_instructions: "Install Docker from https://docker.com",
                    critical: true,
                },
            ],
        }
    }

    /// Locate every required tool.
    #[must_use]
    pub fn check(&self) -> Vec<RequirementStatus> {
        self.requirements
            .iter()
            .map(|requirement| RequirementStatus {
                requirement: requirement.clone(),
                location: which::which(requirement.binary).ok(),
            })
            .collect()
    }

    /// Check and print results.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationInvalid` naming every missing critical tool.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        let statuses = self.check();

        for status in &statuses {
            let location = status.location.as_ref().map(|p| p.display().to_string());
            ui::print_check_result(status.requirement.name, status.found(), location.as_deref());
        }
        println!();

        let missing: Vec<&RequirementStatus> = statuses.iter().filter(|s| !s.found()).collect();
        if missing.is_empty() {
            ui::print_success("All prerequisites met!");
            return Ok(());
        }

        ui::print_warning("Some prerequisites are not met:");
        println!();
        for status in &missing {
            let req = &status.requirement;
            println!(
                "  {} {} - {}",
                "✗".red(),
                req.name.red(),
                req.install_instructions.bright_black()
            );
        }
        println!();

        let critical: Vec<&str> = missing
            .iter()
            .filter(|s| s.requirement.critical)
            .map(|s| s.requirement.binary)
            .collect();
        if critical.is_empty() {
            Ok(())
        } else {
            Err(ProvisionError::config(format!(
                "missing required tools: {}",
                critical.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_cloud_tooling() {
        let validator = PrerequisitesValidator::new();
        let binaries: Vec<&str> = validator.requirements.iter().map(|r| r.binary).collect();
        assert_eq!(binaries, vec!["gcloud", "kubectl", "docker"]);
    }

    #[test]
    fn test_missing_critical_tool_is_config_error() {
        let validator = PrerequisitesValidator {
            requirements: vec![Requirement {
                name: "Nonexistent",
                binary: "provision-test-tool-that-does-not-exist",
                install_instructions: "n/a",
                critical: true,
            }],
        };
        let err = validator.validate().unwrap_err();
        assert!(matches!(err, ProvisionError::ConfigurationInvalid(_)));
        assert!(err
            .to_string()
            .contains("provision-test-tool-that-does-not-exist"));
    }

    #[test]
    fn test_missing_optional_tool_passes() {
        let validator = PrerequisitesValidator {
            requirements: vec![Requirement {
                name: "Nonexistent",
                binary: "provision-test-tool-that-does-not-exist",
                install_instructions: "n/a",
                critical: false,
            }],
        };
        assert!(validator.validate().is_ok());
    }
}
