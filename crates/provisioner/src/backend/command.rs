//! Running external CLIs.
//!
//! Uses `tokio::process::Command`; failures are classified from stderr.

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::ProvisionError;

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, `None` if killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout on success, a classified error otherwise.
    ///
    /// # Errors
    ///
    /// Returns the error classified from stderr when the exit code is non-zero.
    pub fn into_result(self, program: &str) -> Result<String, ProvisionError> {
        if self.success() {
            Ok(self.stdout)
        } else {
            Err(ProvisionError::from_tool_output(program, &self.stderr))
        }
    }
}

/// Run `program` with `args`, optionally feeding `stdin`.
///
/// # Errors
///
/// Returns `Io` if the process cannot be spawned or its pipes fail.
pub async fn run(
    program: &str,
    args: &[String],
    stdin: Option<&str>,
) -> Result<ToolOutput, ProvisionError> {
    debug!(program = %program, args = ?args, "Running command");

    let mut child = Command::new(program)
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input.as_bytes()).await?;
        // Closing stdin signals end of input.
        drop(pipe);
    }

    let output = child.wait_with_output().await?;
    Ok(ToolOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run and return stdout, classifying any failure.
///
/// # Errors
///
/// Returns `Io` on spawn failure or the error classified from stderr.
pub async fn run_checked(
    program: &str,
    args: &[String],
    stdin: Option<&str>,
) -> Result<String, ProvisionError> {
    run(program, args, stdin).await?.into_result(program)
}

/// Turn a `describe`-style result into an existence answer.
///
/// # Errors
///
/// Propagates every error except `NotFound`.
pub fn exists_from(result: Result<String, ProvisionError>) -> Result<bool, ProvisionError> {
    match result {
        Ok(_) => Ok(true),
        Err(ProvisionError::NotFound(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Build an owned argument vector.
pub fn args<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_result_classifies_failure() {
        let output = ToolOutput {
            code: Some(1),
            stdout: String::new(),
            stderr: "ERROR: (gcloud.container.clusters.describe) NOT_FOUND: cluster missing".into(),
        };
        assert!(matches!(
            output.into_result("gcloud"),
            Err(ProvisionError::NotFound(_))
        ));
    }

    #[test]
    fn test_exists_from() {
        assert!(exists_from(Ok("name".into())).unwrap());
        assert!(!exists_from(Err(ProvisionError::NotFound("x".into()))).unwrap());
        assert!(exists_from(Err(ProvisionError::PermissionDenied("x".into()))).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_pipes_stdin() {
        let output = run("cat", &args(["-"]), Some("kind: Namespace\n")).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "kind: Namespace\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_reports_exit_code() {
        let output = run("sh", &args(["-c", "echo boom >&2; exit 3"]), None).await.unwrap();
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stderr.trim(), "boom");
    }
}
