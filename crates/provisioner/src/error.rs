//! Error taxonomy for provisioning operations.
//!
//! Every failure a step can produce maps onto one of these variants. The
//! reconciler uses the variant to decide whether an `apply` is retried
//! (`TransientRemote`), recorded as skipped (`AlreadyExists`) or halts the run.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while checking or applying a provisioning step.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// The resource already exists. Non-fatal, recorded as skipped.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Network, quota or eventual-consistency failure worth retrying.
    #[error("transient remote error: {0}")]
    TransientRemote(String),

    /// A bounded wait elapsed without the condition holding.
    #[error("timed out after {}s waiting for {what}", waited.as_secs())]
    Timeout { what: String, waited: Duration },

    /// Configuration rejected before any mutation.
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// The caller lacks IAM permissions. Needs out-of-band correction.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Any other remote failure.
    #[error("remote error: {0}")]
    Remote(String),

    /// Local filesystem or process error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Serializable classification of a [`ProvisionError`], used in run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AlreadyExists,
    NotFound,
    TransientRemote,
    Timeout,
    ConfigurationInvalid,
    PermissionDenied,
    Remote,
    Io,
    Serialization,
    /// A declared dependency did not complete in this run.
    DependencyUnsatisfied,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AlreadyExists => "AlreadyExists",
            Self::NotFound => "NotFound",
            Self::TransientRemote => "TransientRemoteError",
            Self::Timeout => "Timeout",
            Self::ConfigurationInvalid => "ConfigurationInvalid",
            Self::PermissionDenied => "PermissionDenied",
            Self::Remote => "RemoteError",
            Self::Io => "IoError",
            Self::Serialization => "SerializationError",
            Self::DependencyUnsatisfied => "DependencyUnsatisfied",
        };
        write!(f, "{s}")
    }
}

impl ProvisionError {
    /// Create a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigurationInvalid(msg.into())
    }

    /// Create a timeout error for the given condition.
    pub fn timeout(what: impl Into<String>, waited: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            waited,
        }
    }

    /// Classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::TransientRemote(_) => ErrorKind::TransientRemote,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::ConfigurationInvalid(_) => ErrorKind::ConfigurationInvalid,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::Remote(_) => ErrorKind::Remote,
            Self::Io(_) => ErrorKind::Io,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Whether a retry of the same operation may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientRemote(_))
    }

    /// Classify the stderr of a failed CLI invocation.
    ///
    /// `gcloud`, `kubectl` and `docker` all report failures as free text; the
    /// status codes of the underlying APIs leak through in a stable form.
    #[must_use]
    pub fn from_tool_output(tool: &str, stderr: &str) -> Self {
        let msg = stderr.trim().to_string();
        let lower = msg.to_lowercase();

        if lower.contains("permission_denied")
            || lower.contains("permission denied")
            || lower.contains("forbidden")
            || lower.contains("does not have permission")
            || lower.contains("unauthenticated")
        {
            return Self::PermissionDenied(msg);
        }

        if lower.contains("already_exists") || lower.contains("already exists") {
            return Self::AlreadyExists(msg);
        }

        if lower.contains("not_found")
            || lower.contains("not found")
            || lower.contains("notfound")
            || lower.contains("does not exist")
        {
            return Self::NotFound(msg);
        }

        if lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("connection refused")
            || lower.contains("connection reset")
            || lower.contains("rate limit")
            || lower.contains("resource_exhausted")
            || lower.contains("quota")
            || lower.contains("503")
            || lower.contains("502")
            || lower.contains("504")
            || lower.contains("unavailable")
            || lower.contains("try again")
            || lower.contains("concurrent policy changes")
            || lower.contains("aborted")
            || lower.contains("network")
        {
            return Self::TransientRemote(msg);
        }

        if msg.is_empty() {
            Self::Remote(format!("{tool} exited with an error and no output"))
        } else {
            Self::Remote(msg)
        }
    }
}

impl From<kube::Error> for ProvisionError {
    fn from(err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(resp) => match resp.code {
                409 => Self::AlreadyExists(resp.message.clone()),
                404 => Self::NotFound(resp.message.clone()),
                401 | 403 => Self::PermissionDenied(resp.message.clone()),
                429 | 500..=599 => Self::TransientRemote(resp.message.clone()),
                _ => Self::Remote(resp.message.clone()),
            },
            kube::Error::HyperError(_) | kube::Error::Service(_) | kube::Error::ReadEvents(_) => {
                Self::TransientRemote(err.to_string())
            }
            kube::Error::Auth(_) => Self::PermissionDenied(err.to_string()),
            kube::Error::SerdeError(_) | kube::Error::FromUtf8(_) => {
                Self::Serialization(err.to_string())
            }
            kube::Error::InferConfig(_)
            | kube::Error::BuildRequest(_)
            | kube::Error::HttpError(_)
            | kube::Error::ProxyProtocolUnsupported { .. }
            | kube::Error::ProxyProtocolDisabled { .. }
            | kube::Error::TlsRequired => Self::ConfigurationInvalid(err.to_string()),
            _ => Self::Remote(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ProvisionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for ProvisionError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifies_permission_denied() {
        let err = ProvisionError::from_tool_output(
            "gcloud",
            "ERROR: (gcloud.projects.add-iam-policy-binding) PERMISSION_DENIED: Policy update access denied.",
        );
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert!(err.to_string().contains("Policy update access denied"));
    }

    #[test]
    fn test_classifies_already_exists() {
        let err = ProvisionError::from_tool_output(
            "gcloud",
            "ERROR: (gcloud.iam.service-accounts.create) Resource in projects [demo-1] is the subject of a conflict: Service account travel-agents already exists within project.",
        );
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_classifies_not_found() {
        let err = ProvisionError::from_tool_output(
            "kubectl",
            r#"Error from server (NotFound): namespaces "adk-travel" not found"#,
        );
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_classifies_transient() {
        for stderr in [
            "ERROR: gcloud crashed (ConnectionError): connection reset by peer",
            "HTTP 503 Service Unavailable",
            "RESOURCE_EXHAUSTED: Quota exceeded for quota metric 'Write requests'",
            "ERROR: (gcloud.projects.add-iam-policy-binding) ABORTED: There were concurrent policy changes.",
        ] {
            let err = ProvisionError::from_tool_output("gcloud", stderr);
            assert!(err.is_transient(), "expected transient for {stderr}");
        }
    }

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".into(),
            message: format!("status {code}"),
            reason: String::new(),
            code,
        })
    }

    #[test]
    fn test_kube_api_errors_follow_status_code() {
        assert_eq!(ProvisionError::from(api_error(409)).kind(), ErrorKind::AlreadyExists);
        assert_eq!(ProvisionError::from(api_error(404)).kind(), ErrorKind::NotFound);
        assert_eq!(ProvisionError::from(api_error(403)).kind(), ErrorKind::PermissionDenied);
        assert!(ProvisionError::from(api_error(503)).is_transient());
        assert_eq!(ProvisionError::from(api_error(422)).kind(), ErrorKind::Remote);
    }

    #[test]
    fn test_kube_auth_failure_is_permission_denied() {
        let err = ProvisionError::from(kube::Error::Auth(
            kube::client::AuthError::ExecPluginFailed,
        ));
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_kube_decode_failure_is_serialization() {
        let decode = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ProvisionError::from(kube::Error::SerdeError(decode));
        assert_eq!(err.kind(), ErrorKind::Serialization);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_kube_bad_request_is_configuration() {
        let err = ProvisionError::from(kube::Error::BuildRequest(
            kube::core::request::Error::Validation("empty name".into()),
        ));
        assert_eq!(err.kind(), ErrorKind::ConfigurationInvalid);
        assert_eq!(
            ProvisionError::from(kube::Error::TlsRequired).kind(),
            ErrorKind::ConfigurationInvalid
        );
    }

    #[test]
    fn test_kube_transport_failures_are_transient() {
        let service = kube::Error::Service("connection reset by peer".into());
        assert!(ProvisionError::from(service).is_transient());

        let read = kube::Error::ReadEvents(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
        assert!(ProvisionError::from(read).is_transient());
    }

    #[test]
    fn test_unclassified_is_remote() {
        let err = ProvisionError::from_tool_output("docker", "invalid reference format");
        assert_eq!(err.kind(), ErrorKind::Remote);
        assert!(!err.is_transient());

        let empty = ProvisionError::from_tool_output("docker", "  ");
        assert!(empty.to_string().contains("docker exited"));
    }

    #[test]
    fn test_timeout_display() {
        let err = ProvisionError::timeout("deployment travel-adk-coordinator", Duration::from_secs(300));
        assert_eq!(
            err.to_string(),
            "timed out after 300s waiting for deployment travel-adk-coordinator"
        );
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }
}
