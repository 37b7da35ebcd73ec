//! Write-once local artifacts.
//!
//! Generated files (service account key, infrastructure variables, run
//! summary) are only ever created. If a file is already present it is left
//! untouched and a warning is logged; operators delete it to regenerate.
//! Contents are staged in a temporary file next to the target and linked
//! into place, so a partial write never shows up under the final name.

use std::fmt::Write as _;
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::config::DeployContext;
use crate::error::ProvisionError;

const PUBLIC_MODE: u32 = 0o644;
const SECRET_MODE: u32 = 0o600;

/// What [`write_once`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The file did not exist and was written.
    Written,
    /// The file already existed and was not modified.
    LeftUntouched,
}

/// Create `path` with `contents` unless it already exists.
///
/// # Errors
///
/// Returns `Io` if the parent directory cannot be created or the write fails.
pub fn write_once(path: &Path, contents: &[u8]) -> Result<WriteOutcome, ProvisionError> {
    write_with_mode(path, contents, PUBLIC_MODE)
}

/// Like [`write_once`], but readable by the owner only.
///
/// # Errors
///
/// Returns `Io` if the parent directory cannot be created or the write fails.
pub fn write_secret_once(path: &Path, contents: &[u8]) -> Result<WriteOutcome, ProvisionError> {
    write_with_mode(path, contents, SECRET_MODE)
}

/// Whether `path` holds a usable artifact. Empty files count as absent.
///
/// # Errors
///
/// Returns `Io` for any failure other than the file not existing.
pub fn is_present(path: &Path) -> Result<bool, ProvisionError> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(meta.is_file() && meta.len() > 0),
        Err(e) if e.kind() == IoErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn write_with_mode(path: &Path, contents: &[u8], mode: u32) -> Result<WriteOutcome, ProvisionError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut staged = NamedTempFile::new_in(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        staged
            .as_file()
            .set_permissions(std::fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = mode;
    staged.write_all(contents)?;
    staged.as_file().sync_all()?;

    let staged = match staged.persist_noclobber(path) {
        Ok(_) => {
            info!(path = %path.display(), bytes = contents.len(), "Wrote artifact");
            return Ok(WriteOutcome::Written);
        }
        Err(e) if e.error.kind() == IoErrorKind::AlreadyExists => e.file,
        Err(e) => return Err(e.error.into()),
    };

    if is_present(path)? {
        warn!(path = %path.display(), "Artifact already exists, leaving it untouched");
        return Ok(WriteOutcome::LeftUntouched);
    }

    // Only an interrupted earlier write leaves an empty file behind.
    warn!(path = %path.display(), "Replacing empty artifact");
    std::fs::remove_file(path)?;
    staged.persist_noclobber(path).map_err(|e| e.error)?;
    info!(path = %path.display(), bytes = contents.len(), "Wrote artifact");
    Ok(WriteOutcome::Written)
}

/// Render the infrastructure variables file (`terraform.tfvars` syntax).
#[must_use]
pub fn render_variables(ctx: &DeployContext) -> String {
    let config = ctx.config();
    let mut out = String::new();

    let _ = writeln!(out, "# Generated by provision. Delete this file to regenerate it.");
    for (key, value) in [
        ("project_id", config.project_id.as_str()),
        ("region", config.region.as_str()),
        ("cluster_name", config.cluster_name.as_str()),
        ("namespace", config.namespace.as_str()),
        ("repository", config.repository.as_str()),
        ("machine_type", config.machine_type.as_str()),
    ] {
        let _ = writeln!(out, "{key} = {}", quote(value));
    }
    let _ = writeln!(out, "node_count = {}", config.node_count);
    let _ = writeln!(
        out,
        "service_account_email = {}",
        quote(&ctx.service_account_email())
    );
    let _ = writeln!(
        out,
        "credentials_file = {}",
        quote(&ctx.credentials_path().display().to_string())
    );
    if let Some(sql) = &config.cloud_sql {
        let _ = writeln!(out, "sql_instance = {}", quote(&sql.instance_name));
    }

    let images: Vec<String> = config
        .services
        .iter()
        .map(|s| format!("  {} = {}", s.name.replace('-', "_"), quote(&ctx.image_uri(s))))
        .collect();
    let _ = writeln!(out, "images = {{\n{}\n}}", images.join("\n"));

    out
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeployConfig;

    #[test]
    fn test_write_once_leaves_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("summary.txt");

        assert_eq!(write_once(&path, b"first").unwrap(), WriteOutcome::Written);
        assert_eq!(write_once(&path, b"second").unwrap(), WriteOutcome::LeftUntouched);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first");
    }

    #[cfg(unix)]
    #[test]
    fn test_secret_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        write_secret_once(&path, b"{}").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_empty_leftover_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        std::fs::write(&path, b"").unwrap();
        assert!(!is_present(&path).unwrap());

        let outcome = write_secret_once(&path, br#"{"private_key_id":"abc"}"#).unwrap();
        assert_eq!(outcome, WriteOutcome::Written);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            r#"{"private_key_id":"abc"}"#
        );
        assert!(is_present(&path).unwrap());
    }

    #[test]
    fn test_no_staging_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terraform.tfvars");

        write_once(&path, b"a = 1\n").unwrap();
        write_once(&path, b"a = 2\n").unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("terraform.tfvars")]);
    }

    #[test]
    fn test_missing_file_is_not_present() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_present(&dir.path().join("absent")).unwrap());
    }

    #[test]
    fn test_render_variables() {
        let mut config = DeployConfig::with_defaults("demo-project");
        config.cloud_sql = Some(crate::config::CloudSqlConfig::default());
        let ctx = DeployContext::new(config).unwrap();

        let vars = render_variables(&ctx);
        assert!(vars.contains("project_id = \"demo-project\""));
        assert!(vars.contains("node_count = 2"));
        assert!(vars.contains(
            "service_account_email = \"travel-agents-sa@demo-project.iam.gserviceaccount.com\""
        ));
        assert!(vars.contains("sql_instance = \"travel-agents-db\""));
        assert!(vars.contains(
            "travel_adk_coordinator = \"us-central1-docker.pkg.dev/demo-project/travel-agents/travel-adk-coordinator:latest\""
        ));
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote(r#"a"b\c"#), r#""a\"b\\c""#);
    }
}
