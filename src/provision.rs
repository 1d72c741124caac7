// src/provision.rs

//! Binary provisioning seam.
//!
//! The supervisor trusts whatever path it is given. A [`BinaryProvisioner`]
//! is the collaborator that knows whether the probing binary is actually in
//! place and executable, and turns a plain argument list into a [`Command`]
//! rooted at that binary.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::errors::{Result, SupervisorError};
use crate::exec::Command;

pub trait BinaryProvisioner {
    /// True when the binary exists and can be executed.
    fn is_ready(&self) -> bool;

    fn binary_path(&self) -> &Path;

    /// Environment overlay applied to every command built from this binary.
    fn env_overlay(&self) -> &BTreeMap<String, String>;

    /// Prepend the binary path to `args` and apply the environment overlay.
    fn command(&self, args: &[String]) -> Result<Command> {
        if !self.is_ready() {
            return Err(SupervisorError::BinaryNotReady(format!(
                "{} is missing or not executable",
                self.binary_path().display()
            )));
        }
        Ok(Command::new(self.binary_path().to_string_lossy())
            .args(args.iter().cloned())
            .envs(self.env_overlay().clone()))
    }
}

/// A binary already present on the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalBinary {
    path: PathBuf,
    env: BTreeMap<String, String>,
}

impl LocalBinary {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            env: BTreeMap::new(),
        }
    }

    /// Resolve `name_or_path`: a bare name (no separators) is looked up on
    /// `PATH`, anything else is taken as a filesystem path.
    pub fn resolve(name_or_path: &str) -> Result<Self> {
        let candidate = Path::new(name_or_path);
        if candidate.components().count() > 1 || candidate.is_absolute() {
            return Ok(Self::new(candidate));
        }

        let found = which::which(name_or_path).map_err(|e| {
            SupervisorError::BinaryNotReady(format!("'{name_or_path}' not found on PATH: {e}"))
        })?;
        debug!(binary = %name_or_path, path = %found.display(), "resolved binary on PATH");
        Ok(Self::new(found))
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Add the execute bits if the file exists but is not executable.
    pub fn ensure_executable(&self) -> Result<()> {
        let meta = std::fs::metadata(&self.path)?;
        if !meta.is_file() {
            return Err(SupervisorError::BinaryNotReady(format!(
                "{} is not a regular file",
                self.path.display()
            )));
        }
        if is_executable(&meta) {
            return Ok(());
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mut perms = meta.permissions();
            perms.set_mode(perms.mode() | 0o755);
            std::fs::set_permissions(&self.path, perms)?;
            info!(path = %self.path.display(), "made binary executable");
        }

        Ok(())
    }
}

impl BinaryProvisioner for LocalBinary {
    fn is_ready(&self) -> bool {
        std::fs::metadata(&self.path)
            .map(|meta| meta.is_file() && is_executable(&meta))
            .unwrap_or(false)
    }

    fn binary_path(&self) -> &Path {
        &self.path
    }

    fn env_overlay(&self) -> &BTreeMap<String, String> {
        &self.env
    }
}

#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &std::fs::Metadata) -> bool {
    true
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn ensure_executable_adds_execute_bits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe");
        std::fs::write(&path, "#!/bin/sh\necho hi\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let binary = LocalBinary::new(&path);
        assert!(!binary.is_ready());
        binary.ensure_executable().unwrap();
        assert!(binary.is_ready());
    }

    #[test]
    fn command_prepends_binary_and_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe");
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut env = BTreeMap::new();
        env.insert("PROBE_HOME".to_string(), "/tmp".to_string());
        let binary = LocalBinary::new(&path).with_env(env);

        let cmd = binary.command(&["-v".to_string(), "quiet".to_string()]).unwrap();
        assert_eq!(cmd.program(), Some(path.to_string_lossy().as_ref()));
        assert_eq!(cmd.arguments(), ["-v".to_string(), "quiet".to_string()]);
        assert_eq!(cmd.env_overlay().get("PROBE_HOME").map(String::as_str), Some("/tmp"));
    }

    #[test]
    fn missing_binary_is_not_ready() {
        let binary = LocalBinary::new("/definitely/not/here/probe");
        assert!(!binary.is_ready());
        assert!(matches!(
            binary.command(&[]),
            Err(SupervisorError::BinaryNotReady(_))
        ));
        assert!(binary.ensure_executable().is_err());
    }

    #[test]
    fn bare_names_resolve_through_path() {
        let binary = LocalBinary::resolve("sh").unwrap();
        assert!(binary.binary_path().is_absolute());
        assert!(binary.is_ready());

        let explicit = LocalBinary::resolve("./bin/probe").unwrap();
        assert_eq!(explicit.binary_path(), Path::new("./bin/probe"));
    }
}
