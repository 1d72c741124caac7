// src/exec/command.rs

//! Immutable description of a command to run.

use std::collections::BTreeMap;
use std::fmt;
use std::process::Stdio;

use crate::errors::{Result, SupervisorError};

/// An executable path followed by its arguments, plus an environment overlay
/// applied on top of the inherited environment.
///
/// ```
/// use probevisor::exec::Command;
///
/// let cmd = Command::new("/data/bin/ffprobe")
///     .args(["-v", "quiet", "clip.mp4"])
///     .env("LD_LIBRARY_PATH", "/data/lib");
/// assert_eq!(cmd.program(), Some("/data/bin/ffprobe"));
/// assert_eq!(cmd.arguments().len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    argv: Vec<String>,
    env: BTreeMap<String, String>,
}

impl Command {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            argv: vec![program.into()],
            env: BTreeMap::new(),
        }
    }

    /// Build from a full argument vector (program first). An empty vector is
    /// accepted here and rejected when executed.
    pub fn from_argv<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add one overlay variable. Later values for the same key win.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    /// Arguments after the program.
    pub fn arguments(&self) -> &[String] {
        self.argv.get(1..).unwrap_or(&[])
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn env_overlay(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        match self.program() {
            None => Err(SupervisorError::InvalidArgument(
                "command cannot be empty".to_string(),
            )),
            Some(p) if p.trim().is_empty() => Err(SupervisorError::InvalidArgument(
                "command program cannot be blank".to_string(),
            )),
            Some(_) => Ok(()),
        }
    }

    /// Build the tokio command with piped output streams. Callers must have
    /// run [`Command::validate`] first.
    pub(crate) fn to_tokio(&self, pipe_stdin: bool) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(self.program().unwrap_or_default());
        cmd.args(self.arguments())
            .envs(&self.env)
            .stdin(if pipe_stdin { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so forced termination reaches shell descendants.
        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_blank_programs_are_invalid() {
        assert!(matches!(
            Command::from_argv(Vec::<String>::new()).validate(),
            Err(SupervisorError::InvalidArgument(_))
        ));
        assert!(matches!(
            Command::new("  ").validate(),
            Err(SupervisorError::InvalidArgument(_))
        ));
        assert!(Command::new("probe").validate().is_ok());
    }

    #[test]
    fn arguments_exclude_program() {
        let cmd = Command::from_argv(["probe", "-v", "quiet"]);
        assert_eq!(cmd.arguments(), ["-v".to_string(), "quiet".to_string()]);
        assert_eq!(cmd.to_string(), "probe -v quiet");
        assert!(Command::default().arguments().is_empty());
    }

    #[test]
    fn env_overlay_keys_are_unique() {
        let cmd = Command::new("probe")
            .env("A", "1")
            .envs([("B", "2"), ("A", "3")]);
        assert_eq!(cmd.env_overlay().len(), 2);
        assert_eq!(cmd.env_overlay().get("A").map(String::as_str), Some("3"));
    }
}
