#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use probevisor::Command;
use tempfile::TempDir;

/// An executable shell script living in its own temp directory.
///
/// The directory (and script) is removed when this value is dropped.
pub struct Script {
    dir: TempDir,
    path: PathBuf,
}

impl Script {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// A command running this script with `args`.
    pub fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Command::new(self.path.to_string_lossy()).args(args)
    }
}

/// Builder for throwaway `/bin/sh` scripts used as fake probe binaries.
pub struct ScriptBuilder {
    name: String,
    lines: Vec<String>,
}

impl ScriptBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            lines: Vec::new(),
        }
    }

    pub fn line(mut self, line: &str) -> Self {
        self.lines.push(line.to_string());
        self
    }

    /// Print each given line on stdout, in order.
    pub fn echo_lines(mut self, lines: &[&str]) -> Self {
        for l in lines {
            self.lines.push(format!("echo '{l}'"));
        }
        self
    }

    pub fn exit(self, code: i32) -> Self {
        self.line(&format!("exit {code}"))
    }

    /// Block (practically) forever.
    pub fn hang(self) -> Self {
        self.line("while :; do sleep 1; done")
    }

    pub fn build(self) -> anyhow::Result<Script> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(&self.name);

        let mut body = String::from("#!/bin/sh\n");
        for line in &self.lines {
            body.push_str(line);
            body.push('\n');
        }
        fs::write(&path, body)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;

        Ok(Script { dir, path })
    }
}
