// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `probevisor`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "probevisor",
    version,
    about = "Run a media-probing binary under a single-flight supervisor.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Probevisor.toml` in the current working directory, if present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Binary to run: a bare name looked up on PATH, or a path.
    ///
    /// Overrides `[binary].path`; defaults to `ffprobe`.
    #[arg(long, value_name = "PATH")]
    pub binary: Option<String>,

    /// Kill the process after this long (e.g. "30s", "2m").
    ///
    /// Values below 10s are ignored.
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<String>,

    /// Extra environment variable for the child; may be repeated.
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PROBEVISOR_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Resolve the binary and print the command, but don't run it.
    #[arg(long)]
    pub dry_run: bool,

    /// Arguments passed to the binary.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {s:?}")),
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
