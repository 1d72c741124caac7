// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::supervisor::SupervisorConfig;
use crate::types::QuitSignalKind;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [supervisor]
/// timeout = "30s"
/// quit_signal = "stdin"
/// quit_input = "q"
///
/// [binary]
/// path = "ffprobe"
///
/// [env]
/// LD_LIBRARY_PATH = "/opt/probe/lib"
/// ```
///
/// All sections are optional.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub supervisor: SupervisorSection,

    #[serde(default)]
    pub binary: BinarySection,

    /// Overlay applied on top of the inherited environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// `[supervisor]` section. Durations use the `ms`/`s`/`m`/`h` suffixes.
#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorSection {
    /// Omitted means unbounded.
    #[serde(default)]
    pub timeout: Option<String>,

    #[serde(default)]
    pub quit_signal: QuitSignalKind,

    /// Line written to stdin when `quit_signal = "stdin"`.
    #[serde(default = "default_quit_input")]
    pub quit_input: String,

    #[serde(default = "default_drain_grace")]
    pub drain_grace: String,
}

fn default_quit_input() -> String {
    "q".to_string()
}

fn default_drain_grace() -> String {
    "250ms".to_string()
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            timeout: None,
            quit_signal: QuitSignalKind::default(),
            quit_input: default_quit_input(),
            drain_grace: default_drain_grace(),
        }
    }
}

/// `[binary]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BinarySection {
    /// Bare name looked up on `PATH`, or an explicit path.
    #[serde(default)]
    pub path: Option<String>,
}

/// Validated configuration.
///
/// Only constructible through `TryFrom<RawConfigFile>` (or `Default`), so a
/// `ConfigFile` always carries parsed durations and a sane env overlay.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigFile {
    pub supervisor: SupervisorConfig,
    pub binary: Option<String>,
    pub env: BTreeMap<String, String>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        supervisor: SupervisorConfig,
        binary: Option<String>,
        env: BTreeMap<String, String>,
    ) -> Self {
        Self {
            supervisor,
            binary,
            env,
        }
    }
}
