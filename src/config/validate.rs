// src/config/validate.rs

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::warn;

use crate::config::model::{ConfigFile, RawConfigFile, SupervisorSection};
use crate::errors::{Result, SupervisorError};
use crate::supervisor::SupervisorConfig;
use crate::types::{MINIMUM_TIMEOUT, QuitSignal, QuitSignalKind, Timeout, parse_duration};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = SupervisorError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let supervisor = supervisor_config(&raw.supervisor)?;
        let binary = validate_binary(raw.binary.path)?;
        validate_env(&raw.env)?;
        Ok(ConfigFile::new_unchecked(supervisor, binary, raw.env))
    }
}

fn supervisor_config(section: &SupervisorSection) -> Result<SupervisorConfig> {
    let timeout = match section.timeout.as_deref() {
        None => Timeout::Unbounded,
        Some(s) => {
            let requested = duration_field("timeout", s)?;
            Timeout::at_least_minimum(requested).unwrap_or_else(|| {
                warn!(
                    requested = ?requested,
                    minimum = ?MINIMUM_TIMEOUT,
                    "[supervisor].timeout below minimum; ignoring"
                );
                Timeout::Unbounded
            })
        }
    };

    let quit_signal = match section.quit_signal {
        QuitSignalKind::Interrupt => QuitSignal::Interrupt,
        QuitSignalKind::Stdin => {
            if section.quit_input.trim().is_empty() {
                return Err(SupervisorError::ConfigError(
                    "[supervisor].quit_input must not be empty when quit_signal = \"stdin\""
                        .to_string(),
                ));
            }
            QuitSignal::Stdin(section.quit_input.clone())
        }
    };

    let drain_grace = duration_field("drain_grace", &section.drain_grace)?;
    if drain_grace.is_zero() {
        return Err(SupervisorError::ConfigError(
            "[supervisor].drain_grace must be greater than zero".to_string(),
        ));
    }

    Ok(SupervisorConfig {
        timeout,
        quit_signal,
        drain_grace,
    })
}

fn duration_field(field: &str, value: &str) -> Result<Duration> {
    parse_duration(value).map_err(|e| {
        SupervisorError::ConfigError(format!("[supervisor].{field} = {value:?}: {e}"))
    })
}

fn validate_binary(path: Option<String>) -> Result<Option<String>> {
    match path {
        Some(p) if p.trim().is_empty() => Err(SupervisorError::ConfigError(
            "[binary].path must not be empty".to_string(),
        )),
        other => Ok(other),
    }
}

fn validate_env(env: &BTreeMap<String, String>) -> Result<()> {
    for key in env.keys() {
        if key.is_empty() || key.contains('=') || key.contains('\0') {
            return Err(SupervisorError::ConfigError(format!(
                "[env] has invalid variable name {key:?}"
            )));
        }
    }
    Ok(())
}
