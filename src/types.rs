// src/types.rs

//! Small value types shared by the supervisor, the runner and the config
//! layer.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// Smallest timeout the supervisor will accept.
pub const MINIMUM_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle of one managed process.
///
/// `Created → Running → {CompletedSuccess | CompletedFailure | Killed | TimedOut}`.
/// The four terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
    Created,
    Running,
    CompletedSuccess,
    CompletedFailure,
    Killed,
    TimedOut,
}

impl ProcessState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessState::CompletedSuccess
                | ProcessState::CompletedFailure
                | ProcessState::Killed
                | ProcessState::TimedOut
        )
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: ProcessState) -> bool {
        match self {
            ProcessState::Created => next != ProcessState::Created,
            ProcessState::Running => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessState::Created => "created",
            ProcessState::Running => "running",
            ProcessState::CompletedSuccess => "completed-success",
            ProcessState::CompletedFailure => "completed-failure",
            ProcessState::Killed => "killed",
            ProcessState::TimedOut => "timed-out",
        };
        f.write_str(s)
    }
}

/// How long a command may run before it is forcibly terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeout {
    #[default]
    Unbounded,
    Limited(Duration),
}

impl Timeout {
    /// Build a limited timeout, or `None` if `duration` is below
    /// [`MINIMUM_TIMEOUT`].
    pub fn at_least_minimum(duration: Duration) -> Option<Self> {
        (duration >= MINIMUM_TIMEOUT).then_some(Timeout::Limited(duration))
    }

    pub fn as_duration(self) -> Option<Duration> {
        match self {
            Timeout::Unbounded => None,
            Timeout::Limited(d) => Some(d),
        }
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeout::Unbounded => f.write_str("unbounded"),
            Timeout::Limited(d) => write!(f, "{d:?}"),
        }
    }
}

/// Config-level selector for the cooperative quit mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuitSignalKind {
    #[default]
    Interrupt,
    Stdin,
}

impl FromStr for QuitSignalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "interrupt" => Ok(QuitSignalKind::Interrupt),
            "stdin" => Ok(QuitSignalKind::Stdin),
            other => Err(format!(
                "invalid quit_signal: {other} (expected \"interrupt\" or \"stdin\")"
            )),
        }
    }
}

/// How a cooperative quit is delivered to the child.
///
/// - `Interrupt`: SIGINT to the child's process group. On platforms without
///   signals this degrades to a forced kill.
/// - `Stdin`: write the given line (plus `\n`) to the child's stdin, the way
///   interactive media tools accept `q` to finish up and exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuitSignal {
    Interrupt,
    Stdin(String),
}

impl Default for QuitSignal {
    fn default() -> Self {
        QuitSignal::Interrupt
    }
}

impl QuitSignal {
    pub fn needs_stdin(&self) -> bool {
        matches!(self, QuitSignal::Stdin(_))
    }
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => scaled_secs(value, 60, s),
        "h" => scaled_secs(value, 60 * 60, s),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

fn scaled_secs(value: u64, factor: u64, original: &str) -> Result<Duration, String> {
    value
        .checked_mul(factor)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{original}' is too large"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_absorbing() {
        let terminals = [
            ProcessState::CompletedSuccess,
            ProcessState::CompletedFailure,
            ProcessState::Killed,
            ProcessState::TimedOut,
        ];
        for from in terminals {
            assert!(from.is_terminal());
            for to in terminals {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
            assert!(!from.can_transition_to(ProcessState::Running));
        }
        assert!(ProcessState::Running.can_transition_to(ProcessState::TimedOut));
        assert!(!ProcessState::Running.can_transition_to(ProcessState::Created));
        assert!(ProcessState::Created.can_transition_to(ProcessState::CompletedFailure));
    }

    #[test]
    fn timeout_floor() {
        assert_eq!(Timeout::at_least_minimum(Duration::from_secs(9)), None);
        assert_eq!(
            Timeout::at_least_minimum(MINIMUM_TIMEOUT),
            Some(Timeout::Limited(MINIMUM_TIMEOUT))
        );
        assert_eq!(Timeout::default().as_duration(), None);
    }

    #[test]
    fn parses_durations() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration(" 30s "), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("5d").is_err());
    }

    #[test]
    fn oversized_durations_are_errors() {
        let err = parse_duration("6000000000000000000m").unwrap_err();
        assert!(err.contains("too large"), "{err}");
        assert!(parse_duration("6000000000000000000h").is_err());
        assert!(parse_duration(&format!("{}s", u64::MAX)).is_ok());
    }

    #[test]
    fn quit_kind_from_str() {
        assert_eq!("Interrupt".parse::<QuitSignalKind>(), Ok(QuitSignalKind::Interrupt));
        assert_eq!(" stdin".parse::<QuitSignalKind>(), Ok(QuitSignalKind::Stdin));
        assert!("term".parse::<QuitSignalKind>().is_err());
    }
}
