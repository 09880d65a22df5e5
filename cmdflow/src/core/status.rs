//! Stage status and exit classification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::ExitStatus;

/// SIGPIPE on every Unix the crate targets.
#[cfg(unix)]
const SIGPIPE: i32 = 13;

/// The final status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage process exited successfully.
    Succeeded,
    /// Stage process exited unsuccessfully.
    Failed,
    /// Stage process was terminated by the pipeline.
    Killed,
    /// Stage process could not be launched.
    SpawnFailed,
    /// Stage was never launched because the pipeline was already terminating.
    NotStarted,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Killed => write!(f, "killed"),
            Self::SpawnFailed => write!(f, "spawn_failed"),
            Self::NotStarted => write!(f, "not_started"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::SpawnFailed)
    }
}

/// How a stage process exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum ExitSummary {
    /// Exited with a status code.
    Code(i32),
    /// Terminated by a signal.
    Signal(i32),
    /// The platform reported neither a code nor a signal.
    Unknown,
}

impl ExitSummary {
    /// Returns true for a zero exit code.
    #[must_use]
    pub fn success(&self) -> bool {
        matches!(self, Self::Code(0))
    }

    /// Returns true if the process died from a broken pipe.
    #[must_use]
    pub fn is_broken_pipe(&self) -> bool {
        #[cfg(unix)]
        {
            matches!(self, Self::Signal(SIGPIPE))
        }
        #[cfg(not(unix))]
        {
            false
        }
    }
}

impl From<ExitStatus> for ExitSummary {
    fn from(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::Code(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Signal(signal);
            }
        }
        Self::Unknown
    }
}

impl fmt::Display for ExitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exited with status {code}"),
            Self::Signal(signal) => write!(f, "terminated by signal {signal}"),
            Self::Unknown => write!(f, "exited abnormally"),
        }
    }
}
