//! Error types for cmdflow pipelines.
//!
//! Every run resolves to at most one [`PipelineError`]. Stage-level failures
//! are arbitrated by the crash gate before they get here, so callers only ever
//! see the first failure that was observed.

use crate::core::ExitSummary;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The terminal error of a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The pipeline was given no stages.
    #[error("pipeline must contain at least one stage")]
    Empty,

    /// The pipeline configuration was rejected before any stage was wired.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// A stage's process could not be launched.
    #[error("failed to start stage {stage} ({program}): {source}")]
    Spawn {
        /// Zero-based stage position.
        stage: usize,
        /// The program that failed to start.
        program: String,
        /// The underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// A stage exited unsuccessfully.
    #[error("stage {stage} ({program}) {exit}: {stderr}")]
    StageFailed {
        /// Zero-based stage position.
        stage: usize,
        /// The failing program.
        program: String,
        /// How the process exited.
        exit: ExitSummary,
        /// Everything the stage wrote to standard error.
        stderr: String,
    },

    /// The configured deadline elapsed before the pipeline finished.
    #[error("pipeline deadline of {deadline:?} exceeded")]
    DeadlineExceeded {
        /// The deadline that was applied.
        deadline: Duration,
    },

    /// The caller's cancellation token fired before the pipeline finished.
    #[error("pipeline cancelled: {reason}")]
    Cancelled {
        /// The reason recorded on the token.
        reason: String,
    },

    /// A stage monitor task died unexpectedly.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No stages were supplied.
    Empty,
    /// Configuration rejected.
    InvalidConfig,
    /// A process failed to start.
    Spawn,
    /// A process exited unsuccessfully.
    StageFailed,
    /// The deadline elapsed.
    DeadlineExceeded,
    /// The caller cancelled the run.
    Cancelled,
    /// A monitor task panicked.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::InvalidConfig => write!(f, "invalid_config"),
            Self::Spawn => write!(f, "spawn"),
            Self::StageFailed => write!(f, "stage_failed"),
            Self::DeadlineExceeded => write!(f, "deadline_exceeded"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

impl PipelineError {
    /// Creates a stage failure error.
    #[must_use]
    pub fn stage_failed(
        stage: usize,
        program: impl Into<String>,
        exit: ExitSummary,
        stderr: impl Into<String>,
    ) -> Self {
        Self::StageFailed {
            stage,
            program: program.into(),
            exit,
            stderr: stderr.into(),
        }
    }

    /// Creates a spawn error.
    #[must_use]
    pub fn spawn(stage: usize, program: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            stage,
            program: program.into(),
            source,
        }
    }

    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Empty => ErrorKind::Empty,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::Spawn { .. } => ErrorKind::Spawn,
            Self::StageFailed { .. } => ErrorKind::StageFailed,
            Self::DeadlineExceeded { .. } => ErrorKind::DeadlineExceeded,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns the failing stage's captured stderr, for stage crashes only.
    #[must_use]
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Self::StageFailed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }

    /// Returns the position of the stage this error originated from, if any.
    #[must_use]
    pub fn stage(&self) -> Option<usize> {
        match self {
            Self::Spawn { stage, .. } | Self::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Returns true for outcomes triggered from outside the pipeline.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. } | Self::Cancelled { .. })
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("kind".to_string(), serde_json::json!(self.kind()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));

        match self {
            Self::Spawn { stage, program, .. } => {
                map.insert("stage".to_string(), serde_json::json!(stage));
                map.insert("program".to_string(), serde_json::json!(program));
            }
            Self::StageFailed {
                stage,
                program,
                exit,
                stderr,
            } => {
                map.insert("stage".to_string(), serde_json::json!(stage));
                map.insert("program".to_string(), serde_json::json!(program));
                map.insert("exit".to_string(), serde_json::json!(exit.to_string()));
                map.insert("stderr".to_string(), serde_json::json!(stderr));
            }
            Self::DeadlineExceeded { deadline } => {
                let ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX);
                map.insert("deadline_ms".to_string(), serde_json::json!(ms));
            }
            Self::Cancelled { reason } => {
                map.insert("reason".to_string(), serde_json::json!(reason));
            }
            Self::Empty | Self::InvalidConfig(_) | Self::Internal(_) => {}
        }

        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_failed_carries_diagnostic() {
        let err = PipelineError::stage_failed(1, "grep", ExitSummary::Code(2), "grep: bad regex\n");

        assert_eq!(err.kind(), ErrorKind::StageFailed);
        assert_eq!(err.diagnostic(), Some("grep: bad regex\n"));
        assert_eq!(err.stage(), Some(1));
        assert!(err.to_string().contains("grep: bad regex"));
    }

    #[test]
    fn test_deadline_has_no_diagnostic() {
        let err = PipelineError::DeadlineExceeded {
            deadline: Duration::from_millis(250),
        };

        assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);
        assert!(err.diagnostic().is_none());
        assert!(err.stage().is_none());
        assert!(err.is_aborted());
    }

    #[test]
    fn test_deadline_and_cancel_are_distinct() {
        let deadline = PipelineError::DeadlineExceeded {
            deadline: Duration::from_secs(1),
        };
        let cancelled = PipelineError::Cancelled {
            reason: "shutdown".to_string(),
        };

        assert_ne!(deadline.kind(), cancelled.kind());
        assert!(cancelled.is_aborted());
    }

    #[test]
    fn test_spawn_error_to_dict() {
        let err = PipelineError::spawn(
            0,
            "does-not-exist",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        let dict = err.to_dict();

        assert_eq!(dict.get("kind").unwrap(), "spawn");
        assert_eq!(dict.get("program").unwrap(), "does-not-exist");
        assert_eq!(dict.get("stage").unwrap(), 0);
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::DeadlineExceeded.to_string(), "deadline_exceeded");
        assert_eq!(ErrorKind::StageFailed.to_string(), "stage_failed");
    }
}
