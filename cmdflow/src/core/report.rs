//! Per-stage and per-run reports.

use super::{ExitSummary, StageStatus};
use serde::{Deserialize, Serialize};

/// What happened to a single stage during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    /// Zero-based stage position.
    pub index: usize,
    /// The program the stage ran.
    pub program: String,
    /// Final status of the stage.
    pub status: StageStatus,
    /// How the process exited, if it was ever started.
    pub exit: Option<ExitSummary>,
    /// Wall time from spawn to reap, in milliseconds.
    pub duration_ms: f64,
}

impl StageReport {
    /// Creates a report for a stage that never produced a process.
    #[must_use]
    pub fn unstarted(index: usize, program: impl Into<String>, status: StageStatus) -> Self {
        Self {
            index,
            program: program.into(),
            status,
            exit: None,
            duration_ms: 0.0,
        }
    }
}

/// The successful result of a pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineOutput {
    /// Identifier of this run.
    pub run_id: String,
    /// Standard output of the last stage, when captured.
    #[serde(default)]
    pub stdout: Vec<u8>,
    /// Per-stage reports in pipeline order.
    pub stages: Vec<StageReport>,
    /// Total execution time in milliseconds.
    pub duration_ms: f64,
}

impl PipelineOutput {
    /// Returns the captured stdout as lossy UTF-8.
    #[must_use]
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Returns true if every stage succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.stages.iter().all(|stage| stage.status.is_success())
    }
}
