//! Test assertions for pipeline results.

use crate::core::{PipelineOutput, StageStatus};
use crate::errors::{ErrorKind, PipelineError};

/// Asserts that the error has the expected kind.
pub fn assert_kind(error: &PipelineError, expected: ErrorKind) {
    assert_eq!(
        error.kind(),
        expected,
        "Expected {} error, got: {}",
        expected,
        error
    );
}

/// Asserts that stage `stage` crashed and its stderr contains `needle`.
pub fn assert_stage_failed(error: &PipelineError, stage: usize, needle: &str) {
    assert_kind(error, ErrorKind::StageFailed);
    assert_eq!(
        error.stage(),
        Some(stage),
        "Expected stage {} to be reported, got: {}",
        stage,
        error
    );
    let diagnostic = error.diagnostic().unwrap_or_default();
    assert!(
        diagnostic.contains(needle),
        "Expected diagnostic to contain {:?}, got {:?}",
        needle,
        diagnostic
    );
}

/// Asserts that every stage of a finished run succeeded.
pub fn assert_all_succeeded(output: &PipelineOutput) {
    for report in &output.stages {
        assert!(
            report.status.is_success(),
            "Expected stage {} ({}) to succeed, got {}",
            report.index,
            report.program,
            report.status
        );
    }
}

/// Asserts the status of one stage in a finished run.
pub fn assert_stage_status(output: &PipelineOutput, stage: usize, expected: StageStatus) {
    let actual = output.stages.get(stage).map(|report| report.status);
    assert_eq!(
        actual,
        Some(expected),
        "Expected stage {} to be {}, got {:?}",
        stage,
        expected,
        actual
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ExitSummary, StageReport};

    #[test]
    fn test_assert_stage_failed_passes() {
        let err = PipelineError::stage_failed(2, "sh", ExitSummary::Code(1), "disk full\n");
        assert_stage_failed(&err, 2, "disk full");
    }

    #[test]
    #[should_panic(expected = "Expected stage 1 to be reported")]
    fn test_assert_stage_failed_wrong_stage() {
        let err = PipelineError::stage_failed(2, "sh", ExitSummary::Code(1), "disk full\n");
        assert_stage_failed(&err, 1, "disk full");
    }

    #[test]
    fn test_assert_stage_status() {
        let output = PipelineOutput {
            stages: vec![StageReport::unstarted(0, "cat", StageStatus::NotStarted)],
            ..Default::default()
        };
        assert_stage_status(&output, 0, StageStatus::NotStarted);
    }
}
