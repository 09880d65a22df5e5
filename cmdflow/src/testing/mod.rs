//! Testing utilities for cmdflow pipelines.
//!
//! This module provides:
//! - `sh`-based stage fixtures
//! - Assertions over pipeline errors and reports

mod assertions;
mod fixtures;

pub use assertions::{assert_all_succeeded, assert_kind, assert_stage_failed, assert_stage_status};
pub use fixtures::{cat, failing_stage, marker_stage, sh, sleep_stage};
