//! Core domain model types for cmdflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Stage descriptors
//! - Stage status and exit classification
//! - Stage reports and pipeline output
//! - Lifecycle events

mod command;
mod event;
mod report;
mod status;

pub use command::CommandSpec;
pub use event::PipelineEvent;
pub use report::{PipelineOutput, StageReport};
pub use status::{ExitSummary, StageStatus};
