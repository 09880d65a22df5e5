//! Pipeline assembly and execution.
//!
//! This module provides:
//! - Pipe wiring between adjacent stages
//! - One monitor task per stage
//! - The crash gate that picks the single terminal error
//! - The runner with deadline and cancellation support

mod config;
mod coordinator;
mod runner;
mod stage;
mod wiring;

pub use config::{InputMode, OutputMode, PipelineConfig, DEFAULT_PIPE_CAPACITY};
pub use runner::{run, run_with_context, run_with_deadline, Pipeline};
