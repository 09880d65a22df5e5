//! # Cmdflow
//!
//! Run an ordered list of external programs as a connected pipeline, the way a
//! shell runs `a | b | c`, without invoking a shell.
//!
//! Cmdflow provides:
//!
//! - **Pipe wiring**: each stage's stdout feeds the next stage's stdin
//! - **Concurrent monitoring**: every stage runs and is watched in parallel
//! - **First-failure diagnostics**: the first stage to fail wins, and its
//!   captured stderr becomes the error
//! - **Leak-free termination**: on failure, deadline, or cancellation every
//!   remaining stage is killed before the call returns
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cmdflow::prelude::*;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), PipelineError> {
//! let stages = [
//!     CommandSpec::new("cat").arg("access.log"),
//!     CommandSpec::new("grep").arg("ERROR"),
//!     CommandSpec::new("wc").arg("-l"),
//! ];
//!
//! run_with_deadline(&stages, Duration::from_secs(30)).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::core::{
        CommandSpec, ExitSummary, PipelineEvent, PipelineOutput, StageReport, StageStatus,
    };
    pub use crate::errors::{ErrorKind, PipelineError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{
        run, run_with_context, run_with_deadline, InputMode, OutputMode, Pipeline,
        PipelineConfig,
    };
}
