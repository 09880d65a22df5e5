//! Cooperative cancellation.
//!
//! [`CancellationToken`] is used in two places: callers pass one to
//! `run_with_context` to abort a pipeline from outside, and every run owns a
//! private one as the kill switch its stage monitors listen on.

mod token;

pub use token::{CancelCallback, CancellationToken};
