//! Event sinks for pipeline observability.
//!
//! Each pipeline holds its own sink; there is no process-wide sink. The
//! default discards everything.

mod sink;

pub(crate) use sink::emit_event;
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
