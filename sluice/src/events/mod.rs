//! Event sinks: the monitoring surface.
//!
//! Every stage-run transition is delivered to the configured sink; external
//! log and metric collectors attach here.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
