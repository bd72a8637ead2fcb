//! Sync event sinks

pub mod sinks;

pub use sinks::{BroadcastEventSink, FanoutEventSink, TracingEventSink};
