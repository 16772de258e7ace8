//! Per-stream buffering and periodic flushing of metric samples to InfluxDB.
//!
//! Callers [`submit`](Reporter::submit) samples synchronously. Each registered
//! stream buffers up to its capacity and is flushed by its own task on its own
//! interval. A failed flush leaves the samples queued for the next one.

pub mod buffers;
pub mod config;
pub mod error_sink;
pub mod flush_cycle;
pub mod listener;
pub mod registry;
pub mod reporter;
pub mod sample;
pub mod transmitter;

#[cfg(test)]
mod testing;

pub use buffers::{OverflowError, StreamBuffer};
pub use error_sink::{ErrorSink, TracingErrorSink};
pub use flush_cycle::CycleState;
pub use registry::{Precision, StreamDescriptor, StreamRegistry, StreamSettings};
pub use reporter::{Reporter, SubmitError};
pub use sample::{FieldValue, Fields, Sample, SampleError, Tags};
pub use transmitter::{InfluxTransmitter, TransmitError, Transmitter};
