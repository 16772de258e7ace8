use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use thiserror::Error;

use crate::buffers::StreamBuffer;
use crate::flush_cycle::CycleState;

pub const DEFAULT_CAPACITY: usize = 1000;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

// Retention policies present on a stock InfluxDB install.
pub const AUTOGEN_RP: &str = "autogen";
pub const SHORT_TERM_RP: &str = "shortterm";

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("stream {0} is already registered")]
    DuplicateStream(String),

    #[error("stream name must not be empty")]
    EmptyName,

    #[error("stream {0}: capacity must be positive")]
    InvalidCapacity(String),

    #[error("stream {0}: flush interval must be non-zero")]
    InvalidFlushInterval(String),
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown precision: {0} (expected ns, u, ms, s, m or h)")]
pub struct UnknownPrecision(pub String);

/// Timestamp resolution of written points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    #[default]
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
}

impl Precision {
    pub fn parse(raw: &str) -> Result<Self, UnknownPrecision> {
        match raw {
            "" | "ns" | "n" => Ok(Precision::Nanoseconds),
            "u" | "us" => Ok(Precision::Microseconds),
            "ms" => Ok(Precision::Milliseconds),
            "s" => Ok(Precision::Seconds),
            "m" => Ok(Precision::Minutes),
            "h" => Ok(Precision::Hours),
            other => Err(UnknownPrecision(other.to_owned())),
        }
    }

    /// Value of the `precision` query parameter of the write API.
    pub fn as_str(self) -> &'static str {
        match self {
            Precision::Nanoseconds => "ns",
            Precision::Microseconds => "u",
            Precision::Milliseconds => "ms",
            Precision::Seconds => "s",
            Precision::Minutes => "m",
            Precision::Hours => "h",
        }
    }

    pub fn nanos_per_unit(self) -> i128 {
        match self {
            Precision::Nanoseconds => 1,
            Precision::Microseconds => 1_000,
            Precision::Milliseconds => 1_000_000,
            Precision::Seconds => 1_000_000_000,
            Precision::Minutes => 60_000_000_000,
            Precision::Hours => 3_600_000_000_000,
        }
    }
}

/// Immutable definition of a registered stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    pub name: String,
    pub database: String,
    pub retention_policy: Option<String>,
    pub precision: Precision,
    pub capacity: usize,
    pub flush_interval: Duration,
}

/// Registration input. Unset options resolve to defaults when registered.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    name: String,
    database: String,
    retention_policy: Option<String>,
    precision: Option<Precision>,
    capacity: Option<usize>,
    flush_interval: Option<Duration>,
}

impl StreamSettings {
    pub fn new(name: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            database: database.into(),
            retention_policy: None,
            precision: None,
            capacity: None,
            flush_interval: None,
        }
    }

    pub fn retention_policy(mut self, rp: impl Into<String>) -> Self {
        self.retention_policy = Some(rp.into());
        self
    }

    pub fn precision(mut self, precision: Precision) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = Some(interval);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn resolve(self) -> Result<StreamDescriptor, RegistryError> {
        if self.name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let capacity = self.capacity.unwrap_or(DEFAULT_CAPACITY);
        if capacity == 0 {
            return Err(RegistryError::InvalidCapacity(self.name));
        }
        let flush_interval = self.flush_interval.unwrap_or(DEFAULT_FLUSH_INTERVAL);
        if flush_interval.is_zero() {
            return Err(RegistryError::InvalidFlushInterval(self.name));
        }

        Ok(StreamDescriptor {
            name: self.name,
            database: self.database,
            retention_policy: self.retention_policy,
            precision: self.precision.unwrap_or_default(),
            capacity,
            flush_interval,
        })
    }
}

/// A registered stream: its descriptor, its buffer and the state of its flush cycle.
#[derive(Debug)]
pub struct Stream {
    descriptor: Arc<StreamDescriptor>,
    buffer: StreamBuffer,
    cycle: AtomicU8,
}

impl Stream {
    fn new(descriptor: StreamDescriptor) -> Self {
        let buffer = StreamBuffer::new(descriptor.name.clone(), descriptor.capacity);
        Self {
            descriptor: Arc::new(descriptor),
            buffer,
            cycle: AtomicU8::new(CycleState::Idle as u8),
        }
    }

    pub fn descriptor(&self) -> &Arc<StreamDescriptor> {
        &self.descriptor
    }

    pub fn buffer(&self) -> &StreamBuffer {
        &self.buffer
    }

    pub fn cycle_state(&self) -> CycleState {
        CycleState::from_u8(self.cycle.load(Ordering::Acquire))
    }

    /// Move the cycle from `from` to `to`. Returns `false` if the cycle was not in `from`.
    pub(crate) fn transition(&self, from: CycleState, to: CycleState) -> bool {
        self.cycle
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Claim the right to run this stream's flush cycle. Only the first caller wins.
    pub(crate) fn begin_cycle(&self) -> bool {
        self.transition(CycleState::Idle, CycleState::Running)
    }
}

/// Streams by name. Append-only: streams are never removed or replaced.
#[derive(Default)]
pub struct StreamRegistry {
    streams: RwLock<HashMap<String, Arc<Stream>>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stream, applying defaults. A name can only be registered
    /// once; later registrations fail and leave the first one in place.
    pub fn register(&self, settings: StreamSettings) -> Result<Arc<Stream>, RegistryError> {
        let descriptor = settings.resolve()?;
        let mut streams = self.streams.write().unwrap_or_else(PoisonError::into_inner);
        if streams.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateStream(descriptor.name));
        }
        let stream = Arc::new(Stream::new(descriptor));
        streams.insert(stream.descriptor.name.clone(), Arc::clone(&stream));
        Ok(stream)
    }

    pub fn find_by_name(&self, name: &str) -> Option<Arc<StreamDescriptor>> {
        self.stream(name).map(|s| Arc::clone(&s.descriptor))
    }

    pub fn stream(&self, name: &str) -> Option<Arc<Stream>> {
        self.streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// All registered streams, ordered by name.
    pub fn streams(&self) -> Vec<Arc<Stream>> {
        let mut all: Vec<_> = self
            .streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.descriptor.name.cmp(&b.descriptor.name));
        all
    }

    pub fn len(&self) -> usize {
        self.streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests;
