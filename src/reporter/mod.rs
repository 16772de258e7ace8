use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::buffers::OverflowError;
use crate::error_sink::ErrorSink;
use crate::flush_cycle::{self, CycleState, FlushCycle};
use crate::registry::{RegistryError, Stream, StreamDescriptor, StreamRegistry, StreamSettings};
use crate::sample::{FieldValue, Fields, Sample, SampleError, Tags};
use crate::transmitter::Transmitter;

/// Tag carrying the reporting host, added to every sample.
pub const HOST_TAG: &str = "host";
/// Constant field added to every sample so the store can count them.
pub const COUNT_FIELD: &str = "value";

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("no stream named {0} is registered")]
    UnknownStream(String),

    #[error(transparent)]
    Overflow(#[from] OverflowError),

    #[error("invalid sample: {0}")]
    InvalidSample(#[from] SampleError),

    #[error("reporter is shut down")]
    Closed,
}

/// Buffers samples per stream and flushes each stream on its own cadence.
///
/// Streams can be registered before or after [`Reporter::start`]. `start` and
/// [`Reporter::shutdown`] are one-shot: a reporter runs once per lifetime.
/// Methods that may spawn flush cycles (`start`, and `register_stream` once
/// started) must be called from within a tokio runtime.
pub struct Reporter<T: Transmitter> {
    transmitter: Arc<T>,
    hostname: String,
    registry: StreamRegistry,
    error_sink: Option<Arc<dyn ErrorSink>>,
    started: AtomicBool,
    shutdown: CancellationToken,
    cycles: TaskTracker,
    /// Read-held by `submit` and cycle spawning, write-held by `shutdown` while
    /// it cancels. A sample accepted under the read guard is always in its
    /// buffer before the final drain snapshots it.
    lifecycle: RwLock<()>,
}

impl<T: Transmitter> Reporter<T> {
    pub fn new(transmitter: T, hostname: impl Into<String>) -> Self {
        Self {
            transmitter: Arc::new(transmitter),
            hostname: hostname.into(),
            registry: StreamRegistry::new(),
            error_sink: None,
            started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            cycles: TaskTracker::new(),
            lifecycle: RwLock::new(()),
        }
    }

    /// Route transmit failures to `sink`. Without one they are dropped.
    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = Some(sink);
        self
    }

    /// Register a stream. If the reporter is already running, the stream's
    /// flush cycle starts immediately.
    pub fn register_stream(
        &self,
        settings: StreamSettings,
    ) -> Result<Arc<StreamDescriptor>, RegistryError> {
        let stream = self.registry.register(settings)?;
        debug!(
            stream = %stream.descriptor().name,
            capacity = stream.descriptor().capacity,
            interval = ?stream.descriptor().flush_interval,
            "registered stream"
        );

        if self.started.load(Ordering::SeqCst) {
            self.ensure_cycle(&stream);
        }
        Ok(Arc::clone(stream.descriptor()))
    }

    /// Start a flush cycle for every registered stream. Call once; later calls
    /// are ignored.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("reporter already started");
            return;
        }

        let streams = self.registry.streams();
        for stream in &streams {
            self.ensure_cycle(stream);
        }
        debug!(streams = streams.len(), "reporter started");
    }

    /// Queue a sample for `stream`.
    ///
    /// The sample is stamped with the current time, a `host` tag and a
    /// `value = 1i` field. Those two keys overwrite caller-supplied ones.
    pub fn submit(&self, stream: &str, mut tags: Tags, mut fields: Fields) -> Result<(), SubmitError> {
        let _guard = self.read_lifecycle();
        if self.shutdown.is_cancelled() {
            return Err(SubmitError::Closed);
        }

        let entry = self
            .registry
            .stream(stream)
            .ok_or_else(|| SubmitError::UnknownStream(stream.to_owned()))?;

        tags.insert(HOST_TAG.to_owned(), self.hostname.clone());
        fields.insert(COUNT_FIELD.to_owned(), FieldValue::Integer(1));

        let sample = Sample::new(stream, tags, fields, SystemTime::now())?;
        entry.buffer().push(sample)?;
        Ok(())
    }

    /// Stop every flush cycle after its final drain, and wait for all of them.
    ///
    /// Streams whose cycle never ran (the reporter was never started) get a
    /// drain task of their own. Only the first call cancels; every call waits
    /// until all drains have finished.
    pub async fn shutdown(&self) {
        {
            let _guard = self.write_lifecycle();
            if !self.shutdown.is_cancelled() {
                self.shutdown.cancel();
                for stream in self.registry.streams() {
                    if stream.transition(CycleState::Idle, CycleState::Draining) {
                        self.cycles.spawn(drain_idle(
                            stream,
                            Arc::clone(&self.transmitter),
                            self.error_sink.clone(),
                        ));
                    }
                }
                self.cycles.close();
            }
        }

        self.cycles.wait().await;
        debug!("reporter shut down");
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn find_stream(&self, name: &str) -> Option<Arc<StreamDescriptor>> {
        self.registry.find_by_name(name)
    }

    pub fn cycle_state(&self, name: &str) -> Option<CycleState> {
        self.registry.stream(name).map(|s| s.cycle_state())
    }

    /// Number of samples currently buffered for `name`.
    pub fn buffered(&self, name: &str) -> Option<usize> {
        self.registry.stream(name).map(|s| s.buffer().len())
    }

    /// Spawn the stream's flush cycle unless it is already running or the
    /// reporter is shutting down. Shared by `start` and late registration.
    fn ensure_cycle(&self, stream: &Arc<Stream>) {
        let _guard = self.read_lifecycle();
        if self.shutdown.is_cancelled() || !stream.begin_cycle() {
            return;
        }

        let cycle = FlushCycle::new(
            Arc::clone(stream),
            Arc::clone(&self.transmitter),
            self.error_sink.clone(),
            self.shutdown.clone(),
        );
        self.cycles.spawn(cycle.run());
    }

    fn read_lifecycle(&self) -> RwLockReadGuard<'_, ()> {
        self.lifecycle.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_lifecycle(&self) -> RwLockWriteGuard<'_, ()> {
        self.lifecycle.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Final drain for a stream whose cycle never started.
async fn drain_idle<T: Transmitter>(
    stream: Arc<Stream>,
    transmitter: Arc<T>,
    error_sink: Option<Arc<dyn ErrorSink>>,
) {
    flush_cycle::flush_stream(&stream, &*transmitter, error_sink.as_deref()).await;
    stream.transition(CycleState::Draining, CycleState::Stopped);
}
