use std::sync::Arc;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error_sink::ErrorSink;
use crate::registry::Stream;
use crate::transmitter::Transmitter;

/// Lifecycle of a stream's flush cycle: `Idle → Running → Draining → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CycleState {
    Idle = 0,
    Running = 1,
    Draining = 2,
    Stopped = 3,
}

impl CycleState {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => CycleState::Idle,
            1 => CycleState::Running,
            2 => CycleState::Draining,
            _ => CycleState::Stopped,
        }
    }
}

/// Timer-driven flush loop for one stream.
///
/// Ticks every `flush_interval` (first tick one interval after start) until
/// `shutdown` fires, then drains the buffer one last time. A failed flush is
/// reported and the loop carries on.
pub(crate) struct FlushCycle<T: Transmitter> {
    stream: Arc<Stream>,
    transmitter: Arc<T>,
    error_sink: Option<Arc<dyn ErrorSink>>,
    shutdown: CancellationToken,
}

impl<T: Transmitter> FlushCycle<T> {
    pub fn new(
        stream: Arc<Stream>,
        transmitter: Arc<T>,
        error_sink: Option<Arc<dyn ErrorSink>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            stream,
            transmitter,
            error_sink,
            shutdown,
        }
    }

    /// Drive the cycle to completion. The stream must already be `Running`.
    pub async fn run(self) {
        let period = self.stream.descriptor().flush_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(stream = %self.stream.descriptor().name, ?period, "flush cycle started");

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => self.flush().await,
            }
        }

        self.stream.transition(CycleState::Running, CycleState::Draining);
        self.flush().await;
        self.stream.transition(CycleState::Draining, CycleState::Stopped);

        debug!(stream = %self.stream.descriptor().name, "flush cycle stopped");
    }

    async fn flush(&self) {
        flush_stream(&self.stream, &*self.transmitter, self.error_sink.as_deref()).await;
    }
}

/// One drain-and-flush of `stream` through `transmitter`, reporting failure to `error_sink`.
pub(crate) async fn flush_stream<T: Transmitter>(
    stream: &Stream,
    transmitter: &T,
    error_sink: Option<&dyn ErrorSink>,
) {
    let descriptor = stream.descriptor();
    let result = stream
        .buffer()
        .drain_and_flush(|batch| async move { transmitter.transmit(descriptor, &batch).await })
        .await;

    if let Err(e) = result
        && let Some(sink) = error_sink
    {
        sink.report(&descriptor.name, &e);
    }
}
