use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, warn};

use crate::sample::Sample;

/// Backpressure signal: the stream's buffer is full and the new sample was not queued.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("queue overflow: {stream} holds {capacity} samples")]
pub struct OverflowError {
    pub stream: String,
    pub capacity: usize,
}

/// Bounded FIFO of samples for a single stream.
///
/// `queue` uses `std::sync::Mutex` (not tokio) because the lock is never held
/// across `.await`. It is taken once to snapshot and once to reconcile a flush,
/// and for each push. `flush_guard` is the async lock held for the whole of
/// `drain_and_flush`, so two flushes of one buffer never interleave.
#[derive(Debug)]
pub struct StreamBuffer {
    stream: String,
    capacity: usize,
    queue: Mutex<VecDeque<Sample>>,
    flush_guard: tokio::sync::Mutex<()>,
}

impl StreamBuffer {
    pub fn new(stream: impl Into<String>, capacity: usize) -> Self {
        Self {
            stream: stream.into(),
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            flush_guard: tokio::sync::Mutex::new(()),
        }
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the buffered samples, oldest first.
    pub fn samples(&self) -> Vec<Sample> {
        self.lock().iter().cloned().collect()
    }

    /// Append a sample. Rejects the new sample when the buffer is full; queued
    /// samples are never evicted.
    pub fn push(&self, sample: Sample) -> Result<(), OverflowError> {
        let mut queue = self.lock();
        if queue.len() >= self.capacity {
            return Err(OverflowError {
                stream: self.stream.clone(),
                capacity: self.capacity,
            });
        }
        queue.push_back(sample);
        Ok(())
    }

    /// Hand the currently buffered samples to `transmit` and, if it succeeds,
    /// remove exactly those samples.
    ///
    /// The lock is released while `transmit` runs, so pushes keep landing
    /// behind the snapshot. On failure nothing is removed and the whole
    /// snapshot is offered again on the next flush. An empty buffer returns
    /// `Ok(())` without calling `transmit`.
    pub async fn drain_and_flush<F, Fut, E>(&self, transmit: F) -> Result<(), E>
    where
        F: FnOnce(Vec<Sample>) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let _flushing = self.flush_guard.lock().await;

        let snapshot = self.snapshot();
        let transmitted = snapshot.len();
        if transmitted == 0 {
            return Ok(());
        }

        transmit(snapshot).await?;

        let retained = self.reconcile(transmitted);
        debug!(
            stream = %self.stream,
            transmitted,
            retained,
            "flushed samples"
        );
        Ok(())
    }

    /// Clone the queue contents under the lock. The snapshot length is the
    /// number of samples a successful flush will remove.
    fn snapshot(&self) -> Vec<Sample> {
        self.lock().iter().cloned().collect()
    }

    /// Drop the `transmitted` samples at the head of the queue, keeping
    /// everything pushed after the snapshot. Returns the number retained.
    fn reconcile(&self, transmitted: usize) -> usize {
        let mut queue = self.lock();
        let current = queue.len();
        let appended = match current.checked_sub(transmitted) {
            Some(appended) => appended,
            None => {
                warn!(
                    stream = %self.stream,
                    transmitted,
                    current,
                    "buffer shrank while a flush was in flight"
                );
                0
            }
        };
        queue.drain(..current - appended);
        appended
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Sample>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
