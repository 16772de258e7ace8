use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use crate::error_sink::ErrorSink;
use crate::registry::StreamDescriptor;
use crate::sample::{FieldValue, Fields, Sample, Tags};
use crate::transmitter::{TransmitError, Transmitter};

/// Sample tagged with a sequence number in field `seq`.
pub fn sample(stream: &str, seq: i64) -> Sample {
    Sample::new(stream, Tags::new(), seq_fields(seq), SystemTime::now()).unwrap()
}

pub fn seq_fields(seq: i64) -> Fields {
    Fields::from([("seq".to_owned(), FieldValue::Integer(seq))])
}

/// Sequence numbers of `samples`, in order.
pub fn seqs(samples: &[Sample]) -> Vec<i64> {
    samples
        .iter()
        .map(|s| match s.fields().get("seq") {
            Some(FieldValue::Integer(n)) => *n,
            other => panic!("sample without seq field: {other:?}"),
        })
        .collect()
}

pub fn rejected() -> TransmitError {
    TransmitError::Rejected {
        status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
        body: String::new(),
    }
}

/// Every batch a [`RecordingTransmitter`] was asked to send, failed or not.
#[derive(Default)]
pub struct TransmitLog {
    batches: Mutex<Vec<(String, Vec<Sample>)>>,
    failing: AtomicBool,
    latency_ms: AtomicU64,
}

impl TransmitLog {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make each transmit take `latency` after it has been recorded.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    /// `(stream, seqs)` per call.
    pub fn batches(&self) -> Vec<(String, Vec<i64>)> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .map(|(stream, samples)| (stream.clone(), seqs(samples)))
            .collect()
    }

    pub fn samples(&self) -> Vec<Vec<Sample>> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .map(|(_, samples)| samples.clone())
            .collect()
    }
}

pub struct RecordingTransmitter {
    log: Arc<TransmitLog>,
}

impl RecordingTransmitter {
    pub fn new() -> (Self, Arc<TransmitLog>) {
        let log = Arc::new(TransmitLog::default());
        (
            Self {
                log: Arc::clone(&log),
            },
            log,
        )
    }
}

impl Transmitter for RecordingTransmitter {
    async fn transmit(
        &self,
        stream: &StreamDescriptor,
        samples: &[Sample],
    ) -> Result<(), TransmitError> {
        self.log
            .batches
            .lock()
            .unwrap()
            .push((stream.name.clone(), samples.to_vec()));
        let latency = self.log.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.log.failing.load(Ordering::SeqCst) {
            Err(rejected())
        } else {
            Ok(())
        }
    }
}

/// Collects `(context, message)` for every reported failure.
#[derive(Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<(String, String)>>,
}

impl RecordingSink {
    pub fn reports(&self) -> Vec<(String, String)> {
        self.reports.lock().unwrap().clone()
    }
}

impl ErrorSink for RecordingSink {
    fn report(&self, context: &str, error: &TransmitError) {
        self.reports
            .lock()
            .unwrap()
            .push((context.to_owned(), error.to_string()));
    }
}
