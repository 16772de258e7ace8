use tracing::error;

use crate::transmitter::TransmitError;

/// Receives transmit failures from flush cycles.
///
/// A reporter without a sink drops failures silently; the data itself stays
/// buffered for the next flush either way.
pub trait ErrorSink: Send + Sync {
    fn report(&self, context: &str, error: &TransmitError);
}

impl<F> ErrorSink for F
where
    F: Fn(&str, &TransmitError) + Send + Sync,
{
    fn report(&self, context: &str, error: &TransmitError) {
        self(context, error)
    }
}

/// Logs failures through `tracing` at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, context: &str, error: &TransmitError) {
        error!(stream = context, error = %error, "send points failed");
    }
}
