use std::sync::Arc;

use crate::models::error::CaptureError;

/// Receiver for the two capture callbacks.
///
/// Both methods are invoked from the producer thread (or the OS-owned
/// delegate queue), never from the consumer's thread. Implementations must
/// marshal across that boundary themselves — see [`crate::bridge`].
pub trait CaptureSink: Send + Sync {
    /// A buffer of interleaved signed 16-bit little-endian PCM.
    ///
    /// `pcm` is borrowed for the duration of the call only; copy before
    /// returning. The length is always a positive multiple of
    /// `2 × channels` bytes.
    fn on_data(&self, pcm: &[u8]);

    /// A capture failure.
    ///
    /// Fatal conditions are reported at most once per session and terminate
    /// the producer loop.
    fn on_error(&self, error: &CaptureError);
}

/// Shared handle to a sink, cloned into the producer thread.
pub type SharedSink = Arc<dyn CaptureSink>;

/// Sink built from two closures. Handy for tests and thin consumers that
/// do their own marshalling.
pub struct ClosureSink<D, E>
where
    D: Fn(&[u8]) + Send + Sync,
    E: Fn(&CaptureError) + Send + Sync,
{
    on_data: D,
    on_error: E,
}

impl<D, E> ClosureSink<D, E>
where
    D: Fn(&[u8]) + Send + Sync,
    E: Fn(&CaptureError) + Send + Sync,
{
    pub fn new(on_data: D, on_error: E) -> Self {
        Self { on_data, on_error }
    }
}

impl<D, E> CaptureSink for ClosureSink<D, E>
where
    D: Fn(&[u8]) + Send + Sync,
    E: Fn(&CaptureError) + Send + Sync,
{
    fn on_data(&self, pcm: &[u8]) {
        (self.on_data)(pcm)
    }

    fn on_error(&self, error: &CaptureError) {
        (self.on_error)(error)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn closure_sink_routes_both_callbacks() {
        let data_count = Arc::new(AtomicUsize::new(0));
        let error_count = Arc::new(AtomicUsize::new(0));

        let sink: SharedSink = {
            let data_count = Arc::clone(&data_count);
            let error_count = Arc::clone(&error_count);
            Arc::new(ClosureSink::new(
                move |pcm: &[u8]| {
                    data_count.fetch_add(pcm.len(), Ordering::SeqCst);
                },
                move |_: &CaptureError| {
                    error_count.fetch_add(1, Ordering::SeqCst);
                },
            ))
        };

        sink.on_data(&[0, 0, 1, 0]);
        sink.on_error(&CaptureError::PermissionDenied);

        assert_eq!(data_count.load(Ordering::SeqCst), 4);
        assert_eq!(error_count.load(Ordering::SeqCst), 1);
    }
}
