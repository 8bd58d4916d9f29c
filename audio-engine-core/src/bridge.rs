//! Producer-to-consumer delivery bridge.
//!
//! The capture backends invoke the sink callbacks on a real-time producer
//! thread; the consumer runs cooperatively elsewhere. [`CaptureBridge`] is
//! the crossing: the sink side copies each buffer synchronously and enqueues
//! it, the [`BridgeReceiver`] drains in strict FIFO order. Buffers reach the
//! consumer whole and in capture order; nothing is re-ordered or split.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use crate::models::error::CaptureError;
use crate::traits::sink::CaptureSink;

/// One delivery from the producer side.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// An owned copy of a PCM buffer, exactly as delivered to `on_data`.
    Data(Vec<u8>),
    /// A capture error, exactly as delivered to `on_error`.
    Error(CaptureError),
}

/// Sink half of the bridge. Hand an `Arc<CaptureBridge>` to
/// [`AudioEngine::start`](crate::traits::engine::AudioEngine::start).
pub struct CaptureBridge {
    tx: mpsc::Sender<BridgeEvent>,
}

/// Consumer half of the bridge.
pub struct BridgeReceiver {
    rx: mpsc::Receiver<BridgeEvent>,
}

/// Create a connected bridge pair.
pub fn channel() -> (CaptureBridge, BridgeReceiver) {
    let (tx, rx) = mpsc::channel();
    (CaptureBridge { tx }, BridgeReceiver { rx })
}

impl CaptureSink for CaptureBridge {
    fn on_data(&self, pcm: &[u8]) {
        // The borrow ends when this call returns; copy now.
        if self.tx.send(BridgeEvent::Data(pcm.to_vec())).is_err() {
            log::debug!("bridge receiver dropped, discarding {} bytes", pcm.len());
        }
    }

    fn on_error(&self, error: &CaptureError) {
        if self.tx.send(BridgeEvent::Error(error.clone())).is_err() {
            log::debug!("bridge receiver dropped, discarding error: {error}");
        }
    }
}

impl BridgeReceiver {
    /// Next event, waiting up to `timeout`. `None` when the timeout elapses
    /// or every sender is gone.
    pub fn next_timeout(&self, timeout: Duration) -> Option<BridgeEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Next event if one is already queued.
    pub fn try_next(&self) -> Option<BridgeEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain everything currently queued, in delivery order.
    pub fn drain(&self) -> Vec<BridgeEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_next() {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use crate::traits::sink::SharedSink;

    use super::*;

    #[test]
    fn preserves_delivery_order_across_threads() {
        let (bridge, rx) = channel();
        let sink: SharedSink = Arc::new(bridge);

        let producer = {
            let sink = Arc::clone(&sink);
            thread::spawn(move || {
                for i in 0..100u16 {
                    sink.on_data(&i.to_le_bytes());
                }
            })
        };
        producer.join().unwrap();

        let events = rx.drain();
        assert_eq!(events.len(), 100);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(*event, BridgeEvent::Data((i as u16).to_le_bytes().to_vec()));
        }
    }

    #[test]
    fn copies_the_borrowed_buffer() {
        let (bridge, rx) = channel();
        let mut scratch = vec![1u8, 2, 3, 4];
        bridge.on_data(&scratch);
        // Mutating the producer's buffer after the call must not affect the
        // queued copy.
        scratch.fill(0);

        assert_eq!(rx.try_next(), Some(BridgeEvent::Data(vec![1, 2, 3, 4])));
    }

    #[test]
    fn errors_pass_through() {
        let (bridge, rx) = channel();
        bridge.on_error(&CaptureError::DeviceNotFound("m1".into()));
        match rx.try_next() {
            Some(BridgeEvent::Error(err)) => assert_eq!(err.code(), "DEVICE_NOT_FOUND"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn sends_after_receiver_drop_are_discarded() {
        let (bridge, rx) = channel();
        drop(rx);
        // Must not panic.
        bridge.on_data(&[0, 0]);
        bridge.on_error(&CaptureError::PermissionDenied);
    }

    #[test]
    fn next_timeout_returns_none_when_idle() {
        let (_bridge, rx) = channel();
        assert_eq!(rx.next_timeout(Duration::from_millis(10)), None);
    }
}
