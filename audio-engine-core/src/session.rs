//! Session plumbing shared by the backends.
//!
//! A session is one `start`..`stop` lifetime: an atomic running flag the
//! producer polls, an optional join handle when the engine owns the producer
//! thread (Windows), and delivery counters.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::models::error::CaptureError;

/// Delivery counters for a capture session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub buffers_delivered: u64,
    pub bytes_delivered: u64,
}

/// Shared, thread-safe counter cell updated from the producer side.
#[derive(Clone, Default)]
pub struct SharedStats(Arc<StatsInner>);

#[derive(Default)]
struct StatsInner {
    buffers: AtomicU64,
    bytes: AtomicU64,
}

impl SharedStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one delivered buffer of `len` bytes.
    pub fn record(&self, len: usize) {
        self.0.buffers.fetch_add(1, Ordering::Relaxed);
        self.0.bytes.fetch_add(len as u64, Ordering::Relaxed);
    }

    /// Reset both counters; called when a fresh session starts.
    pub fn reset(&self) {
        self.0.buffers.store(0, Ordering::Relaxed);
        self.0.bytes.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SessionStats {
        SessionStats {
            buffers_delivered: self.0.buffers.load(Ordering::Relaxed),
            bytes_delivered: self.0.bytes.load(Ordering::Relaxed),
        }
    }
}

/// Handle to an active capture session.
///
/// The running flag has release/acquire visibility between `stop` and the
/// producer; the producer clears it itself when it exits on error, which is
/// how the engine tells a dead session from a live one.
pub struct SessionHandle {
    running: Arc<AtomicBool>,
    join: Mutex<Option<thread::JoinHandle<()>>>,
}

impl SessionHandle {
    /// Spawn a named producer thread. The body receives the running flag
    /// and must exit promptly once it reads `false`; it should also clear
    /// the flag itself when leaving on a failure path.
    pub fn spawn<F>(name: &str, body: F) -> Result<Self, CaptureError>
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let join = thread::Builder::new()
            .name(name.into())
            .spawn(move || body(flag))
            .map_err(|e| {
                CaptureError::DeviceDisconnected(format!("failed to spawn capture thread: {e}"))
            })?;
        Ok(Self {
            running,
            join: Mutex::new(Some(join)),
        })
    }

    /// Session whose producer is scheduled by the OS (dispatch queues); the
    /// flag gates delegate callbacks, there is no thread to join.
    pub fn unthreaded() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            join: Mutex::new(None),
        }
    }

    /// Flag handed to the producer / delegate.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Clear the flag and join the producer thread, if any. Idempotent.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(join) = self.join.lock().take() {
            let _ = join.join();
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    #[test]
    fn stop_joins_the_producer() {
        let iterations = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&iterations);
        let session = SessionHandle::spawn("test-producer", move |running| {
            while running.load(Ordering::SeqCst) {
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(1));
            }
        })
        .unwrap();

        thread::sleep(Duration::from_millis(20));
        session.stop();
        let after_stop = iterations.load(Ordering::SeqCst);
        assert!(after_stop > 0);

        // The thread is gone; the counter no longer moves.
        thread::sleep(Duration::from_millis(20));
        assert_eq!(iterations.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn stop_is_idempotent() {
        let session = SessionHandle::spawn("test-producer", |running| {
            while running.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
        })
        .unwrap();
        session.stop();
        session.stop();
        assert!(!session.is_running());
    }

    #[test]
    fn producer_exit_clears_liveness() {
        let session = SessionHandle::spawn("test-producer", |running| {
            // Failure path: the body clears the flag and leaves.
            running.store(false, Ordering::SeqCst);
        })
        .unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(!session.is_running());
    }

    #[test]
    fn unthreaded_session_toggles() {
        let session = SessionHandle::unthreaded();
        assert!(session.is_running());
        let flag = session.running_flag();
        session.stop();
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[test]
    fn stats_accumulate_and_reset() {
        let stats = SharedStats::new();
        stats.record(4096);
        stats.record(2048);
        assert_eq!(
            stats.snapshot(),
            SessionStats {
                buffers_delivered: 2,
                bytes_delivered: 6144
            }
        );
        stats.reset();
        assert_eq!(stats.snapshot(), SessionStats::default());
    }
}
