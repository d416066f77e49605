//! Bounded event pipeline
//!
//! Single bounded channel, non-blocking producers. A full channel drops
//! the newest event and counts it; the request path never waits for the
//! consumer.

use crate::event::Event;
use crate::patterns::AccessPatternLog;
use crate::sink::AccessLogSink;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Producer handle for emitting events
#[derive(Clone)]
pub struct EventPipeline {
    tx: mpsc::Sender<Event>,
    dropped: Arc<AtomicU64>,
}

impl EventPipeline {
    /// Create a pipeline with the given channel capacity
    ///
    /// Returns the producer handle and the receiver to hand to
    /// [`run_consumer`].
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Emit one event; returns false if the channel was full
    pub fn emit(&self, event: Event) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("event channel closed; dropping event");
                false
            }
        }
    }

    /// Events dropped since startup
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Drain events into the sink and the access-pattern log
///
/// Runs until the producer side is gone. Sink failures are logged and
/// skipped; a slow sink only delays events already buffered.
pub async fn run_consumer(
    mut rx: mpsc::Receiver<Event>,
    sink: Arc<dyn AccessLogSink>,
    patterns: Arc<AccessPatternLog>,
) {
    while let Some(event) = rx.recv().await {
        patterns.record(&event);
        if let Err(e) = sink.record(&event).await {
            warn!("access log sink failed: {}", e);
        }
    }
    debug!("event consumer stopped");
}
