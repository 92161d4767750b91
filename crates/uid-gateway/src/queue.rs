//! Accounting event queue and batch windowing
//!
//! The network task appends events without waiting; one background consumer
//! groups them into batches. A window opens when the first event arrives and
//! closes once `batch_size` events are collected or no further event turns up
//! within `batch_wait` of the previous one.

use crate::event::AccountingEvent;
use crate::observability::{Counter, ObservabilitySink};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Consumer of completed batches
pub trait BatchHandler: Send + Sync + 'static {
    fn handle_batch(&self, batch: Vec<AccountingEvent>) -> impl Future<Output = ()> + Send;
}

/// Producer side of the event queue
#[derive(Clone)]
pub struct RequestQueue {
    tx: mpsc::UnboundedSender<AccountingEvent>,
    depth: Arc<AtomicUsize>,
    max_depth: Option<usize>,
    sink: Arc<dyn ObservabilitySink>,
}

impl RequestQueue {
    /// Create a queue and the scheduler that drains it
    pub fn new(
        max_depth: Option<usize>,
        batch_size: usize,
        batch_wait: Duration,
        sink: Arc<dyn ObservabilitySink>,
    ) -> (Self, BatchScheduler) {
        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));

        let queue = RequestQueue {
            tx,
            depth: Arc::clone(&depth),
            max_depth,
            sink: Arc::clone(&sink),
        };
        let scheduler = BatchScheduler {
            rx,
            depth,
            batch_size: batch_size.max(1),
            batch_wait,
            sink,
        };

        (queue, scheduler)
    }

    /// Append an event. Never blocks.
    ///
    /// Returns false if the event was dropped because the queue is full or
    /// the consumer has gone away.
    pub fn enqueue(&self, event: AccountingEvent) -> bool {
        if let Some(max) = self.max_depth {
            if self.depth.load(Ordering::Relaxed) >= max {
                warn!(
                    source = %event.source(),
                    max_queue_depth = max,
                    "Accounting queue is full, dropping event"
                );
                self.sink.increment(Counter::Discarded);
                return false;
            }
        }

        // The gauge is updated before the send so the consumer's update wins
        let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        self.sink.set_queue_depth(depth as u64);

        if self.tx.send(event).is_err() {
            let depth = self.depth.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
            self.sink.set_queue_depth(depth as u64);
            warn!("Batch consumer has stopped, dropping event");
            self.sink.increment(Counter::Discarded);
            return false;
        }

        true
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}

/// Single consumer that turns queued events into batches
pub struct BatchScheduler {
    rx: mpsc::UnboundedReceiver<AccountingEvent>,
    depth: Arc<AtomicUsize>,
    batch_size: usize,
    batch_wait: Duration,
    sink: Arc<dyn ObservabilitySink>,
}

impl BatchScheduler {
    fn dequeued(&self) {
        let depth = self
            .depth
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        self.sink.set_queue_depth(depth as u64);
    }

    /// Collect further events until the batch is full or a dequeue times out
    async fn fill(&mut self, batch: &mut Vec<AccountingEvent>, cancel: &CancellationToken) {
        while batch.len() < self.batch_size {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                next = tokio::time::timeout(self.batch_wait, self.rx.recv()) => next,
            };

            match next {
                Ok(Some(event)) => {
                    self.dequeued();
                    batch.push(event);
                }
                // Closed or timed out
                Ok(None) | Err(_) => return,
            }
        }
    }

    /// Run until cancelled or every producer is dropped.
    ///
    /// A batch already being collected when cancellation arrives is still
    /// handed to `handler` before this returns.
    pub async fn run<H: BatchHandler>(mut self, handler: H, cancel: CancellationToken) {
        loop {
            let first = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                first = self.rx.recv() => match first {
                    Some(event) => event,
                    None => break,
                },
            };
            self.dequeued();

            let mut batch = Vec::with_capacity(self.batch_size);
            batch.push(first);
            self.fill(&mut batch, &cancel).await;

            debug!(
                batch_len = batch.len(),
                queue_depth = self.depth.load(Ordering::Relaxed),
                "Dispatching accounting batch"
            );
            handler.handle_batch(batch).await;

            if cancel.is_cancelled() {
                break;
            }
        }

        debug!("Batch consumer stopped");
    }
}
