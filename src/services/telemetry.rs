//! Telemetry bus: one logical sink for task events.
//!
//! Every event is broadcast to live subscribers (the SSE surface) and
//! appended to the persistent event store. Persistence batches when a bulk
//! crawl is in flight and writes row-by-row for small runs, so short
//! operations stay immediately inspectable.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::warn;

use crate::models::TaskEvent;
use crate::repository::EventStore;

/// Runs planning more candidate pages than this batch their event writes.
pub const BULK_THRESHOLD: usize = 20;
const BATCH_SIZE: usize = 25;

pub struct TelemetryBus {
    tx: broadcast::Sender<TaskEvent>,
    store: Option<Arc<dyn EventStore>>,
    buffer: Mutex<Vec<TaskEvent>>,
    batch_size: AtomicUsize,
}

impl TelemetryBus {
    pub fn new(store: Option<Arc<dyn EventStore>>) -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            tx,
            store,
            buffer: Mutex::new(Vec::new()),
            batch_size: AtomicUsize::new(1),
        }
    }

    /// Live event feed for SSE subscribers.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.tx.subscribe()
    }

    /// Choose batched or unbatched persistence from the planned page count.
    pub fn set_batch_hint(&self, planned_pages: usize) {
        let size = if planned_pages > BULK_THRESHOLD {
            BATCH_SIZE
        } else {
            1
        };
        self.batch_size.store(size, Ordering::Relaxed);
    }

    /// Emit one event: broadcast, then persist (possibly buffered).
    /// Persistence failures are warnings, never errors.
    pub fn emit(&self, event: TaskEvent) {
        let _ = self.tx.send(event.clone());

        let Some(store) = &self.store else {
            return;
        };

        let batch_size = self.batch_size.load(Ordering::Relaxed);
        if batch_size <= 1 {
            if let Err(e) = store.append(&event) {
                warn!("task event append failed: {}", e);
            }
            return;
        }

        let to_flush = {
            let mut buffer = self.buffer.lock().unwrap();
            buffer.push(event);
            if buffer.len() >= batch_size {
                std::mem::take(&mut *buffer)
            } else {
                Vec::new()
            }
        };
        if !to_flush.is_empty() {
            if let Err(e) = store.append_batch(&to_flush) {
                warn!("task event batch append failed: {}", e);
            }
        }
    }

    /// Flush any buffered events. Called at the end of a run.
    pub fn flush(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let to_flush = std::mem::take(&mut *self.buffer.lock().unwrap());
        if !to_flush.is_empty() {
            if let Err(e) = store.append_batch(&to_flush) {
                warn!("task event flush failed: {}", e);
            }
        }
    }
}
