//! Bounded FIFO between request handlers and the single worker

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

use crate::error::{AppError, Result};
use crate::job::{JobId, JobParameters};

/// Job waiting for the worker
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub id: JobId,
    pub parameters: JobParameters,
    pub accepted_at: Instant,
}

impl QueuedJob {
    pub fn new(id: JobId, parameters: JobParameters) -> Self {
        Self {
            id,
            parameters,
            accepted_at: Instant::now(),
        }
    }
}

/// Queue statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queued: usize,
    pub capacity: usize,
    pub processed: u64,
}

/// Create a queue holding at most `capacity` jobs
pub fn bounded(capacity: usize) -> (JobQueue, JobReceiver) {
    let capacity = capacity.max(1);
    let (sender, receiver) = mpsc::channel(capacity);
    let processed = Arc::new(AtomicU64::new(0));

    (
        JobQueue {
            sender,
            capacity,
            processed: processed.clone(),
        },
        JobReceiver {
            receiver,
            processed,
        },
    )
}

/// Producer side. Cheap to clone; never blocks.
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<QueuedJob>,
    capacity: usize,
    processed: Arc<AtomicU64>,
}

/// A place in the queue held for one job; released if dropped unsent
pub struct QueueSlot<'a> {
    permit: mpsc::Permit<'a, QueuedJob>,
}

impl QueueSlot<'_> {
    pub fn send(self, job: QueuedJob) {
        debug!(uid = %job.id, "Job queued");
        self.permit.send(job);
    }
}

impl JobQueue {
    /// Enqueue, or fail with `QueueFull` when `capacity` jobs are waiting
    pub fn try_enqueue(&self, job: QueuedJob) -> Result<()> {
        match self.sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(AppError::QueueFull {
                capacity: self.capacity,
            }),
            Err(TrySendError::Closed(_)) => Err(closed()),
        }
    }

    /// Hold a place in the queue without sending yet.
    ///
    /// Lets the caller persist a job record only once a slot is guaranteed.
    pub fn try_reserve(&self) -> Result<QueueSlot<'_>> {
        match self.sender.try_reserve() {
            Ok(permit) => Ok(QueueSlot { permit }),
            Err(TrySendError::Full(())) => Err(AppError::QueueFull {
                capacity: self.capacity,
            }),
            Err(TrySendError::Closed(())) => Err(closed()),
        }
    }

    /// Jobs currently waiting, including reserved slots
    pub fn len(&self) -> usize {
        self.capacity - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.sender.capacity() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            queued: self.len(),
            capacity: self.capacity,
            processed: self.processed.load(Ordering::Relaxed),
        }
    }
}

fn closed() -> AppError {
    AppError::Internal("Worker is not running".to_string())
}

/// Consumer side, owned by the worker
pub struct JobReceiver {
    receiver: mpsc::Receiver<QueuedJob>,
    processed: Arc<AtomicU64>,
}

impl JobReceiver {
    /// Wait for the next job; `None` once every producer is gone
    pub async fn dequeue(&mut self) -> Option<QueuedJob> {
        self.receiver.recv().await
    }

    pub(crate) fn mark_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }
}
