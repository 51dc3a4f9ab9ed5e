//! Asynchronous generation job queue
//!
//! Long-running text-to-image requests are accepted over HTTP, recorded in a
//! durable job store, queued in a bounded FIFO and executed one at a time by
//! a single worker that owns the generation engine. Clients poll for status.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod queue;
pub mod response;
pub mod store;

pub use error::{AppError, Result};

use std::sync::Arc;

use tracing::{debug, info};

use config::Settings;
use engine::{Engine, EngineAdapter};
use job::{Job, JobId, JobParameters};
use queue::{JobQueue, QueuedJob, Worker, WorkerHandle};
use response::ArtifactWriter;
use store::JobStore;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn JobStore>,
    pub queue: JobQueue,
}

/// Accepted submission
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: JobId,
    /// Jobs waiting right after this one was queued
    pub queued: usize,
    pub capacity: usize,
}

impl AppState {
    /// Build the queue, start the worker and return the shared state.
    ///
    /// The returned handle stops the worker; dropping it leaves the worker
    /// running until every queue handle is gone.
    pub async fn start<E: Engine>(
        settings: Settings,
        store: Arc<dyn JobStore>,
        adapter: EngineAdapter<E>,
    ) -> Result<(Arc<Self>, WorkerHandle)> {
        let writer = ArtifactWriter::new(&settings.storage.output_dir, &settings.storage.url_prefix);
        writer.ensure_output_dir().await?;

        let (queue, receiver) = queue::bounded(settings.queue.capacity);
        let worker = Worker::spawn(receiver, adapter, store.clone(), writer);
        info!(capacity = queue.capacity(), "Job queue started");

        let state = Arc::new(Self {
            settings: Arc::new(settings),
            store,
            queue,
        });
        Ok((state, worker))
    }

    /// Record a new job and queue it.
    ///
    /// The queue slot is reserved before the record is written, so a full
    /// queue leaves no trace in the store and a queued job always has a
    /// `pending` record.
    pub async fn submit(&self, parameters: JobParameters) -> Result<Submission> {
        let slot = self.queue.try_reserve()?;

        let job = Job::pending(JobId::new(), parameters);
        self.store.create(&job).await?;

        let id = job.id.clone();
        slot.send(QueuedJob::new(job.id, job.parameters));

        let queued = self.queue.len();
        debug!(uid = %id, queued, "Job accepted");

        Ok(Submission {
            id,
            queued,
            capacity: self.queue.capacity(),
        })
    }

    /// Current record of a job
    pub async fn status(&self, id: &JobId) -> Result<Job> {
        self.store.get(id).await
    }
}
