//! Single background worker that owns the engine

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::engine::{Artifact, Engine, EngineAdapter, EngineError};
use crate::job::{JobOutcome, JobParameters};
use crate::queue::job_queue::{JobReceiver, QueuedJob};
use crate::response::ArtifactWriter;
use crate::store::JobStore;

/// Worker loop: dequeue, generate, persist the terminal record, repeat.
///
/// There is exactly one per process, so at most one job touches the engine
/// at any time.
pub struct Worker<E: Engine> {
    receiver: JobReceiver,
    adapter: Option<EngineAdapter<E>>,
    store: Arc<dyn JobStore>,
    writer: ArtifactWriter,
    stop: Arc<Notify>,
}

/// Handle to the running worker task
pub struct WorkerHandle {
    stop: Arc<Notify>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Stop dequeuing and wait for the worker to exit.
    ///
    /// The job being processed finishes first; jobs still queued stay `pending`.
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.task.await {
            error!(error = %e, "Worker task ended abnormally");
        }
    }

    /// Ask the worker to exit once the current job is done
    pub fn stop(&self) {
        self.stop.notify_one();
    }
}

impl<E: Engine> Worker<E> {
    /// Start the worker on the current runtime
    pub fn spawn(
        receiver: JobReceiver,
        adapter: EngineAdapter<E>,
        store: Arc<dyn JobStore>,
        writer: ArtifactWriter,
    ) -> WorkerHandle {
        let stop = Arc::new(Notify::new());
        let worker = Worker {
            receiver,
            adapter: Some(adapter),
            store,
            writer,
            stop: stop.clone(),
        };

        let task = tokio::spawn(worker.run());
        WorkerHandle { stop, task }
    }

    async fn run(mut self) {
        info!("Worker started");

        loop {
            let job = tokio::select! {
                biased;
                _ = self.stop.notified() => {
                    debug!("Stop requested");
                    break;
                }
                job = self.receiver.dequeue() => match job {
                    Some(job) => job,
                    None => {
                        debug!("All producers gone");
                        break;
                    }
                },
            };

            self.process(job).await;
        }

        // The engine may hold blocking resources; release them off the executor
        if let Some(adapter) = self.adapter.take() {
            let _ = tokio::task::spawn_blocking(move || drop(adapter)).await;
        }

        info!("Worker stopped");
    }

    async fn process(&mut self, job: QueuedJob) {
        let started = Instant::now();
        info!(
            uid = %job.id,
            sampler = %job.parameters.sampler,
            waited_ms = job.accepted_at.elapsed().as_millis() as u64,
            "Processing job"
        );

        let outcome = match self.generate(job.parameters).await {
            Ok(artifact) => match self.writer.save(&job.id, &artifact).await {
                Ok(path) => JobOutcome::Success(path),
                Err(e) => JobOutcome::Failed(format!("Failed to generate {}", e)),
            },
            Err(e) => JobOutcome::Failed(format!("Failed to generate {}", e)),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            JobOutcome::Success(path) => {
                info!(uid = %job.id, result = %path, elapsed_ms, "Job succeeded")
            }
            JobOutcome::Failed(message) => {
                warn!(uid = %job.id, error = %message, elapsed_ms, "Job failed")
            }
        }

        if let Err(e) = self.store.update_terminal(&job.id, &outcome).await {
            error!(uid = %job.id, error = %e, "Failed to persist job result");
        }
        self.receiver.mark_processed();
    }

    /// Run the engine on the blocking pool. The adapter moves into the
    /// blocking task and comes back with the result.
    async fn generate(&mut self, params: JobParameters) -> Result<Artifact, EngineError> {
        let mut adapter = self
            .adapter
            .take()
            .ok_or_else(|| EngineError::Backend("engine is unavailable".to_string()))?;

        let joined = tokio::task::spawn_blocking(move || {
            let result = adapter.run(&params);
            (adapter, result)
        })
        .await;

        match joined {
            Ok((adapter, result)) => {
                self.adapter = Some(adapter);
                result
            }
            Err(e) => {
                error!(error = %e, "Engine task lost");
                Err(EngineError::Panicked(e.to_string()))
            }
        }
    }
}
