//! Job queue module - bounded queue and the worker that drains it

pub mod job_queue;
pub mod worker;

pub use job_queue::{bounded, JobQueue, JobReceiver, QueueStats, QueuedJob};
pub use worker::{Worker, WorkerHandle};
