//! Job status store - durable table of job records keyed by uid

pub mod memory;
pub mod sqlite;

pub use memory::MemoryJobStore;
pub use sqlite::SqliteJobStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::job::{Job, JobId, JobOutcome};

/// Storage for job records.
///
/// Every operation is atomic on its own. Readers observe a record either
/// before or after a terminal update, never in between.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new record; fails with `DuplicateId` if the uid exists
    async fn create(&self, job: &Job) -> Result<()>;

    /// Move a pending job to its terminal state
    async fn update_terminal(&self, id: &JobId, outcome: &JobOutcome) -> Result<()>;

    /// Point lookup by uid
    async fn get(&self, id: &JobId) -> Result<Job>;

    /// Number of jobs still waiting for a terminal state
    async fn count_pending(&self) -> Result<u64>;
}
