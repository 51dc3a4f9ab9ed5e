//! In-memory job store, used for ephemeral runs and tests

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{AppError, Result};
use crate::job::{Job, JobId, JobOutcome};
use crate::store::JobStore;

/// Job store backed by a concurrent hash map. Not durable.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: DashMap<JobId, Job>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &Job) -> Result<()> {
        match self.jobs.entry(job.id.clone()) {
            Entry::Occupied(_) => Err(AppError::DuplicateId(job.id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(job.clone());
                Ok(())
            }
        }
    }

    async fn update_terminal(&self, id: &JobId, outcome: &JobOutcome) -> Result<()> {
        let mut job = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;

        if job.complete(outcome, Utc::now()) {
            Ok(())
        } else {
            Err(AppError::AlreadyTerminal(id.to_string()))
        }
    }

    async fn get(&self, id: &JobId) -> Result<Job> {
        self.jobs
            .get(id)
            .map(|job| job.value().clone())
            .ok_or_else(|| AppError::NotFound(id.to_string()))
    }

    async fn count_pending(&self) -> Result<u64> {
        Ok(self
            .jobs
            .iter()
            .filter(|entry| !entry.status.is_terminal())
            .count() as u64)
    }
}
