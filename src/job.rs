//! Job records: identity, parameters, status and terminal outcome

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Opaque job identifier handed back to clients as `uid`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status. `Pending` moves exactly once to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Success,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "success" => Ok(JobStatus::Success),
            "failed" => Ok(JobStatus::Failed),
            other => Err(AppError::Internal(format!("Unknown job status '{}'", other))),
        }
    }
}

/// Generation request as submitted. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobParameters {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub guidance_scale: f32,
    pub steps: u32,
    /// Requested sampler name, stored as sent
    pub sampler: String,
}

/// Terminal result written by the worker; status and result travel together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Reference to the produced artifact
    Success(String),
    /// Human-readable failure description
    Failed(String),
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Success(_) => JobStatus::Success,
            JobOutcome::Failed(_) => JobStatus::Failed,
        }
    }

    pub fn result(&self) -> &str {
        match self {
            JobOutcome::Success(r) | JobOutcome::Failed(r) => r,
        }
    }
}

/// Persisted job record
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub parameters: JobParameters,
    /// Empty while pending
    pub result: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// New pending record
    pub fn pending(id: JobId, parameters: JobParameters) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            parameters,
            result: String::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Apply the terminal outcome. Returns false if the job was already terminal.
    pub fn complete(&mut self, outcome: &JobOutcome, at: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = outcome.status();
        self.result = outcome.result().to_string();
        self.completed_at = Some(at);
        true
    }
}
