//! Request and response bodies

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::job::{Job, JobParameters, JobStatus};
use crate::queue::QueueStats;

/// Body of `POST /api/v1/txt2img`
#[derive(Debug, Clone, Deserialize)]
pub struct Txt2ImgBody {
    #[serde(default)]
    pub prompt: String,
    #[serde(default, alias = "neg_prompt")]
    pub negative_prompt: String,
    #[serde(default = "default_dimension")]
    pub width: u32,
    #[serde(default = "default_dimension")]
    pub height: u32,
    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f32,
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default = "default_sampler")]
    pub sampler: String,
}

fn default_dimension() -> u32 {
    1024
}

fn default_guidance_scale() -> f32 {
    7.0
}

fn default_steps() -> u32 {
    28
}

fn default_sampler() -> String {
    "Euler a".to_string()
}

impl Txt2ImgBody {
    /// Validate and convert into job parameters
    pub fn into_parameters(self) -> Result<JobParameters> {
        if self.prompt.trim().is_empty() {
            return Err(AppError::InvalidRequest("Missing prompt!".to_string()));
        }

        Ok(JobParameters {
            prompt: self.prompt,
            negative_prompt: self.negative_prompt,
            width: self.width,
            height: self.height,
            guidance_scale: self.guidance_scale,
            steps: self.steps,
            sampler: self.sampler,
        })
    }
}

/// Response to an accepted submission
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub status: &'static str,
    pub uid: String,
    /// `<queued>/<capacity>`
    pub queue_number: String,
    #[serde(flatten)]
    pub parameters: JobParameters,
}

/// Query of `GET /api/v1/info`
#[derive(Debug, Deserialize)]
pub struct InfoQuery {
    pub uid: Option<String>,
}

/// Finished job with everything it was created with
#[derive(Debug, Serialize)]
pub struct CompletedInfo {
    pub status: JobStatus,
    pub uid: String,
    #[serde(flatten)]
    pub parameters: JobParameters,
    pub result: String,
}

/// Pending or failed job
#[derive(Debug, Serialize)]
pub struct UnfinishedInfo {
    pub status: JobStatus,
    pub message: String,
}

/// Job status as returned to pollers
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum InfoResponse {
    Completed(CompletedInfo),
    Unfinished(UnfinishedInfo),
}

impl From<Job> for InfoResponse {
    fn from(job: Job) -> Self {
        match job.status {
            JobStatus::Success => InfoResponse::Completed(CompletedInfo {
                status: job.status,
                uid: job.id.to_string(),
                parameters: job.parameters,
                result: job.result,
            }),
            JobStatus::Pending | JobStatus::Failed => InfoResponse::Unfinished(UnfinishedInfo {
                status: job.status,
                message: job.result,
            }),
        }
    }
}

/// Body of `GET /`
#[derive(Debug, Serialize)]
pub struct WelcomeResponse {
    pub status: &'static str,
    pub message: String,
    pub version: &'static str,
}

/// Body of `GET /api/v1/ping`
#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub status: &'static str,
    pub message: PingMessage,
}

#[derive(Debug, Serialize)]
pub struct PingMessage {
    pub response: &'static str,
    pub queue: QueueStats,
}
