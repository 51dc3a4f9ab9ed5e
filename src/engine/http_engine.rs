//! Engine that drives a remote diffusion server over blocking HTTP

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::engine::{Artifact, Engine, EngineError, Sampler, SchedulerConfig};
use crate::error::{AppError, Result};
use crate::job::JobParameters;
use crate::response::{base64, file::detect_image_format};

/// Generation request sent to the diffusion server
#[derive(Debug, Serialize)]
struct ApiGenerateRequest<'a> {
    prompt: &'a str,
    negative_prompt: &'a str,
    width: u32,
    height: u32,
    guidance_scale: f32,
    num_inference_steps: u32,
    sampler: &'static str,
    scheduler: SchedulerConfig,
}

/// Response from the diffusion server
#[derive(Debug, Deserialize)]
struct ApiGenerateResponse {
    #[serde(default)]
    images: Vec<ApiImageData>,
    #[serde(default)]
    data: Vec<ApiImageData>,
}

#[derive(Debug, Deserialize)]
struct ApiImageData {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    base64: Option<String>,
}

/// Remote engine. The installed sampler lives here and is sent with every request.
///
/// Holds a blocking client, so build, use and drop it off the async executor.
pub struct HttpEngine {
    client: Client,
    generate_url: String,
    release_url: Option<String>,
    sampler: Sampler,
}

impl HttpEngine {
    /// Create a new HTTP engine from configuration
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let base = config.endpoint.trim_end_matches('/');

        Ok(Self {
            client,
            generate_url: format!("{}{}", base, config.generate_path),
            release_url: config
                .release_path
                .as_ref()
                .map(|path| format!("{}{}", base, path)),
            sampler: Sampler::lookup(&config.default_sampler).unwrap_or_default(),
        })
    }

    pub fn generate_url(&self) -> &str {
        &self.generate_url
    }

    fn decode_first_image(response: ApiGenerateResponse) -> std::result::Result<Artifact, EngineError> {
        let encoded = response
            .images
            .into_iter()
            .chain(response.data)
            .find_map(|image| image.b64_json.or(image.base64))
            .ok_or_else(|| EngineError::Decode("response contained no image".to_string()))?;

        let data = base64::decode(&encoded)
            .map_err(|e| EngineError::Decode(format!("invalid base64 image: {}", e)))?;
        let format = detect_image_format(&data).unwrap_or("png");

        Ok(Artifact { data, format })
    }
}

impl Engine for HttpEngine {
    fn sampler(&self) -> Sampler {
        self.sampler
    }

    fn set_sampler(&mut self, sampler: Sampler) {
        self.sampler = sampler;
    }

    fn generate(&mut self, params: &JobParameters) -> std::result::Result<Artifact, EngineError> {
        let request = ApiGenerateRequest {
            prompt: &params.prompt,
            negative_prompt: &params.negative_prompt,
            width: params.width,
            height: params.height,
            guidance_scale: params.guidance_scale,
            num_inference_steps: params.steps,
            sampler: self.sampler.name(),
            scheduler: self.sampler.scheduler(),
        };

        debug!(url = %self.generate_url, sampler = %self.sampler, "Sending generation request");

        let response = self
            .client
            .post(&self.generate_url)
            .json(&request)
            .send()
            .map_err(|e| EngineError::Backend(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(EngineError::Backend(format!("HTTP {}: {}", status, body)));
        }

        let body: ApiGenerateResponse = response
            .json()
            .map_err(|e| EngineError::Decode(e.to_string()))?;

        Self::decode_first_image(body)
    }

    fn release_memory(&mut self) {
        let Some(url) = &self.release_url else {
            return;
        };

        match self.client.post(url).send() {
            Ok(resp) if resp.status().is_success() => debug!("Engine memory released"),
            Ok(resp) => warn!(status = %resp.status(), "Engine memory release rejected"),
            Err(e) => warn!(error = %e, "Engine memory release failed"),
        }
    }
}
