//! File storage for generated artifacts

use std::path::PathBuf;

use chrono::{DateTime, Local};
use tokio::fs;
use tracing::debug;

use crate::engine::Artifact;
use crate::error::Result;
use crate::job::JobId;

/// Writes artifacts into the served output directory
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    output_dir: PathBuf,
    url_prefix: String,
}

impl ArtifactWriter {
    pub fn new(output_dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    /// Ensure the output directory exists
    pub async fn ensure_output_dir(&self) -> Result<()> {
        if !self.output_dir.exists() {
            fs::create_dir_all(&self.output_dir).await?;
            debug!(path = ?self.output_dir, "Created output directory");
        }
        Ok(())
    }

    /// Persist the artifact of a job; returns its served path
    pub async fn save(&self, id: &JobId, artifact: &Artifact) -> Result<String> {
        self.ensure_output_dir().await?;

        let filename = artifact_file_name(id, artifact.format, Local::now());
        let file_path = self.output_dir.join(&filename);

        fs::write(&file_path, &artifact.data).await?;

        debug!(path = ?file_path, size = artifact.data.len(), "Saved artifact");

        Ok(format!("{}/{}", self.url_prefix, filename))
    }
}

/// `generate-<uid>-<yy-mm-dd-HH-MM>.<ext>`
pub fn artifact_file_name(id: &JobId, format: &str, at: DateTime<Local>) -> String {
    format!("generate-{}-{}.{}", id, at.format("%y-%m-%d-%H-%M"), format)
}

/// Detect image format from binary data using magic bytes
pub fn detect_image_format(data: &[u8]) -> Option<&'static str> {
    if data.len() < 8 {
        return None;
    }

    // PNG: 89 50 4E 47 0D 0A 1A 0A
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("png");
    }

    // JPEG: FF D8 FF
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("jpg");
    }

    // WebP: RIFF....WEBP
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return Some("webp");
    }

    None
}
