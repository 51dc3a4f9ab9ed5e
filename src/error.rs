//! Common error types for the job queue service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Queue full, try again in 30 seconds.")]
    QueueFull { capacity: usize },

    #[error("Job already exists: {0}")]
    DuplicateId(String),

    #[error("There has no uid start with {0}")]
    NotFound(String),

    #[error("Job {0} already reached a terminal state")]
    AlreadyTerminal(String),

    #[error("Engine error: {0}")]
    Engine(#[from] crate::engine::EngineError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error body, same shape the status endpoint uses for failed jobs
#[derive(Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub message: String,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::QueueFull { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DuplicateId(_) | AppError::AlreadyTerminal(_) => StatusCode::CONFLICT,
            AppError::Config(_)
            | AppError::Io(_)
            | AppError::Database(_)
            | AppError::HttpClient(_)
            | AppError::Engine(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() && !matches!(self, AppError::QueueFull { .. }) {
            tracing::error!(error = %self, "Request failed");
        }

        let body = Json(ErrorResponse {
            status: "failed",
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
