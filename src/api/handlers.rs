//! Route handlers

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::Json;
use tracing::{info, warn};

use crate::api::schemas::{
    InfoQuery, InfoResponse, PingMessage, PingResponse, SubmitResponse, Txt2ImgBody,
    WelcomeResponse,
};
use crate::error::{AppError, Result};
use crate::job::JobId;
use crate::AppState;

/// GET /
pub async fn root() -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        status: "success",
        message: format!("Welcome to {}", env!("CARGO_PKG_NAME")),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /api/v1/ping
pub async fn ping(State(state): State<Arc<AppState>>) -> Json<PingResponse> {
    Json(PingResponse {
        status: "success",
        message: PingMessage {
            response: "pong",
            queue: state.queue.stats(),
        },
    })
}

/// POST /api/v1/txt2img
pub async fn submit_txt2img(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<Txt2ImgBody>, JsonRejection>,
) -> Result<Json<SubmitResponse>> {
    let Json(body) = body.map_err(|e| AppError::InvalidRequest(e.body_text()))?;
    let parameters = body.into_parameters()?;

    let submission = match state.submit(parameters.clone()).await {
        Ok(submission) => submission,
        Err(e @ AppError::QueueFull { .. }) => {
            warn!(capacity = state.queue.capacity(), "Submission rejected, queue full");
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    info!(
        uid = %submission.id,
        queued = submission.queued,
        capacity = submission.capacity,
        "Job submitted"
    );

    Ok(Json(SubmitResponse {
        status: "on_progress",
        uid: submission.id.to_string(),
        queue_number: format!("{}/{}", submission.queued, submission.capacity),
        parameters,
    }))
}

/// GET /api/v1/info?uid=
pub async fn job_info(
    State(state): State<Arc<AppState>>,
    Query(query): Query<InfoQuery>,
) -> Result<Json<InfoResponse>> {
    let uid = query
        .uid
        .filter(|uid| !uid.trim().is_empty())
        .ok_or_else(|| AppError::InvalidRequest("Missing uid!".to_string()))?;

    let job = state.status(&JobId::from(uid)).await?;
    Ok(Json(job.into()))
}
