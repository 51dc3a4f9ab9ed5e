//! Router construction

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::api::handlers;
use crate::AppState;

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let static_files = ServeDir::new(&state.settings.storage.output_dir);

    Router::new()
        .route("/", get(handlers::root))
        .route("/api/v1/ping", get(handlers::ping))
        .route("/api/v1/txt2img", post(handlers::submit_txt2img))
        .route("/api/v1/info", get(handlers::job_info))
        .nest_service("/static", static_files)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
