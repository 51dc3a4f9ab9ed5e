//! HTTP API - submission and status polling

pub mod handlers;
pub mod routes;
pub mod schemas;
