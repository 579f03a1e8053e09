//! HTTP API: thin axum adapter over the decision workflow engine.

pub mod app;
pub mod config;
pub mod context;
pub mod middleware;
