//! HTTP application wiring (axum router + service wiring).
//!
//! - `services.rs`: engine wiring (store, notification bus)
//! - `routes/`: HTTP handlers
//! - `dto.rs`: request/response shapes
//! - `errors.rs`: workflow error -> JSON response mapping

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Router over an empty in-memory store.
pub fn build_app(jwt_secret: String) -> Router {
    build_app_with(jwt_secret, Arc::new(services::AppServices::in_memory(Vec::new())))
}

/// Router over pre-built services (seeded accounts, tests).
pub fn build_app_with(jwt_secret: String, services: Arc<services::AppServices>) -> Router {
    let jwt = Arc::new(kacaf_auth::Hs256JwtValidator::new(jwt_secret.into_bytes()));
    let auth_state = middleware::AuthState {
        jwt,
        services: services.clone(),
    };

    let identified = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(identified)
        .layer(ServiceBuilder::new())
}
