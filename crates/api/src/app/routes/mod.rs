use axum::{routing::get, Router};

pub mod subjects;
pub mod system;

/// Router for every endpoint that needs caller identity (possibly anonymous).
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/subjects", subjects::router())
}
