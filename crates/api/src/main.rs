use std::sync::Arc;

use anyhow::Context;

use kacaf_api::app::{build_app_with, services::AppServices};
use kacaf_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kacaf_observability::init();

    let config = ApiConfig::from_env()?;
    let principals = config.load_principals()?;
    let services = Arc::new(AppServices::in_memory(principals));

    let app = build_app_with(config.jwt_secret.clone(), services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
