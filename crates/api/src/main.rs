use std::sync::Arc;

use anyhow::Context;
use genflow_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    genflow_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let services = genflow_api::app::services::build_services(&config)
        .context("failed to wire services")?;

    let app = genflow_api::app::build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
