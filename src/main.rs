use anyhow::{Context, Result};
use echo_ef::api::predictions::AppState;
use echo_ef::api::routes::create_routes;
use echo_ef::config::{AppConfig, PipelineConfig};
use echo_ef::services::EfPredictor;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let pipeline_config = PipelineConfig::from_env()?;
    info!(
        "Starting echo-ef in {} mode with {:?} predictor",
        config.environment, pipeline_config.mode
    );

    // Models are loaded once, before the listener accepts requests
    let predictor = EfPredictor::from_config(&pipeline_config)?;
    let app = create_routes(AppState::new(Arc::new(predictor)));

    let address = config.server_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("EF inference server listening on http://{}", address);
    info!("Health check available at http://{}/health", address);

    axum::serve(listener, app).await?;

    Ok(())
}
