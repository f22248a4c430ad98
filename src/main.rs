use tracing_subscriber::EnvFilter;

use actcheck::api::{api_router, AppState};
use actcheck::config::{AppConfig, APP_VERSION};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env();
    tracing::info!(
        version = APP_VERSION,
        ollama = %config.ollama_url,
        vision_model = %config.vision_model,
        cleanup_model = %config.cleanup_model,
        data_dir = %config.data_dir.display(),
        "starting actcheck"
    );

    let state = AppState::from_config(&config)?;
    let app = api_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
